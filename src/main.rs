mod api;
mod app;
mod application;
mod config;
mod domain;
mod ui;
mod utils;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::api::BotApiClient;
use crate::app::TorrentBot;
use crate::application::{
    AuthorizationGate, DownloadCoordinator, DownloadWorkspace, JsonFileAuthStore, SessionRegistry,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = config::load_settings()?;

    let workspace = DownloadWorkspace::new(&settings.download_path);
    workspace.prepare().await?;

    let gate = AuthorizationGate::new(Arc::new(JsonFileAuthStore::new(
        &settings.admin_store_path,
    )));
    let admins = gate.sync_admins(&settings.admin_set()).await?;
    info!(admins = admins.len(), "Admin list synchronized");

    let api = BotApiClient::new(settings.api_config())?;
    let registry = Arc::new(SessionRegistry::new());
    let coordinator =
        DownloadCoordinator::new(settings.engine_config(), registry.clone(), workspace);
    let bot = Arc::new(TorrentBot::from_settings(
        &settings,
        Arc::new(api.clone()),
        gate,
        coordinator,
    ));

    info!(
        download_path = %settings.download_path.display(),
        engine = %settings.engine_path.display(),
        "Bot started"
    );

    tokio::select! {
        _ = app::run_polling(bot, api) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Listening for shutdown signal failed: {}", e);
            }
            if registry.is_empty() {
                info!("Shutting down");
            } else {
                warn!(active_sessions = registry.len(), "Shutting down with downloads in progress");
            }
        }
    }

    Ok(())
}
