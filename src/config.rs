use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::BotApiConfig;
use crate::application::{ActiveSessionPolicy, DeliveryMode, EngineConfig};
use crate::domain::{BotError, UserId};
use crate::ui::BarStyle;

const DEFAULT_CONFIG_FILE: &str = "torrent-bot.toml";

/// Environment names understood without the `TORRENT_BOT_` prefix.
const RAW_ENV_KEYS: [&str; 5] = [
    "bot_token",
    "admins",
    "download_path",
    "aria2c_path",
    "max_file_size_mb",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bot_token: String,
    pub api_base_url: String,
    #[serde(deserialize_with = "deserialize_admins")]
    pub admins: Vec<UserId>,

    // Engine
    pub download_path: PathBuf,
    pub engine_path: PathBuf,
    pub engine_args: Vec<String>,
    pub stop_timeout_secs: u64,
    pub exit_timeout_secs: u64,

    // Delivery
    pub max_file_size_mb: u64,
    pub delivery_mode: DeliveryMode,
    pub on_active_session: ActiveSessionPolicy,
    pub progress_style: String,
    pub simulate_upload_progress: bool,
    pub upload_step_delay_ms: u64,

    pub admin_store_path: PathBuf,
    pub poll_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: "https://api.telegram.org".to_string(),
            admins: Vec::new(),
            download_path: PathBuf::from("/downloads"),
            engine_path: PathBuf::from("/usr/bin/aria2c"),
            engine_args: Vec::new(),
            stop_timeout_secs: 10,
            exit_timeout_secs: 300,
            max_file_size_mb: 2000,
            delivery_mode: DeliveryMode::default(),
            on_active_session: ActiveSessionPolicy::default(),
            progress_style: "blue".to_string(),
            simulate_upload_progress: false,
            upload_step_delay_ms: 200,
            admin_store_path: PathBuf::from("admins.json"),
            poll_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn validate(self) -> Result<Self, BotError> {
        if self.bot_token.trim().is_empty() {
            return Err(BotError::Config("bot_token is required".to_string()));
        }
        if self.max_file_size_mb == 0 {
            return Err(BotError::Config(
                "max_file_size_mb must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn admin_set(&self) -> BTreeSet<UserId> {
        self.admins.iter().copied().collect()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            engine_path: self.engine_path.clone(),
            engine_args: self.engine_args.clone(),
            stop_timeout_secs: self.stop_timeout_secs,
            exit_timeout: Duration::from_secs(self.exit_timeout_secs),
            bar_style: BarStyle::from_name(&self.progress_style),
            policy: self.on_active_session,
        }
    }

    pub fn api_config(&self) -> BotApiConfig {
        BotApiConfig {
            base_url: self.api_base_url.clone(),
            token: self.bot_token.clone(),
            poll_timeout_secs: self.poll_timeout_secs,
        }
    }
}

/// The TOML file, then the bare legacy variables, then `TORRENT_BOT_`-prefixed
/// variables. Anything unset keeps its `Settings::default()` value.
pub fn figment() -> Figment {
    let config_file =
        std::env::var("TORRENT_BOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    Figment::new()
        .merge(Toml::file(config_file))
        .merge(Env::raw().only(&RAW_ENV_KEYS).map(|key| {
            if key.as_str().eq_ignore_ascii_case("aria2c_path") {
                "engine_path".into()
            } else {
                key.as_str().to_lowercase().into()
            }
        }))
        .merge(Env::prefixed("TORRENT_BOT_").ignore(&["config"]))
}

pub fn load_settings() -> Result<Settings, BotError> {
    figment()
        .extract::<Settings>()
        .map_err(|e| BotError::Config(e.to_string()))?
        .validate()
}

/// Accepts `[1, 2]`, a single integer, or `"1, 2"`.
fn deserialize_admins<'de, D>(deserializer: D) -> Result<Vec<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AdminIds {
        List(Vec<UserId>),
        Single(UserId),
        Text(String),
    }

    match AdminIds::deserialize(deserializer)? {
        AdminIds::List(ids) => Ok(ids),
        AdminIds::Single(id) => Ok(vec![id]),
        AdminIds::Text(text) => text
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<UserId>()
                    .map_err(|e| serde::de::Error::custom(format!("admin id {:?}: {}", part, e)))
            })
            .collect(),
    }
}
