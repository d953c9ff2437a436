use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::api::models::Message;
use crate::api::BotApiClient;
use crate::application::download_coordinator::SessionReport;
use crate::application::selector::Selection;
use crate::application::{
    ActiveSessionPolicy, AuthorizationGate, CancelOutcome, DeliveryPipeline, DownloadCoordinator,
    DownloadEvent, ResultSelector, StatusMessage,
};
use crate::config::Settings;
use crate::domain::{
    BotError, ChatId, DownloadTarget, Incoming, IncomingKind, Notifier, SessionState, UserId,
};
use crate::ui;
use crate::utils::{classify_link, mb_to_bytes};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    /// `/in <target>`; the target is absent when the user sent a bare `/in`.
    In(Option<String>),
    Cancel,
}

impl BotCommand {
    /// Parses `/name[@bot] [args]`. Unknown commands and plain text yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or(head);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(BotCommand::Start),
            "help" => Some(BotCommand::Help),
            "in" => Some(BotCommand::In(parts.next().map(str::to_string))),
            "cancel" => Some(BotCommand::Cancel),
            _ => None,
        }
    }
}

fn is_torrent_attachment(file_name: Option<&str>, mime_type: Option<&str>) -> bool {
    file_name.is_some_and(|name| name.to_ascii_lowercase().ends_with(".torrent"))
        || mime_type == Some("application/x-bittorrent")
}

/// Routes chat updates to the download core.
pub struct TorrentBot {
    notifier: Arc<dyn Notifier>,
    gate: AuthorizationGate,
    coordinator: DownloadCoordinator,
    selector: ResultSelector,
    delivery: DeliveryPipeline,
}

impl TorrentBot {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        gate: AuthorizationGate,
        coordinator: DownloadCoordinator,
        selector: ResultSelector,
        delivery: DeliveryPipeline,
    ) -> Self {
        Self {
            notifier,
            gate,
            coordinator,
            selector,
            delivery,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        notifier: Arc<dyn Notifier>,
        gate: AuthorizationGate,
        coordinator: DownloadCoordinator,
    ) -> Self {
        let selector = ResultSelector::new(
            settings.delivery_mode,
            mb_to_bytes(settings.max_file_size_mb),
        );
        let delivery = DeliveryPipeline::new(
            coordinator.workspace().clone(),
            settings.max_file_size_mb,
            settings.simulate_upload_progress,
            Duration::from_millis(settings.upload_step_delay_ms),
        );
        Self::new(notifier, gate, coordinator, selector, delivery)
    }

    pub async fn handle(&self, incoming: Incoming) {
        let Incoming {
            user_id,
            chat_id,
            kind,
        } = incoming;
        match kind {
            IncomingKind::Text(text) => match BotCommand::parse(&text) {
                Some(command) => self.handle_command(user_id, chat_id, command).await,
                None => debug!(user_id, "Ignoring non-command text"),
            },
            IncomingKind::Document {
                file_id,
                file_unique_id,
                file_name,
                mime_type,
            } => {
                if !is_torrent_attachment(file_name.as_deref(), mime_type.as_deref()) {
                    debug!(user_id, ?file_name, "Ignoring non-torrent document");
                    return;
                }
                self.handle_torrent_file(user_id, chat_id, &file_id, &file_unique_id)
                    .await;
            }
        }
    }

    async fn handle_command(&self, user_id: UserId, chat_id: ChatId, command: BotCommand) {
        info!(user_id, ?command, "Command received");
        match command {
            BotCommand::Start => self.reply(chat_id, ui::GREETING).await,
            BotCommand::Help => self.reply(chat_id, ui::HELP).await,
            BotCommand::Cancel => {
                let text = match self.coordinator.cancel(user_id) {
                    CancelOutcome::Cancelled => ui::CANCELLED_REPLY,
                    CancelOutcome::NoActiveSession => ui::NOTHING_TO_CANCEL,
                };
                self.reply(chat_id, text).await;
            }
            BotCommand::In(argument) => {
                if !self.authorize(user_id, chat_id).await {
                    return;
                }
                let Some(argument) = argument else {
                    self.reply(chat_id, ui::USAGE_IN).await;
                    return;
                };
                match classify_link(&argument) {
                    Ok(target) => self.run_download(user_id, chat_id, target).await,
                    Err(_) => self.reply(chat_id, ui::INVALID_LINK).await,
                }
            }
        }
    }

    async fn handle_torrent_file(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        file_id: &str,
        unique_id: &str,
    ) {
        if !self.authorize(user_id, chat_id).await || self.reject_if_busy(user_id, chat_id).await {
            return;
        }

        let workspace = self.coordinator.workspace();
        let saved = match workspace.attachment_path(user_id, unique_id).await {
            Ok(dest) => self.notifier.download_attachment(file_id, &dest).await,
            Err(e) => Err(e),
        };
        match saved {
            Ok(path) => {
                self.run_download(user_id, chat_id, DownloadTarget::TorrentFile(path.clone()))
                    .await;
                workspace.discard(&path).await;
            }
            Err(e) => {
                warn!(user_id, "Fetching torrent attachment failed: {}", e);
                self.reply(chat_id, ui::ATTACHMENT_FAILED).await;
            }
        }
    }

    /// Replies with a refusal when `user_id` may not download. Store failures
    /// deny access.
    async fn authorize(&self, user_id: UserId, chat_id: ChatId) -> bool {
        let allowed = self.gate.is_authorized(user_id).await.unwrap_or_else(|e| {
            error!(user_id, "Authorization check failed: {}", e);
            false
        });
        if !allowed {
            info!(user_id, "Refused unauthorized user");
            self.reply(chat_id, ui::NOT_AUTHORIZED).await;
        }
        allowed
    }

    async fn reject_if_busy(&self, user_id: UserId, chat_id: ChatId) -> bool {
        let busy = self.coordinator.policy() == ActiveSessionPolicy::Reject
            && self.coordinator.is_active(user_id);
        if busy {
            self.reply(chat_id, ui::ALREADY_ACTIVE).await;
        }
        busy
    }

    async fn run_download(&self, user_id: UserId, chat_id: ChatId, target: DownloadTarget) {
        if self.reject_if_busy(user_id, chat_id).await {
            return;
        }

        let mut status = StatusMessage::open(self.notifier.clone(), chat_id, ui::DOWNLOADING).await;
        let session = match self.coordinator.start(target, user_id).await {
            Ok(session) => session,
            Err(BotError::SessionActive) => {
                status.update(ui::ALREADY_ACTIVE).await;
                return;
            }
            Err(e) => {
                error!(user_id, "Could not start download: {}", e);
                status.update(ui::ENGINE_FAILED).await;
                return;
            }
        };

        info!(
            user_id,
            session_id = session.session_id(),
            dir = %session.dest_dir().display(),
            "Download session running"
        );
        let mut events = session.events();
        let mut report: Option<SessionReport> = None;
        while let Some(event) = events.next().await {
            match event {
                DownloadEvent::Progress { event, bar } => {
                    status
                        .update(&ui::downloading_status(event.percent, &bar))
                        .await
                }
                DownloadEvent::TimedOut => status.update(ui::TIMED_OUT).await,
                DownloadEvent::Closed(closed) => report = Some(closed),
            }
        }
        let Some(report) = report else {
            return;
        };

        if report.state == SessionState::Cancelled {
            status.update(ui::SESSION_CANCELLED).await;
            self.coordinator.workspace().discard(&report.dest_dir).await;
            return;
        }
        self.finish(&mut status, user_id, &report.dest_dir).await;
    }

    async fn finish(&self, status: &mut StatusMessage, user_id: UserId, dest_dir: &Path) {
        let selection = self
            .selector
            .select_candidates(dest_dir)
            .await
            .unwrap_or_else(|e| {
                warn!(user_id, dir = %dest_dir.display(), "Scanning results failed: {}", e);
                Selection::default()
            });

        if selection.is_empty() {
            info!(user_id, "No deliverable files");
            status.update(ui::NO_FILES).await;
            self.coordinator.workspace().discard(dest_dir).await;
            return;
        }

        let report = self
            .delivery
            .deliver(status, user_id, selection, dest_dir)
            .await;
        info!(
            user_id,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Delivery finished"
        );
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.notifier.send_text(chat_id, text).await {
            warn!(chat_id, "Reply failed: {}", e);
        }
    }
}

/// Long-polls the Bot API forever, handling each message in its own task.
pub async fn run_polling(bot: Arc<TorrentBot>, api: BotApiClient) {
    let mut offset: Option<i64> = None;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match api.get_updates(offset).await {
            Ok(updates) => {
                backoff = INITIAL_BACKOFF;
                for update in updates {
                    offset = Some(update.update_id + 1);
                    let Some(incoming) = update.message.as_ref().and_then(Message::to_incoming)
                    else {
                        continue;
                    };
                    let bot = bot.clone();
                    tokio::spawn(async move { bot.handle(incoming).await });
                }
            }
            Err(e) => {
                warn!(backoff_secs = backoff.as_secs(), "Polling failed: {}", e);
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
            }
        }
    }
}
