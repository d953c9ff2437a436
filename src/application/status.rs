use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{BotError, ChatId, MessageRef, Notifier};

/// A single status message that is edited in place as a session advances.
///
/// All operations are best-effort: transport failures are logged and dropped.
pub struct StatusMessage {
    notifier: Arc<dyn Notifier>,
    chat: ChatId,
    message: Option<MessageRef>,
    last_text: Option<String>,
}

impl StatusMessage {
    pub async fn open(notifier: Arc<dyn Notifier>, chat: ChatId, text: &str) -> Self {
        let message = match notifier.send_text(chat, text).await {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(chat_id = chat, "Failed to send status message: {}", e);
                None
            }
        };
        Self {
            notifier,
            chat,
            message,
            last_text: Some(text.to_string()),
        }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub async fn update(&mut self, text: &str) {
        if self.last_text.as_deref() == Some(text) {
            return;
        }
        let Some(message) = self.message else {
            return;
        };
        match self.notifier.edit_text(&message, text).await {
            Ok(()) => self.last_text = Some(text.to_string()),
            Err(e) => log_swallowed("edit", &e),
        }
    }

    /// Sends a separate message; the status message itself is untouched.
    pub async fn post(&self, text: &str) {
        if let Err(e) = self.notifier.send_text(self.chat, text).await {
            log_swallowed("send", &e);
        }
    }

    pub async fn clear(&mut self) {
        if let Some(message) = self.message.take() {
            if let Err(e) = self.notifier.delete_message(&message).await {
                log_swallowed("delete", &e);
            }
        }
    }
}

fn log_swallowed(operation: &str, e: &BotError) {
    if e.to_string().contains("message is not modified") {
        debug!(operation, "Status {} was a no-op", operation);
    } else {
        warn!(operation, "Status {} failed: {}", operation, e);
    }
}
