use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{BotError, ChatId, MessageRef, UserId};

/// Outbound side of the chat transport.
///
/// Every call may fail transiently. The core treats status edits and deletes as
/// best-effort and only surfaces document delivery failures to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef, BotError>;

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), BotError>;

    async fn delete_message(&self, message: &MessageRef) -> Result<(), BotError>;

    async fn send_document(&self, chat: ChatId, path: &Path, caption: &str)
        -> Result<(), BotError>;

    /// Fetches an uploaded attachment into `dest` and returns the written path.
    async fn download_attachment(&self, file_id: &str, dest: &Path) -> Result<PathBuf, BotError>;
}

pub const ADMIN_RECORD_ID: &str = "admins";

/// The single persisted record holding every authorized user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub users: BTreeSet<UserId>,
}

impl AdminRecord {
    pub fn new(users: BTreeSet<UserId>) -> Self {
        Self {
            id: ADMIN_RECORD_ID.to_string(),
            users,
        }
    }
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn load(&self) -> Result<Option<AdminRecord>, BotError>;

    async fn save(&self, record: &AdminRecord) -> Result<(), BotError>;
}
