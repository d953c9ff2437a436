use serde::{Deserialize, Serialize};

use crate::domain::{Incoming, IncomingKind};

/// Envelope of every Bot API reply
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
}

impl Message {
    /// Drops updates that carry neither text nor a document, or have no sender.
    pub fn to_incoming(&self) -> Option<Incoming> {
        let user = self.from.as_ref()?;
        let kind = if let Some(document) = &self.document {
            IncomingKind::Document {
                file_id: document.file_id.clone(),
                file_unique_id: document.file_unique_id.clone(),
                file_name: document.file_name.clone(),
                mime_type: document.mime_type.clone(),
            }
        } else {
            IncomingKind::Text(self.text.clone()?)
        };
        Some(Incoming {
            user_id: user.id,
            chat_id: self.chat.id,
            kind,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Document {
    pub file_id: String,
    pub file_unique_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Response from the getFile method
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct BotApiConfig {
    pub base_url: String,
    pub token: String,
    pub poll_timeout_secs: u64,
}

impl Default for BotApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.telegram.org".to_string(),
            token: String::new(),
            poll_timeout_secs: 30,
        }
    }
}
