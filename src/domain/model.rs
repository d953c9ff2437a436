use std::path::{Path, PathBuf};

pub type UserId = i64;
pub type ChatId = i64;

/// A message previously sent by the bot, addressable for edits and deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    Magnet(String),
    TorrentUrl(String),
    TorrentFile(PathBuf),
}

impl DownloadTarget {
    /// The argument handed to the download engine.
    pub fn as_arg(&self) -> &std::ffi::OsStr {
        match self {
            DownloadTarget::Magnet(link) | DownloadTarget::TorrentUrl(link) => link.as_ref(),
            DownloadTarget::TorrentFile(path) => path.as_os_str(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DownloadTarget::Magnet(link) | DownloadTarget::TorrentUrl(link) => link.clone(),
            DownloadTarget::TorrentFile(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Completed,
    TimedOut,
    Cancelled,
    Failed,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::TimedOut
                | SessionState::Cancelled
                | SessionState::Failed
                | SessionState::Closed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryCandidate {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl DeliveryCandidate {
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A chat update reduced to what the dispatcher needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: IncomingKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingKind {
    Text(String),
    Document {
        file_id: String,
        file_unique_id: String,
        file_name: Option<String>,
        mime_type: Option<String>,
    },
}
