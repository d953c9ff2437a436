use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::{BotError, UserId};
use crate::utils::sanitize_filename;

const INCOMING_DIR: &str = ".incoming";

/// Filesystem layout under the configured download root.
///
/// Every session writes into its own `<user>-<session>` subdirectory so that
/// concurrent sessions never see or clear each other's output.
#[derive(Debug, Clone)]
pub struct DownloadWorkspace {
    root: PathBuf,
}

impl DownloadWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn prepare(&self) -> Result<(), BotError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub async fn session_dir(&self, owner: UserId, session_id: u64) -> Result<PathBuf, BotError> {
        let dir = self.root.join(format!("{}-{}", owner, session_id));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Scratch location for an uploaded `.torrent` file, outside every session directory.
    pub async fn attachment_path(&self, owner: UserId, unique_id: &str) -> Result<PathBuf, BotError> {
        let dir = self.root.join(INCOMING_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir.join(format!("{}-{}.torrent", owner, sanitize_filename(unique_id))))
    }

    /// Removes a file or directory tree; a missing path is not an error.
    pub async fn discard(&self, path: &Path) {
        let result = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(path = %path.display(), "Discarded"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "Failed to discard: {}", e),
        }
    }
}
