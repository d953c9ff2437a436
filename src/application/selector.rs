use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{BotError, DeliveryCandidate};

/// How finished downloads are turned into deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Every regular file is a candidate, each checked against the size ceiling.
    #[default]
    AllFiles,
    /// Only the single largest media file under the ceiling is delivered.
    LargestMedia,
}

const MEDIA_PREFIXES: [&str; 4] = ["video", "audio", "image", "application"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub accepted: Vec<DeliveryCandidate>,
    pub oversized: Vec<DeliveryCandidate>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.oversized.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResultSelector {
    mode: DeliveryMode,
    max_size_bytes: u64,
}

impl ResultSelector {
    pub fn new(mode: DeliveryMode, max_size_bytes: u64) -> Self {
        Self {
            mode,
            max_size_bytes,
        }
    }

    /// Scans `dir` recursively. A missing directory yields an empty selection.
    pub async fn select_candidates(&self, dir: &Path) -> Result<Selection, BotError> {
        let mut files = list_regular_files(dir).await?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut selection = Selection::default();
        match self.mode {
            DeliveryMode::AllFiles => {
                for file in files {
                    if file.size_bytes <= self.max_size_bytes {
                        selection.accepted.push(file);
                    } else {
                        selection.oversized.push(file);
                    }
                }
            }
            DeliveryMode::LargestMedia => {
                // Empty files are never candidates.
                let (fitting, oversized): (Vec<_>, Vec<_>) = files
                    .into_iter()
                    .filter(|f| f.size_bytes > 0 && is_media(&f.path))
                    .partition(|f| f.size_bytes <= self.max_size_bytes);
                selection.oversized = oversized;
                // Ties keep the first file in path order.
                let mut largest: Option<DeliveryCandidate> = None;
                for file in fitting {
                    if largest.as_ref().is_none_or(|l| file.size_bytes > l.size_bytes) {
                        largest = Some(file);
                    }
                }
                selection.accepted.extend(largest);
            }
        }
        Ok(selection)
    }
}

async fn list_regular_files(root: &Path) -> Result<Vec<DeliveryCandidate>, BotError> {
    let mut found = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                let size_bytes = entry.metadata().await?.len();
                found.push(DeliveryCandidate {
                    path: entry.path(),
                    size_bytes,
                });
            }
        }
    }
    Ok(found)
}

fn is_media(path: &Path) -> bool {
    mime_class(path).is_some_and(|class| MEDIA_PREFIXES.contains(&class.as_str()))
}

/// Top-level MIME type guessed from the file extension.
fn mime_class(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.type_().as_str().to_string())
}
