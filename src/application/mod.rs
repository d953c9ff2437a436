pub mod auth;
pub mod delivery;
pub mod download_coordinator;
pub mod registry;
pub mod selector;
pub mod status;
pub mod workspace;

pub use auth::{AuthorizationGate, JsonFileAuthStore};
#[cfg(test)]
pub use auth::MemoryAuthStore;
pub use delivery::DeliveryPipeline;
pub use download_coordinator::{CancelOutcome, DownloadCoordinator, DownloadEvent, EngineConfig};
pub use registry::{ActiveSessionPolicy, SessionRegistry};
pub use selector::{DeliveryMode, ResultSelector};
pub use status::StatusMessage;
pub use workspace::DownloadWorkspace;

#[cfg(test)]
pub mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::domain::{BotError, ChatId, MessageRef, Notifier};

    /// Writes a POSIX shell script to be run through `/bin/sh`.
    pub fn fake_engine(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-engine.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        path
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Send { chat: ChatId, text: String },
        Edit { message_id: i64, text: String },
        Delete { message_id: i64 },
        Document { chat: ChatId, path: PathBuf, caption: String },
        Download { file_id: String, dest: PathBuf },
    }

    /// Records every call. Edits fail when `fail_edits` is set; attachment
    /// downloads write `attachment` to the destination.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub calls: Mutex<Vec<Call>>,
        pub fail_edits: bool,
        pub attachment: Vec<u8>,
        next_id: AtomicI64,
    }

    impl RecordingNotifier {
        pub fn failing_edits() -> Self {
            Self {
                fail_edits: true,
                ..Self::default()
            }
        }

        pub fn with_attachment(content: &[u8]) -> Self {
            Self {
                attachment: content.to_vec(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Send { text, .. } | Call::Edit { text, .. } => Some(text),
                    _ => None,
                })
                .collect()
        }

        pub fn documents(&self) -> Vec<(PathBuf, String)> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Document { path, caption, .. } => Some((path, caption)),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef, BotError> {
            self.record(Call::Send {
                chat,
                text: text.to_string(),
            });
            Ok(MessageRef {
                chat_id: chat,
                message_id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            })
        }

        async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), BotError> {
            if self.fail_edits {
                return Err(BotError::Transport("Bad Request: message is not modified".into()));
            }
            self.record(Call::Edit {
                message_id: message.message_id,
                text: text.to_string(),
            });
            Ok(())
        }

        async fn delete_message(&self, message: &MessageRef) -> Result<(), BotError> {
            self.record(Call::Delete {
                message_id: message.message_id,
            });
            Ok(())
        }

        async fn send_document(
            &self,
            chat: ChatId,
            path: &Path,
            caption: &str,
        ) -> Result<(), BotError> {
            assert!(path.is_file(), "document must exist while uploading");
            self.record(Call::Document {
                chat,
                path: path.to_path_buf(),
                caption: caption.to_string(),
            });
            Ok(())
        }

        async fn download_attachment(
            &self,
            file_id: &str,
            dest: &Path,
        ) -> Result<PathBuf, BotError> {
            tokio::fs::write(dest, &self.attachment).await?;
            self.record(Call::Download {
                file_id: file_id.to_string(),
                dest: dest.to_path_buf(),
            });
            Ok(dest.to_path_buf())
        }
    }
}
