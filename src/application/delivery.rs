use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::selector::Selection;
use super::status::StatusMessage;
use super::workspace::DownloadWorkspace;
use crate::domain::{DeliveryCandidate, UserId};
use crate::ui;
use crate::utils::bytes_to_mb;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Uploads selected files, reports skipped ones, and cleans up after itself.
#[derive(Debug, Clone)]
pub struct DeliveryPipeline {
    workspace: DownloadWorkspace,
    max_file_size_mb: u64,
    simulate_upload_progress: bool,
    upload_step_delay: Duration,
}

impl DeliveryPipeline {
    pub fn new(
        workspace: DownloadWorkspace,
        max_file_size_mb: u64,
        simulate_upload_progress: bool,
        upload_step_delay: Duration,
    ) -> Self {
        Self {
            workspace,
            max_file_size_mb,
            simulate_upload_progress,
            upload_step_delay,
        }
    }

    /// Every candidate ends deleted, delivered or not. `session_dir` is removed last.
    pub async fn deliver(
        &self,
        status: &mut StatusMessage,
        recipient: UserId,
        selection: Selection,
        session_dir: &Path,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for candidate in &selection.oversized {
            let size_mb = bytes_to_mb(candidate.size_bytes);
            info!(
                user_id = recipient,
                path = %candidate.path.display(),
                size_mb,
                "Skipping oversized file"
            );
            status
                .post(&ui::skipped_notice(
                    &candidate.file_name(),
                    size_mb,
                    self.max_file_size_mb,
                ))
                .await;
            self.workspace.discard(&candidate.path).await;
            report.skipped += 1;
        }

        for candidate in &selection.accepted {
            if self.upload(status, recipient, candidate).await {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
            self.workspace.discard(&candidate.path).await;
        }

        status.clear().await;
        self.workspace.discard(session_dir).await;
        report
    }

    async fn upload(
        &self,
        status: &mut StatusMessage,
        recipient: UserId,
        candidate: &DeliveryCandidate,
    ) -> bool {
        let name = candidate.file_name();
        if self.simulate_upload_progress {
            for percent in (0..=100u8).step_by(10) {
                status.update(&ui::uploading_status(&name, percent)).await;
                tokio::time::sleep(self.upload_step_delay).await;
            }
        } else {
            status.update(&ui::uploading_notice(&name)).await;
        }

        let notifier = status.notifier().clone();
        match notifier
            .send_document(recipient, &candidate.path, &ui::completed_caption(&name))
            .await
        {
            Ok(()) => {
                info!(user_id = recipient, file = %name, bytes = candidate.size_bytes, "Delivered file");
                true
            }
            Err(e) => {
                warn!(user_id = recipient, file = %name, "Document upload failed: {}", e);
                status.post(&ui::upload_failed_notice(&name)).await;
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::application::testing::{Call, RecordingNotifier};
    use crate::application::{DeliveryMode, ResultSelector};

    const USER: UserId = 7;

    async fn select(dir: &Path, mode: DeliveryMode) -> Selection {
        ResultSelector::new(mode, 1024 * 1024)
            .select_candidates(dir)
            .await
            .unwrap()
    }

    fn write(dir: &Path, name: &str, len: u64) {
        std::fs::File::create(dir.join(name))
            .unwrap()
            .set_len(len)
            .unwrap();
    }

    #[tokio::test]
    async fn test_each_file_gets_its_own_uploading_status() {
        let tmp = tempfile::tempdir().unwrap();
        let session_dir = tmp.path().join("7-1");
        std::fs::create_dir(&session_dir).unwrap();
        write(&session_dir, "a.mkv", 10);
        write(&session_dir, "b.mkv", 20);

        let notifier = Arc::new(RecordingNotifier::default());
        let mut status = StatusMessage::open(notifier.clone(), 100, ui::DOWNLOADING).await;
        let pipeline = DeliveryPipeline::new(
            DownloadWorkspace::new(tmp.path()),
            1,
            false,
            Duration::from_millis(1),
        );

        let selection = select(&session_dir, DeliveryMode::AllFiles).await;
        let report = pipeline
            .deliver(&mut status, USER, selection, &session_dir)
            .await;

        assert_eq!(report.delivered, 2);
        let texts = notifier.texts();
        assert!(texts.contains(&ui::uploading_notice("a.mkv")));
        assert!(texts.contains(&ui::uploading_notice("b.mkv")));
        assert_eq!(notifier.documents().len(), 2);
        assert!(!session_dir.exists());
    }

    #[tokio::test]
    async fn test_simulated_upload_draws_green_bar_steps() {
        let tmp = tempfile::tempdir().unwrap();
        let session_dir = tmp.path().join("7-2");
        std::fs::create_dir(&session_dir).unwrap();
        write(&session_dir, "song.flac", 10);

        let notifier = Arc::new(RecordingNotifier::default());
        let mut status = StatusMessage::open(notifier.clone(), 100, ui::DOWNLOADING).await;
        let pipeline = DeliveryPipeline::new(
            DownloadWorkspace::new(tmp.path()),
            1,
            true,
            Duration::from_millis(1),
        );

        let selection = select(&session_dir, DeliveryMode::LargestMedia).await;
        pipeline
            .deliver(&mut status, USER, selection, &session_dir)
            .await;

        let edits: Vec<String> = notifier
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = (0..=100u8)
            .step_by(10)
            .map(|p| ui::uploading_status("song.flac", p))
            .collect();
        assert_eq!(edits.len(), 11);
        assert_eq!(edits, expected);
        assert!(edits[10].contains(&"🟢".repeat(10)));
        assert_eq!(notifier.documents().len(), 1);
    }
}
