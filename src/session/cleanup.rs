use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::session::queue::PlaybackQueue;

/// Releases everything a session holds transiently: the scratch directory of
/// downloaded artifacts and the in-memory queue.
///
/// The scratch directory is cleared wholesale rather than per artifact, so a
/// sweep also collects stale files left behind by a crash.
#[derive(Clone)]
pub struct CleanupCoordinator {
    scratch_dir: PathBuf,
    queue: Arc<PlaybackQueue>,
}

impl CleanupCoordinator {
    pub fn new(scratch_dir: PathBuf, queue: Arc<PlaybackQueue>) -> Self {
        Self { scratch_dir, queue }
    }

    /// Clears the queue and deletes every file in the scratch directory.
    ///
    /// Idempotent: calling it again (or concurrently) on an already-clean
    /// session does nothing and reports no error.
    pub async fn cleanup(&self) {
        self.queue.clear();

        let mut entries = match fs::read_dir(&self.scratch_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("⚠️ Could not read scratch dir {}: {e}", self.scratch_dir.display());
                return;
            }
        };

        let mut removed = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_file() {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("⚠️ Could not delete {}: {e}", path.display()),
                }
            }
        }

        if removed > 0 {
            info!("🗑️ Swept {removed} artifact(s) from {}", self.scratch_dir.display());
        }
    }

    /// Deletes a single superseded artifact (finished or skipped track).
    pub async fn discard(&self, artifact: &Path) {
        match fs::remove_file(artifact).await {
            Ok(()) => info!("🗑️ Discarded artifact {}", artifact.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("⚠️ Could not discard {}: {e}", artifact.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::queue::TrackRequest;
    use serenity::model::id::UserId;

    #[tokio::test]
    async fn cleanup_removes_artifacts_and_clears_queue() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"x").unwrap();

        let queue = Arc::new(PlaybackQueue::new());
        queue.enqueue(TrackRequest::new("https://youtube.com/a", UserId::new(1)));

        let coordinator = CleanupCoordinator::new(dir.path().to_path_buf(), queue.clone());
        coordinator.cleanup().await;

        assert!(queue.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn cleanup_twice_matches_cleanup_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"x").unwrap();

        let queue = Arc::new(PlaybackQueue::new());
        let coordinator = CleanupCoordinator::new(dir.path().to_path_buf(), queue);

        coordinator.cleanup().await;
        coordinator.cleanup().await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn cleanup_on_missing_directory_is_silent() {
        let queue = Arc::new(PlaybackQueue::new());
        let coordinator = CleanupCoordinator::new("does/not/exist".into(), queue);
        coordinator.cleanup().await;
    }

    #[tokio::test]
    async fn discard_tolerates_already_deleted_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("gone.mp3");

        let queue = Arc::new(PlaybackQueue::new());
        let coordinator = CleanupCoordinator::new(dir.path().to_path_buf(), queue);

        coordinator.discard(&artifact).await;
    }
}
