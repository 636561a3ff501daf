use anyhow::Result;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

use crate::session::TrackRequest;

/// JSON-file persistence for pending queues, one file per guild.
///
/// This is the optional PersistenceStore collaborator: the session exposes
/// `queue_snapshot()`/`restore()` and this store moves those snapshots to and
/// from disk. It never touches session state directly.
pub struct QueueSnapshotStore {
    data_dir: PathBuf,
}

impl QueueSnapshotStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir).await?;
        info!("📁 Snapshot store at {}", data_dir.display());
        Ok(Self { data_dir })
    }

    fn path_for(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join(format!("queue_{guild_id}.json"))
    }

    pub async fn save(&self, guild_id: u64, requests: &[TrackRequest]) -> Result<()> {
        let path = self.path_for(guild_id);

        if requests.is_empty() {
            // Nothing pending: drop the file instead of writing an empty list.
            let _ = fs::remove_file(&path).await;
            return Ok(());
        }

        let json = serde_json::to_vec_pretty(requests)?;
        fs::write(&path, json).await?;
        info!(
            "💾 Saved {} pending request(s) for guild {guild_id}",
            requests.len()
        );
        Ok(())
    }

    /// Loads and removes the stored snapshot, or an empty list when none
    /// exists or the file cannot be parsed.
    pub async fn take(&self, guild_id: u64) -> Vec<TrackRequest> {
        let path = self.path_for(guild_id);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => return Vec::new(),
        };

        let requests: Vec<TrackRequest> = match serde_json::from_slice(&bytes) {
            Ok(requests) => requests,
            Err(e) => {
                warn!("⚠️ Corrupt queue snapshot for guild {guild_id}: {e}");
                Vec::new()
            }
        };

        if let Err(e) = fs::remove_file(&path).await {
            warn!("⚠️ Could not remove consumed snapshot: {e}");
        }

        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    #[tokio::test]
    async fn save_and_take_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueSnapshotStore::new(dir.path().to_path_buf())
            .await
            .unwrap();

        let requests = vec![
            TrackRequest::new("https://youtube.com/a", UserId::new(7)),
            TrackRequest::new("https://youtube.com/b", UserId::new(8)),
        ];
        store.save(42, &requests).await.unwrap();

        let loaded = store.take(42).await;
        assert_eq!(loaded, requests);

        // Consumed: a second take finds nothing.
        assert!(store.take(42).await.is_empty());
    }

    #[tokio::test]
    async fn empty_save_clears_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueSnapshotStore::new(dir.path().to_path_buf())
            .await
            .unwrap();

        let requests = vec![TrackRequest::new("https://youtube.com/a", UserId::new(7))];
        store.save(42, &requests).await.unwrap();
        store.save(42, &[]).await.unwrap();

        assert!(store.take(42).await.is_empty());
    }

    #[tokio::test]
    async fn take_without_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueSnapshotStore::new(dir.path().to_path_buf())
            .await
            .unwrap();
        assert!(store.take(999).await.is_empty());
    }
}
