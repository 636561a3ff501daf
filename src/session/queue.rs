use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::collections::VecDeque;
use tracing::info;

/// A track submission. Immutable once created; lives in the queue until the
/// moment resolution begins, then travels with the playback it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRequest {
    pub url: String,
    pub requested_by: UserId,
    pub submitted_at: DateTime<Utc>,
}

impl TrackRequest {
    pub fn new(url: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            url: url.into(),
            requested_by,
            submitted_at: Utc::now(),
        }
    }
}

/// FIFO of pending requests.
///
/// All mutations run under one short lock, so enqueue and dequeue can be
/// called from different tasks without losing or duplicating entries. The
/// lock is never held across an await.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: Mutex<VecDeque<TrackRequest>>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail. No capacity limit.
    pub fn enqueue(&self, request: TrackRequest) {
        let mut items = self.items.lock();
        info!("➕ Queued: {}", request.url);
        items.push_back(request);
    }

    /// Removes and returns the head, strictly first-in first-out.
    pub fn dequeue_front(&self) -> Option<TrackRequest> {
        self.items.lock().pop_front()
    }

    /// Empties the queue. Used only on stop/session end.
    pub fn clear(&self) {
        let mut items = self.items.lock();
        if !items.is_empty() {
            info!("🗑️ Queue cleared ({} pending)", items.len());
        }
        items.clear();
    }

    /// Read-only view for diagnostics and persistence.
    pub fn snapshot(&self) -> Vec<TrackRequest> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn request(url: &str) -> TrackRequest {
        TrackRequest::new(url, UserId::new(1))
    }

    #[test]
    fn enqueue_preserves_call_order() {
        let queue = PlaybackQueue::new();
        queue.enqueue(request("https://youtube.com/a"));
        queue.enqueue(request("https://youtube.com/b"));
        queue.enqueue(request("https://youtube.com/c"));

        let urls: Vec<String> = queue.snapshot().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://youtube.com/a",
                "https://youtube.com/b",
                "https://youtube.com/c"
            ]
        );

        assert_eq!(queue.dequeue_front().unwrap().url, "https://youtube.com/a");
        assert_eq!(queue.dequeue_front().unwrap().url, "https://youtube.com/b");
        assert_eq!(queue.dequeue_front().unwrap().url, "https://youtube.com/c");
        assert_eq!(queue.dequeue_front(), None);
    }

    #[test]
    fn clear_empties_and_is_idempotent() {
        let queue = PlaybackQueue::new();
        queue.enqueue(request("https://youtube.com/a"));
        queue.clear();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue_front(), None);
    }

    #[test]
    fn concurrent_enqueue_and_dequeue_loses_nothing() {
        let queue = Arc::new(PlaybackQueue::new());
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    queue.enqueue(request(&format!("https://youtube.com/{i}")));
                }
            })
        };
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                let mut seen = 0;
                while seen < 500 {
                    if queue.dequeue_front().is_some() {
                        seen += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
                seen
            })
        };

        producer.join().unwrap();
        assert_eq!(consumer.join().unwrap(), 500);
        assert!(queue.is_empty());
    }
}
