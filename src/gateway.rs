use async_trait::async_trait;
use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Where the session pushes asynchronous, human-readable status lines
/// ("now playing …", resolution failures). Command acknowledgements take the
/// synchronous reply path instead.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn send_status(&self, text: &str);
}

/// Posts status lines into the text channel the session was started from.
pub struct ChannelStatusSink {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelStatusSink {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl StatusSink for ChannelStatusSink {
    async fn send_status(&self, text: &str) {
        let message = CreateMessage::new().content(text);
        if let Err(e) = self.channel_id.send_message(&self.http, message).await {
            warn!("⚠️ Could not send status to channel {}: {e}", self.channel_id);
        }
    }
}

/// Periodic liveness ping so an operator channel shows the bot is still up.
///
/// The first tick is skipped: a freshly started bot announces itself through
/// startup logs, not chat.
pub fn spawn_heartbeat(sink: Arc<dyn StatusSink>, period: Duration) -> JoinHandle<()> {
    info!("💓 Heartbeat every {}s", period.as_secs());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sink.send_status("✅ **Heartbeat:** still online.").await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn send_status(&self, text: &str) {
            self.messages.lock().push(text.to_string());
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_posts_once_per_period() {
        let sink = Arc::new(RecordingSink::default());
        let task = spawn_heartbeat(sink.clone(), Duration::from_secs(300));
        settle().await;

        // Startup itself is silent.
        assert!(sink.messages.lock().is_empty());

        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(sink.messages.lock().len(), 1);
        assert!(sink.messages.lock()[0].contains("Heartbeat"));

        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(sink.messages.lock().len(), 2);

        task.abort();
    }
}
