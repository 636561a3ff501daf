use anyhow::anyhow;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{File, Input},
    tracks::{PlayMode, TrackHandle},
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::session::SessionHooks;

/// The live voice transport as the session sees it: start/stop streaming a
/// local artifact, report playing/paused, raise completion and disconnect
/// events through [`SessionHooks`].
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, channel: ChannelId, hooks: SessionHooks) -> Result<(), SessionError>;

    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Starts streaming `artifact`. The transport reports completion by
    /// calling `hooks.track_ended(generation)` exactly once per started play.
    async fn play(
        &self,
        artifact: &Path,
        generation: u64,
        hooks: SessionHooks,
    ) -> Result<(), SessionError>;

    async fn stop(&self) -> Result<(), SessionError>;

    async fn pause(&self) -> Result<(), SessionError>;

    async fn resume(&self) -> Result<(), SessionError>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;
}

/// Songbird-backed transport for one guild.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: parking_lot::Mutex<Option<Arc<tokio::sync::Mutex<Call>>>>,
    current: parking_lot::Mutex<Option<TrackHandle>>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId) -> Self {
        Self {
            manager,
            guild_id,
            call: parking_lot::Mutex::new(None),
            current: parking_lot::Mutex::new(None),
        }
    }

    fn call(&self) -> Result<Arc<tokio::sync::Mutex<Call>>, SessionError> {
        self.call
            .lock()
            .clone()
            .ok_or(SessionError::NotConnected)
    }

    fn current_track(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, channel: ChannelId, hooks: SessionHooks) -> Result<(), SessionError> {
        let call = self
            .manager
            .join(self.guild_id, channel)
            .await
            .map_err(|e| SessionError::Transport(anyhow!("voice join failed: {e}")))?;

        {
            let mut handler = call.lock().await;
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier {
                    guild_id: self.guild_id,
                    hooks,
                },
            );
        }

        *self.call.lock() = Some(call);
        info!("🔊 Voice connected in guild {}", self.guild_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        *self.current.lock() = None;
        *self.call.lock() = None;
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| SessionError::Transport(anyhow!("voice leave failed: {e}")))?;
        info!("👋 Voice disconnected in guild {}", self.guild_id);
        Ok(())
    }

    async fn play(
        &self,
        artifact: &Path,
        generation: u64,
        hooks: SessionHooks,
    ) -> Result<(), SessionError> {
        let call = self.call()?;
        let input: Input = File::new(artifact.to_path_buf()).into();

        let mut handler = call.lock().await;
        let track = handler.play_input(input);

        track
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier { generation, hooks },
            )
            .map_err(|e| SessionError::Transport(anyhow!("track event hookup failed: {e}")))?;

        *self.current.lock() = Some(track);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SessionError> {
        if let Some(track) = self.current.lock().take() {
            track
                .stop()
                .map_err(|e| SessionError::Transport(anyhow!("track stop failed: {e}")))?;
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), SessionError> {
        let track = self
            .current_track()
            .ok_or(SessionError::NoActivePlayback)?;
        track
            .pause()
            .map_err(|e| SessionError::Transport(anyhow!("track pause failed: {e}")))
    }

    async fn resume(&self) -> Result<(), SessionError> {
        let track = self
            .current_track()
            .ok_or(SessionError::NoActivePlayback)?;
        track
            .play()
            .map_err(|e| SessionError::Transport(anyhow!("track resume failed: {e}")))
    }

    async fn is_playing(&self) -> bool {
        match self.current_track() {
            Some(track) => matches!(
                track.get_info().await.map(|info| info.playing),
                Ok(PlayMode::Play)
            ),
            None => false,
        }
    }

    async fn is_paused(&self) -> bool {
        match self.current_track() {
            Some(track) => matches!(
                track.get_info().await.map(|info| info.playing),
                Ok(PlayMode::Pause)
            ),
            None => false,
        }
    }
}

/// Reports natural end-of-track into the session loop, tagged with the
/// activation generation so a late event cannot double-advance the machine.
struct TrackEndNotifier {
    generation: u64,
    hooks: SessionHooks,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Track ended (generation {})", self.generation);
        self.hooks.track_ended(self.generation);
        None
    }
}

/// Reports driver-level disconnects (kicked, channel gone, network drop).
struct DisconnectNotifier {
    guild_id: GuildId,
    hooks: SessionHooks,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(_) = ctx {
            warn!("🔌 Voice driver disconnected in guild {}", self.guild_id);
            self.hooks.disconnected();
        }
        None
    }
}
