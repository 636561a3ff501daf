//! The playback session: one voice connection, one queue, one state machine.
//!
//! All commands and lifecycle events for a session flow through a single
//! unbounded channel and are handled one at a time by the controller task, so
//! no two state transitions ever interleave. Long-running work (resolution,
//! voice I/O) happens on background tasks and re-enters the loop as events
//! tagged with the generation of the activation that produced them; an event
//! carrying a stale generation is a no-op.

pub mod cleanup;
pub mod queue;

use serenity::model::id::ChannelId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::gateway::StatusSink;
use crate::resolver::{ResolvedTrack, TrackResolver};
use crate::voice::VoiceTransport;

pub use cleanup::CleanupCoordinator;
pub use queue::{PlaybackQueue, TrackRequest};

/// Where the session currently is. `Stopped` is a transient teardown state;
/// the resting state after cleanup is always `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Playing,
    Paused,
    Stopped,
}

type Ack = oneshot::Sender<Result<(), SessionError>>;

enum SessionCommand {
    Enqueue {
        request: TrackRequest,
        voice_channel: Option<ChannelId>,
        ack: Ack,
    },
    Skip { ack: Ack },
    Pause { ack: Ack },
    Resume { ack: Ack },
    Stop { ack: Ack },
    Leave { ack: Ack },
    Restore {
        requests: Vec<TrackRequest>,
        ack: Ack,
    },
    QueueSnapshot {
        reply: oneshot::Sender<Vec<TrackRequest>>,
    },
    TakePending {
        reply: oneshot::Sender<Vec<TrackRequest>>,
    },
    NowPlaying {
        reply: oneshot::Sender<Option<String>>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
}

enum SessionEvent {
    Resolved {
        generation: u64,
        result: Result<ResolvedTrack, SessionError>,
    },
    TrackEnded { generation: u64 },
    Disconnected,
}

enum SessionMessage {
    Command(SessionCommand),
    Event(SessionEvent),
}

/// Entry point for lifecycle events raised outside the command loop: the
/// voice driver's end-of-track notification and external disconnects.
///
/// Holds only a weak sender, so a transport hanging on to hooks does not keep
/// a retired session loop alive.
#[derive(Clone)]
pub struct SessionHooks {
    tx: mpsc::WeakUnboundedSender<SessionMessage>,
}

impl SessionHooks {
    fn send(&self, event: SessionEvent) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(SessionMessage::Event(event));
        }
    }

    /// The sink finished streaming the activation identified by `generation`.
    pub fn track_ended(&self, generation: u64) {
        self.send(SessionEvent::TrackEnded { generation });
    }

    /// The voice session ended for any reason (explicit or external).
    pub fn disconnected(&self) {
        self.send(SessionEvent::Disconnected);
    }
}

/// Cloneable command surface of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMessage>,
}

impl SessionHandle {
    async fn command<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionMessage::Command(build(reply)))
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }

    /// Submits a request. Connects to `voice_channel` first if the session has
    /// no live voice connection yet; playback starts automatically when the
    /// session is idle.
    pub async fn enqueue(
        &self,
        request: TrackRequest,
        voice_channel: Option<ChannelId>,
    ) -> Result<(), SessionError> {
        self.command(|ack| SessionCommand::Enqueue {
            request,
            voice_channel,
            ack,
        })
        .await?
    }

    pub async fn skip(&self) -> Result<(), SessionError> {
        self.command(|ack| SessionCommand::Skip { ack }).await?
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.command(|ack| SessionCommand::Pause { ack }).await?
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.command(|ack| SessionCommand::Resume { ack }).await?
    }

    /// Stops playback, clears the queue and sweeps the scratch directory.
    /// Stays connected to voice.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.command(|ack| SessionCommand::Stop { ack }).await?
    }

    /// `stop` plus disconnecting from the voice channel.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.command(|ack| SessionCommand::Leave { ack }).await?
    }

    /// Hook for an external persistence store: refills the queue.
    pub async fn restore(&self, requests: Vec<TrackRequest>) -> Result<(), SessionError> {
        self.command(|ack| SessionCommand::Restore { requests, ack })
            .await?
    }

    /// Hook for an external persistence store: pending requests, in order.
    pub async fn queue_snapshot(&self) -> Result<Vec<TrackRequest>, SessionError> {
        self.command(|reply| SessionCommand::QueueSnapshot { reply })
            .await
    }

    /// Pending requests to persist when the voice session ends. Unlike
    /// [`queue_snapshot`](Self::queue_snapshot), this still returns the queue
    /// as it stood at the disconnect even when the teardown event reached the
    /// loop first and already cleared it. Consuming: a second call after a
    /// disconnect finds nothing.
    pub async fn take_pending(&self) -> Result<Vec<TrackRequest>, SessionError> {
        self.command(|reply| SessionCommand::TakePending { reply })
            .await
    }

    pub async fn now_playing(&self) -> Result<Option<String>, SessionError> {
        self.command(|reply| SessionCommand::NowPlaying { reply })
            .await
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        self.command(|reply| SessionCommand::State { reply }).await
    }

    pub fn hooks(&self) -> SessionHooks {
        SessionHooks {
            tx: self.tx.downgrade(),
        }
    }
}

/// The state machine. Owns the queue, the active track and the generation
/// counter; everything mutable is touched only from the controller task.
pub struct SessionController {
    state: SessionState,
    generation: u64,
    connected: bool,
    current: Option<ResolvedTrack>,
    resolve_cancel: Option<CancellationToken>,
    // Queue as it stood at the last disconnect, held until persisted.
    retired: Option<Vec<TrackRequest>>,

    queue: Arc<PlaybackQueue>,
    resolver: Arc<dyn TrackResolver>,
    transport: Arc<dyn VoiceTransport>,
    gateway: Arc<dyn StatusSink>,
    cleanup: CleanupCoordinator,

    // Weak on purpose: the loop must exit once every handle is dropped.
    tx: mpsc::WeakUnboundedSender<SessionMessage>,
}

impl SessionController {
    /// Builds a controller and runs it on its own task. The returned handle is
    /// the only way in.
    pub fn spawn(
        queue: Arc<PlaybackQueue>,
        resolver: Arc<dyn TrackResolver>,
        transport: Arc<dyn VoiceTransport>,
        gateway: Arc<dyn StatusSink>,
        cleanup: CleanupCoordinator,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let controller = Self {
            state: SessionState::Idle,
            generation: 0,
            connected: false,
            current: None,
            resolve_cancel: None,
            retired: None,
            queue,
            resolver,
            transport,
            gateway,
            cleanup,
            tx: tx.downgrade(),
        };

        tokio::spawn(controller.run(rx));

        SessionHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                SessionMessage::Command(command) => self.handle_command(command).await,
                SessionMessage::Event(event) => self.handle_event(event).await,
            }
        }
        debug!("Session loop finished");
    }

    fn hooks(&self) -> SessionHooks {
        SessionHooks {
            tx: self.tx.clone(),
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Enqueue {
                request,
                voice_channel,
                ack,
            } => {
                let _ = ack.send(self.enqueue(request, voice_channel).await);
            }
            SessionCommand::Skip { ack } => {
                let _ = ack.send(self.skip().await);
            }
            SessionCommand::Pause { ack } => {
                let _ = ack.send(self.pause().await);
            }
            SessionCommand::Resume { ack } => {
                let _ = ack.send(self.resume().await);
            }
            SessionCommand::Stop { ack } => {
                let _ = ack.send(self.stop(false).await);
            }
            SessionCommand::Leave { ack } => {
                let _ = ack.send(self.stop(true).await);
            }
            SessionCommand::Restore { requests, ack } => {
                for request in requests {
                    self.queue.enqueue(request);
                }
                if self.connected && self.state == SessionState::Idle {
                    self.start_next().await;
                }
                let _ = ack.send(Ok(()));
            }
            SessionCommand::QueueSnapshot { reply } => {
                let _ = reply.send(self.queue.snapshot());
            }
            SessionCommand::TakePending { reply } => {
                let pending = self
                    .retired
                    .take()
                    .unwrap_or_else(|| self.queue.snapshot());
                let _ = reply.send(pending);
            }
            SessionCommand::NowPlaying { reply } => {
                let _ = reply.send(self.current.as_ref().map(|t| t.title.clone()));
            }
            SessionCommand::State { reply } => {
                let _ = reply.send(self.state);
            }
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Resolved { generation, result } => {
                self.on_resolved(generation, result).await;
            }
            SessionEvent::TrackEnded { generation } => {
                self.on_track_ended(generation).await;
            }
            SessionEvent::Disconnected => {
                self.on_disconnected().await;
            }
        }
    }

    async fn enqueue(
        &mut self,
        request: TrackRequest,
        voice_channel: Option<ChannelId>,
    ) -> Result<(), SessionError> {
        // Reject before touching the queue or the voice connection.
        self.resolver.validate(&request.url)?;

        if !self.connected {
            let channel = voice_channel.ok_or(SessionError::NotInVoiceChannel)?;
            self.transport.connect(channel, self.hooks()).await?;
            self.connected = true;
            // A fresh voice session invalidates whatever an earlier
            // disconnect left unclaimed.
            self.retired = None;
            info!("🔊 Joined voice channel {channel}");
        }

        self.queue.enqueue(request);

        if self.state == SessionState::Idle {
            self.start_next().await;
        }

        Ok(())
    }

    /// Dequeues the head and starts resolving it, or settles in `Idle` when
    /// the queue is drained. Each activation gets a fresh generation.
    async fn start_next(&mut self) {
        match self.queue.dequeue_front() {
            Some(request) => {
                self.state = SessionState::Resolving;
                self.generation += 1;
                let generation = self.generation;

                let cancel = CancellationToken::new();
                self.resolve_cancel = Some(cancel.clone());

                let resolver = Arc::clone(&self.resolver);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = resolver.resolve(request, cancel).await;
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(SessionMessage::Event(SessionEvent::Resolved {
                            generation,
                            result,
                        }));
                    }
                });
            }
            None => {
                self.state = SessionState::Idle;
                info!("🎵 Queue drained, session idle");
            }
        }
    }

    async fn on_resolved(
        &mut self,
        generation: u64,
        result: Result<ResolvedTrack, SessionError>,
    ) {
        if generation != self.generation || self.state != SessionState::Resolving {
            // A skip/stop superseded this resolution while it was in flight;
            // whatever it produced must not play.
            debug!("Stale resolution result (generation {generation}), discarding");
            if let Ok(track) = result {
                self.cleanup.discard(&track.artifact).await;
            }
            return;
        }

        self.resolve_cancel = None;

        match result {
            Ok(track) => match self
                .transport
                .play(&track.artifact, self.generation, self.hooks())
                .await
            {
                Ok(()) => {
                    info!("🎶 Playing: {}", track.title);
                    self.state = SessionState::Playing;
                    self.gateway
                        .send_status(&format!("🎶 Now playing: {}", track.title))
                        .await;
                    self.current = Some(track);
                }
                Err(e) => {
                    error!("❌ Could not start playback: {e}");
                    self.gateway.send_status(&e.user_message()).await;
                    self.cleanup.discard(&track.artifact).await;
                    self.start_next().await;
                }
            },
            Err(SessionError::Cancelled) => {
                // Superseded mid-flight but nothing else tore the session
                // down; move on quietly.
                self.start_next().await;
            }
            Err(e) => {
                warn!("❌ Resolution failed: {e}");
                self.gateway.send_status(&e.user_message()).await;
                self.start_next().await;
            }
        }
    }

    async fn on_track_ended(&mut self, generation: u64) {
        if generation != self.generation
            || !matches!(self.state, SessionState::Playing | SessionState::Paused)
        {
            // Raced with an explicit skip/stop that already advanced the
            // machine; only the first arrival wins.
            debug!("Stale track-end (generation {generation}), ignoring");
            return;
        }

        info!("🎵 Track finished");
        if let Some(track) = self.current.take() {
            self.cleanup.discard(&track.artifact).await;
        }
        self.generation += 1;
        self.start_next().await;
    }

    async fn skip(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Playing | SessionState::Paused) {
            return Err(SessionError::NoActivePlayback);
        }

        info!("⏭️ Skipping current track");
        // Invalidate the end-of-track event the sink will raise for the
        // playback we are about to stop.
        self.generation += 1;
        if let Some(track) = self.current.take() {
            self.cleanup.discard(&track.artifact).await;
        }
        if let Err(e) = self.transport.stop().await {
            warn!("⚠️ Sink stop failed during skip: {e}");
        }
        self.start_next().await;
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Playing {
            return Err(SessionError::NoActivePlayback);
        }
        self.transport.pause().await?;
        self.state = SessionState::Paused;
        info!("⏸️ Playback paused");
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Paused {
            return Err(SessionError::NoActivePlayback);
        }
        self.transport.resume().await?;
        self.state = SessionState::Playing;
        info!("▶️ Playback resumed");
        Ok(())
    }

    async fn stop(&mut self, disconnect: bool) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }

        self.state = SessionState::Stopped;

        if let Some(cancel) = self.resolve_cancel.take() {
            cancel.cancel();
        }
        self.generation += 1;
        if let Some(track) = self.current.take() {
            self.cleanup.discard(&track.artifact).await;
        }
        if let Err(e) = self.transport.stop().await {
            warn!("⚠️ Sink stop failed: {e}");
        }

        self.cleanup.cleanup().await;

        if disconnect {
            if let Err(e) = self.transport.disconnect().await {
                warn!("⚠️ Voice disconnect failed: {e}");
            }
            self.connected = false;
            info!("👋 Left voice channel");
        }

        // Stopped is transient; the session rests in Idle.
        self.state = SessionState::Idle;
        info!("🛑 Playback stopped, queue cleared");
        Ok(())
    }

    /// The voice session ended underneath us (kick, channel deleted, network).
    /// Same cleanup as an explicit stop, minus transport calls.
    ///
    /// The pending queue is stashed before the sweep: the gateway layer's own
    /// disconnect notification may reach the loop after this event, and its
    /// persistence pass must still see what was queued.
    async fn on_disconnected(&mut self) {
        info!("🔌 Voice session ended, cleaning up");

        self.retired = Some(self.queue.snapshot());

        if let Some(cancel) = self.resolve_cancel.take() {
            cancel.cancel();
        }
        self.generation += 1;
        self.current = None;
        self.connected = false;
        self.state = SessionState::Stopped;

        self.cleanup.cleanup().await;

        self.state = SessionState::Idle;
    }
}
