//! Discord front-end: slash command registration, interaction dispatch and
//! voice lifecycle watching. Each guild gets its own [`SessionHandle`]; the
//! bot layer only translates Discord events into session commands and events.

pub mod commands;

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::gateway::ChannelStatusSink;
use crate::resolver::YtDlpResolver;
use crate::session::{
    CleanupCoordinator, PlaybackQueue, SessionController, SessionHandle,
};
use crate::storage::QueueSnapshotStore;
use crate::voice::SongbirdTransport;

pub struct JukeboxBot {
    config: Arc<Config>,
    sessions: DashMap<GuildId, SessionHandle>,
    store: Arc<QueueSnapshotStore>,
}

impl JukeboxBot {
    pub fn new(config: Config, store: Arc<QueueSnapshotStore>) -> Self {
        Self {
            config: Arc::new(config),
            sessions: DashMap::new(),
            store,
        }
    }

    pub fn existing_session(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Returns the guild's session, building one on first use. The session is
    /// wired to the text channel the triggering command came from.
    pub async fn session_for(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        text_channel: ChannelId,
    ) -> Result<SessionHandle> {
        if let Some(session) = self.existing_session(guild_id) {
            return Ok(session);
        }

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("songbird not initialized"))?;

        let queue = Arc::new(PlaybackQueue::new());
        let cleanup =
            CleanupCoordinator::new(self.config.scratch_dir.clone(), Arc::clone(&queue));
        let resolver = Arc::new(YtDlpResolver::new(
            self.config.scratch_dir.clone(),
            self.config.allowed_hosts.clone(),
            Duration::from_secs(self.config.resolve_timeout_secs),
        ));
        let transport = Arc::new(SongbirdTransport::new(manager, guild_id));
        let gateway = Arc::new(ChannelStatusSink::new(ctx.http.clone(), text_channel));

        let session = SessionController::spawn(queue, resolver, transport, gateway, cleanup);

        // Hand back anything a previous voice session left pending.
        let pending = self.store.take(guild_id.get()).await;
        if !pending.is_empty() {
            info!(
                "🔁 Restoring {} pending request(s) for guild {guild_id}",
                pending.len()
            );
            session.restore(pending).await?;
        }

        self.sessions.insert(guild_id, session.clone());
        Ok(session)
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                guild_id
                    .set_commands(&ctx.http, commands::command_definitions())
                    .await?;
                info!("✅ Guild commands registered for {guild_id}");
            }
            None => {
                for command in commands::command_definitions() {
                    ctx.http.create_global_command(&command).await?;
                }
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// The bot was removed from voice (kicked, channel deleted, or an
    /// explicit leave). Snapshot whatever is still pending, deliver the
    /// session-ended event, and retire the session handle.
    async fn on_bot_left_voice(&self, guild_id: GuildId) {
        let Some(session) = self.existing_session(guild_id) else {
            return;
        };

        warn!("🔌 Bot left voice in guild {guild_id}, cleaning up");

        // take_pending (not queue_snapshot): the driver's own disconnect
        // event may already have cleared the queue by the time we run.
        match session.take_pending().await {
            Ok(pending) => {
                if let Err(e) = self.store.save(guild_id.get(), &pending).await {
                    error!("❌ Could not persist queue snapshot: {e:#}");
                }
            }
            Err(e) => warn!("⚠️ Could not snapshot queue before cleanup: {e}"),
        }

        session.hooks().disconnected();
        self.sessions.remove(&guild_id);
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("✅ Connected as {} (id {})", ready.user.name, ready.user.id);

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Command registration failed: {e:#}");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            commands::dispatch(self, &ctx, &command).await;
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;
        if new.user_id != bot_id {
            return;
        }

        let was_in_channel = old.as_ref().and_then(|state| state.channel_id).is_some();
        if was_in_channel && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                self.on_bot_left_voice(guild_id).await;
            }
        }
    }
}
