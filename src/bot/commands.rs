use anyhow::Result;
use serenity::{
    builder::{
        CreateCommand, CreateCommandOption, CreateInteractionResponse,
        CreateInteractionResponseMessage,
    },
    model::application::{CommandInteraction, CommandOptionType, ResolvedValue},
    prelude::Context,
};
use tracing::{error, info};

use crate::bot::JukeboxBot;
use crate::error::SessionError;
use crate::session::TrackRequest;

/// The slash command surface.
pub fn command_definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("play")
            .description("Queue a track from a link")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "url", "Link to the track")
                    .required(true),
            ),
        CreateCommand::new("skip").description("Skip to the next track"),
        CreateCommand::new("pause").description("Pause the current track"),
        CreateCommand::new("resume").description("Resume the paused track"),
        CreateCommand::new("stop").description("Stop playback and clear the queue"),
        CreateCommand::new("leave").description("Disconnect the bot and clean up"),
        CreateCommand::new("queue").description("Show what is playing and what is pending"),
        CreateCommand::new("ping").description("Check that the bot is alive"),
    ]
}

/// Routes one slash command into the guild's session.
pub async fn dispatch(bot: &JukeboxBot, ctx: &Context, command: &CommandInteraction) {
    let name = command.data.name.as_str();
    info!("💬 /{name} from {}", command.user.name);

    let Some(guild_id) = command.guild_id else {
        respond(ctx, command, "❌ This command only works in a server.", true).await;
        return;
    };

    let result = match name {
        "play" => play(bot, ctx, command, guild_id).await,
        "skip" => {
            simple(bot, ctx, command, guild_id, |s| async move { s.skip().await }, "⏭️ Skipped.")
                .await
        }
        "pause" => {
            simple(bot, ctx, command, guild_id, |s| async move { s.pause().await }, "⏸️ Paused.")
                .await
        }
        "resume" => {
            simple(bot, ctx, command, guild_id, |s| async move { s.resume().await }, "▶️ Resumed.")
                .await
        }
        "stop" => {
            simple(
                bot,
                ctx,
                command,
                guild_id,
                |s| async move { s.stop().await },
                "🛑 Playback stopped and queue cleared.",
            )
            .await
        }
        "leave" => {
            simple(
                bot,
                ctx,
                command,
                guild_id,
                |s| async move { s.leave().await },
                "👋 Disconnected.",
            )
            .await
        }
        "queue" => show_queue(bot, ctx, command, guild_id).await,
        "ping" => {
            respond(ctx, command, "🏓 Pong!", false).await;
            Ok(())
        }
        other => {
            respond(ctx, command, "❌ Unknown command.", true).await;
            error!("Unknown command: {other}");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("❌ Command /{name} failed: {e:#}");
        respond(ctx, command, "❌ Something went wrong.", true).await;
    }
}

async fn play(
    bot: &JukeboxBot,
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: serenity::model::id::GuildId,
) -> Result<()> {
    let Some(url) = string_option(command, "url") else {
        respond(ctx, command, "❌ Missing track link.", true).await;
        return Ok(());
    };

    // Cache lookup stays in its own scope so no guard lives across an await.
    let voice_channel = {
        ctx.cache.guild(guild_id).and_then(|guild| {
            guild
                .voice_states
                .get(&command.user.id)
                .and_then(|vs| vs.channel_id)
        })
    };

    let session = bot.session_for(ctx, guild_id, command.channel_id).await?;
    let request = TrackRequest::new(url.clone(), command.user.id);

    match session.enqueue(request, voice_channel).await {
        Ok(()) => {
            respond(ctx, command, &format!("🎵 Added to queue: {url}"), true).await;
        }
        Err(e) => {
            reply_error(ctx, command, &e).await;
        }
    }
    Ok(())
}

async fn simple<F, Fut>(
    bot: &JukeboxBot,
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: serenity::model::id::GuildId,
    op: F,
    success: &str,
) -> Result<()>
where
    F: FnOnce(crate::session::SessionHandle) -> Fut,
    Fut: std::future::Future<Output = Result<(), SessionError>>,
{
    let Some(session) = bot.existing_session(guild_id) else {
        respond(ctx, command, &SessionError::NotConnected.user_message(), true).await;
        return Ok(());
    };

    match op(session).await {
        Ok(()) => respond(ctx, command, success, true).await,
        Err(e) => reply_error(ctx, command, &e).await,
    }
    Ok(())
}

async fn show_queue(
    bot: &JukeboxBot,
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: serenity::model::id::GuildId,
) -> Result<()> {
    let Some(session) = bot.existing_session(guild_id) else {
        respond(ctx, command, "📭 Nothing queued.", true).await;
        return Ok(());
    };

    let now_playing = session.now_playing().await?;
    let pending = session.queue_snapshot().await?;

    let mut lines = Vec::new();
    match now_playing {
        Some(title) => lines.push(format!("🎶 Now playing: {title}")),
        None => lines.push("📭 Nothing is playing.".to_string()),
    }
    for (i, request) in pending.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, request.url));
    }

    respond(ctx, command, &lines.join("\n"), true).await;
    Ok(())
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command.data.options().into_iter().find_map(|opt| {
        if opt.name == name {
            match opt.value {
                ResolvedValue::String(s) => Some(s.to_string()),
                _ => None,
            }
        } else {
            None
        }
    })
}

async fn reply_error(ctx: &Context, command: &CommandInteraction, error: &SessionError) {
    respond(ctx, command, &error.user_message(), true).await;
}

async fn respond(ctx: &Context, command: &CommandInteraction, text: &str, ephemeral: bool) {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(text)
            .ephemeral(ephemeral),
    );
    if let Err(e) = command.create_response(&ctx.http, response).await {
        error!("❌ Could not respond to interaction: {e}");
    }
}
