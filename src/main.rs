use anyhow::Result;
use serenity::{
    model::{gateway::GatewayIntents, id::ChannelId},
    Client,
};
use songbird::SerenityInit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use jukebox::bot::JukeboxBot;
use jukebox::config::Config;
use jukebox::gateway::{spawn_heartbeat, ChannelStatusSink};
use jukebox::storage::QueueSnapshotStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    let store = Arc::new(QueueSnapshotStore::new(config.data_dir.clone()).await?);

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = JukeboxBot::new(config.clone(), store);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    let _heartbeat = config.heartbeat_channel_id.map(|channel| {
        let sink = ChannelStatusSink::new(client.http.clone(), ChannelId::new(channel));
        spawn_heartbeat(
            Arc::new(sink),
            Duration::from_secs(config.heartbeat_interval_secs),
        )
    });

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("ctrl-c handler registration failed");
        info!("⚠️ Shutdown signal received, exiting...");
        std::process::exit(0);
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {why:?}");
    }

    Ok(())
}
