mod ai;
mod bot;
mod commands;
mod config;
mod error;
mod events;
mod market;
mod moderation;
mod profiles;
mod store;

use anyhow::{Context as _, Result};
use bot::Handler;
use config::Config;
use serenity::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Configuration loaded; data directory {}", config.data_dir.display());

    let token = config.discord_token.clone();
    let handler = Handler::new(config).await;

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await
        .context("failed to build the Discord client")?;

    info!("Starting Startup Hub bot...");

    if let Err(e) = client.start().await {
        error!("Client error: {:?}", e);
    }

    Ok(())
}
