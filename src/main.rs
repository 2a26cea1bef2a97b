mod bot;
mod command;
mod config;
mod platform;
mod weather;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::CommandLoop;
use crate::config::Config;
use crate::platform::rtm::RtmFeed;
use crate::platform::slack::SlackClient;
use crate::weather::WeatherClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,weatherbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Slack API: {}", config.slack.api_base);
    info!("  Weather API: {}", config.weather.base_url);
    info!("  Poll interval: {:?}", config.bot.poll_interval());

    let slack = SlackClient::new(&config.slack)?;
    let weather = WeatherClient::new(&config.weather)?;

    let (feed, bot_id) = match connect(&slack).await {
        Ok(connected) => connected,
        Err(e) => {
            error!("Connection failed: {:#}", e);
            return Err(e);
        }
    };

    info!("Weather bot connected and running! (bot id {})", bot_id);

    let mut command_loop =
        CommandLoop::new(bot_id, feed, slack, weather, config.bot.poll_interval());
    command_loop
        .run(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}

/// Open the real-time feed and read the bot's own user id.
async fn connect(slack: &SlackClient) -> Result<(RtmFeed, String)> {
    let feed = RtmFeed::connect(slack.clone())
        .await
        .context("Failed to connect to Slack RTM")?;
    let bot_id = slack
        .auth_test()
        .await
        .context("Failed to read bot identity from auth.test")?;
    Ok((feed, bot_id))
}
