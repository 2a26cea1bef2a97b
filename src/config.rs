use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const SLACK_TOKEN_ENV: &str = "BOT_USER_OAUTH_ACCESS_TOKEN";
pub const WEATHER_KEY_ENV: &str = "WEATHER_API_KEY";
pub const ENV_FILE_ENV: &str = "WEATHERBOT_ENV_FILE";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    /// Delay between two reads of the event feed.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_slack_api_base(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_weather_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Key/value pairs from a dotenv file; a missing file is empty.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read env file: {}", path.display()))
        }
    };

    iter.map(|item| {
        item.with_context(|| format!("Failed to parse env file: {}", path.display()))
    })
    .collect()
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_weather_base_url() -> String {
    "https://api.openweathermap.org".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BotConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load the optional TOML file at `path`, then apply secrets from the
    /// process environment and the dotenv file.
    pub fn load(path: &Path) -> Result<Self> {
        let env_file = std::env::var(ENV_FILE_ENV).unwrap_or_else(|_| ".env".to_string());
        Self::load_from(path, Path::new(&env_file), |key| std::env::var(key).ok())
    }

    /// Like `load`, with the environment supplied by `lookup`. Values from
    /// `lookup` win over the dotenv file, which is read without touching the
    /// process environment.
    pub fn load_from<F>(path: &Path, env_file: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dotenv = read_env_file(env_file)?;

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| dotenv.get(key).cloned())
        });
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override secrets with non-empty values returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(SLACK_TOKEN_ENV) {
            self.slack.bot_token = token;
        }
        if let Some(key) = non_empty(WEATHER_KEY_ENV) {
            self.weather.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.slack.bot_token.trim().is_empty() {
            anyhow::bail!(
                "Slack bot token is missing: set {} or [slack] bot_token",
                SLACK_TOKEN_ENV
            );
        }
        if self.weather.api_key.trim().is_empty() {
            anyhow::bail!(
                "Weather API key is missing: set {} or [weather] api_key",
                WEATHER_KEY_ENV
            );
        }
        Ok(())
    }
}
