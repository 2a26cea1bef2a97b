use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::WeatherConfig;

/// Reaction and advice appended to a reply for a known condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: &'static str,
    pub advice: &'static str,
}

const REACTIONS: &[(&str, Reaction)] = &[
    (
        "clear",
        Reaction {
            emoji: "mostly_sunny",
            advice: "It's good idea to wear sunglasses before going out",
        },
    ),
    ("cloud", Reaction { emoji: "cloud", advice: "" }),
    ("clouds", Reaction { emoji: "cloud", advice: "" }),
    ("smoke", Reaction { emoji: "smoking", advice: "" }),
    (
        "rain",
        Reaction {
            emoji: "rain_cloud",
            advice: "Don't forget your umbrella.",
        },
    ),
    (
        "thunderstorm",
        Reaction {
            emoji: "rain_cloud",
            advice: "Don't go outside.",
        },
    ),
];

/// Look up the reaction for a lowercase condition keyword.
pub fn reaction_for(condition: &str) -> Option<Reaction> {
    REACTIONS
        .iter()
        .find(|(key, _)| *key == condition)
        .map(|(_, reaction)| *reaction)
}

/// Result of a lookup that reached the weather service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherOutcome {
    /// `weather[0].main` as reported, e.g. "Rain"
    Found { condition: String },
    NoData,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// `Err` means the service could not be reached; missing data is `NoData`.
    async fn lookup(&self, city: &str) -> Result<WeatherOutcome>;
}

pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build weather HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl WeatherProvider for WeatherClient {
    async fn lookup(&self, city: &str) -> Result<WeatherOutcome> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        debug!("Looking up weather for {}", city);

        let response = self
            .http
            .get(&url)
            .query(&[("q", city), ("appid", self.api_key.as_str())])
            .send()
            .await
            .context("Failed to send request to weather service")?;

        let status = response.status();
        if status.is_server_error() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Weather service error ({}): {}", status, error_body);
        }

        let body = response
            .text()
            .await
            .context("Failed to read weather service response")?;

        if !status.is_success() {
            warn!("Weather service returned {} for {}", status, city);
        }

        Ok(parse_outcome(&body))
    }
}

/// Read `weather[0].main` from a response body.
fn parse_outcome(body: &str) -> WeatherOutcome {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return WeatherOutcome::NoData;
    };

    match json
        .get("weather")
        .and_then(|w| w.get(0))
        .and_then(|w| w.get("main"))
        .and_then(Value::as_str)
    {
        Some(main) => WeatherOutcome::Found {
            condition: main.to_string(),
        },
        None => WeatherOutcome::NoData,
    }
}

pub fn weather_reply(city: &str, outcome: &WeatherOutcome) -> String {
    match outcome {
        WeatherOutcome::Found { condition } => {
            let condition = condition.to_lowercase();
            let reply = format!("It's {} in {}.", condition, city);
            match reaction_for(&condition) {
                Some(reaction) => format!("{} :{}: {}", reply, reaction.emoji, reaction.advice)
                    .trim_end()
                    .to_string(),
                None => reply,
            }
        }
        WeatherOutcome::NoData => format!("I'm sorry I can't find the weather for {}", city),
    }
}

pub fn unavailable_reply(city: &str) -> String {
    format!(
        "I couldn't reach the weather service for {}. Please try again later.",
        city
    )
}
