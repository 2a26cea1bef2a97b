use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::SlackConfig;
use crate::platform::ChatApi;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    url: String,
}

/// Slack Web API client authenticated with the bot token.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Slack HTTP client")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    /// The bot's own user id.
    pub async fn auth_test(&self) -> Result<String> {
        let body = self.call("auth.test", None).await?;
        let auth: AuthTestResponse =
            serde_json::from_value(body).context("No user_id in auth.test response")?;
        Ok(auth.user_id)
    }

    /// Websocket URL for a new real-time messaging session.
    pub async fn rtm_connect(&self) -> Result<String> {
        let body = self.call("rtm.connect", None).await?;
        let rtm: RtmConnectResponse =
            serde_json::from_value(body).context("No url in rtm.connect response")?;
        Ok(rtm.url)
    }

    /// POST a Web API method and check Slack's `ok` flag.
    async fn call(&self, method: &str, payload: Option<Value>) -> Result<Value> {
        let url = format!("{}/{}", self.api_base, method);
        debug!("Calling Slack API: {}", method);

        let mut request = self.http.post(&url).bearer_auth(&self.bot_token);
        if let Some(payload) = payload {
            request = request.json(&payload);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack {} HTTP error ({}): {}", method, status, error_body);
        }

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if body["ok"].as_bool() != Some(true) {
            let err = body["error"].as_str().unwrap_or("unknown");
            anyhow::bail!("{} failed: {}", method, err);
        }

        Ok(body)
    }
}

#[async_trait]
impl ChatApi for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        self.call(
            "chat.postMessage",
            Some(json!({
                "channel": channel,
                "text": text,
            })),
        )
        .await?;
        Ok(())
    }
}
