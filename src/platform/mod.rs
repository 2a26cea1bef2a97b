pub mod rtm;
pub mod slack;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// One event delivered by the real-time feed.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct InboundEvent {
    /// Event type, e.g. "message", "hello", "user_typing"
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Set on edits, joins, bot messages and other non-plain messages
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

impl InboundEvent {
    /// A plain chat message: kind "message" with no subtype.
    pub fn is_plain_message(&self) -> bool {
        self.kind == "message" && self.subtype.is_none()
    }
}

/// Source of inbound events, read in batches.
#[async_trait]
pub trait EventFeed: Send {
    /// Everything buffered since the previous read, in delivery order.
    async fn read_events(&mut self) -> Result<Vec<InboundEvent>>;
}

/// Outbound side of the messaging service.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn post_message(&self, channel: &str, text: &str) -> Result<()>;
}
