use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::platform::slack::SlackClient;
use crate::platform::{EventFeed, InboundEvent};

const MAX_BACKOFF_SECS: u64 = 60;

/// Slack real-time messaging session.
///
/// A background task reads the websocket and buffers parsed events;
/// `read_events` drains the buffer without waiting. When the socket closes
/// the feed reconnects through `rtm.connect` with exponential backoff.
pub struct RtmFeed {
    slack: SlackClient,
    rx: mpsc::UnboundedReceiver<InboundEvent>,
    reader: JoinHandle<()>,
    closed: bool,
    attempt: u32,
    retry_at: Instant,
}

impl RtmFeed {
    /// Open the first session. Failure here means the bot never starts.
    pub async fn connect(slack: SlackClient) -> Result<Self> {
        let (rx, reader) = open_session(&slack).await?;
        Ok(Self {
            slack,
            rx,
            reader,
            closed: false,
            attempt: 0,
            retry_at: Instant::now(),
        })
    }

    async fn reconnect_if_due(&mut self) -> Result<bool> {
        if Instant::now() < self.retry_at {
            return Ok(false);
        }

        info!("Reconnecting to Slack RTM (attempt {})", self.attempt + 1);
        match open_session(&self.slack).await {
            Ok((rx, reader)) => {
                self.reader.abort();
                self.rx = rx;
                self.reader = reader;
                self.closed = false;
                self.attempt = 0;
                info!("Slack RTM reconnected");
                Ok(true)
            }
            Err(e) => {
                self.attempt += 1;
                let delay = backoff(self.attempt);
                self.retry_at = Instant::now() + delay;
                Err(e.context(format!("RTM reconnect failed, retrying in {:?}", delay)))
            }
        }
    }
}

impl Drop for RtmFeed {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl EventFeed for RtmFeed {
    async fn read_events(&mut self) -> Result<Vec<InboundEvent>> {
        if self.closed && !self.reconnect_if_due().await? {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("Slack RTM connection closed");
                    self.closed = true;
                    self.retry_at = Instant::now() + backoff(self.attempt);
                    break;
                }
            }
        }
        Ok(events)
    }
}

async fn open_session(
    slack: &SlackClient,
) -> Result<(mpsc::UnboundedReceiver<InboundEvent>, JoinHandle<()>)> {
    let url = slack.rtm_connect().await?;
    debug!("Opening RTM websocket");

    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .context("Failed to open RTM websocket")?;

    let (tx, rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(async move {
        let (mut write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(event) = parse_frame(text.as_str()) {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Ping(data)) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Slack closed the RTM connection");
                    break;
                }
                Err(e) => {
                    error!("RTM websocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok((rx, reader))
}

/// Parse one text frame. Frames that are not event objects are dropped.
fn parse_frame(text: &str) -> Option<InboundEvent> {
    match serde_json::from_str::<InboundEvent>(text) {
        Ok(event) if !event.kind.is_empty() => Some(event),
        Ok(_) => {
            debug!("Ignoring RTM frame without a type");
            None
        }
        Err(e) => {
            debug!("Ignoring unparseable RTM frame: {}", e);
            None
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt.min(6)).min(MAX_BACKOFF_SECS))
}
