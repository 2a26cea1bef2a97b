use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::command::{self, Command};
use crate::platform::{ChatApi, EventFeed};
use crate::weather::{self, WeatherProvider};

pub const UNRECOGNIZED_REPLY: &str = "Wha?";
pub const MISSING_CITY_REPLY: &str = "Did you forget the city name?";

/// Poll → classify → lookup → reply, one command at a time.
pub struct CommandLoop<F, C, W> {
    bot_id: String,
    feed: F,
    chat: C,
    weather: W,
    poll_interval: Duration,
}

impl<F, C, W> CommandLoop<F, C, W>
where
    F: EventFeed,
    C: ChatApi,
    W: WeatherProvider,
{
    pub fn new(bot_id: String, feed: F, chat: C, weather: W, poll_interval: Duration) -> Self {
        Self {
            bot_id,
            feed,
            chat,
            weather,
            poll_interval,
        }
    }

    /// Run until `shutdown` resolves.
    pub async fn run<S>(&mut self, shutdown: S) -> Result<()>
    where
        S: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.poll_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = &mut shutdown => {
                    info!("Shutting down command loop");
                    return Ok(());
                }
            }
        }
    }

    /// Read one batch and handle the first command addressed to the bot.
    /// Returns true if a command was handled.
    pub async fn poll_once(&mut self) -> bool {
        let events = match self.feed.read_events().await {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to read events: {:#}", e);
                return false;
            }
        };

        match command::parse_bot_commands(&events, &self.bot_id) {
            // A bare mention consumes the batch but gets no reply.
            Some((text, _)) if text.is_empty() => {
                debug!("Ignoring mention without command text");
                false
            }
            Some((text, channel)) => {
                self.handle_command(&text, &channel).await;
                true
            }
            None => false,
        }
    }

    pub async fn handle_command(&self, text: &str, channel: &str) {
        info!("Command in {}: {}", channel, text);

        let reply = self.reply_for(command::classify(text)).await;

        if let Err(e) = self.chat.post_message(channel, &reply).await {
            error!("Failed to post reply to {}: {:#}", channel, e);
        }
    }

    async fn reply_for(&self, command: Command) -> String {
        match command {
            Command::Weather { city } => match self.weather.lookup(&city).await {
                Ok(outcome) => {
                    debug!("Weather for {}: {:?}", city, outcome);
                    weather::weather_reply(&city, &outcome)
                }
                Err(e) => {
                    warn!("Weather lookup for {} failed: {:#}", city, e);
                    weather::unavailable_reply(&city)
                }
            },
            Command::MissingCity => MISSING_CITY_REPLY.to_string(),
            Command::Unrecognized => UNRECOGNIZED_REPLY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InboundEvent;
    use crate::weather::WeatherOutcome;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct FakeFeed {
        batches: VecDeque<Result<Vec<InboundEvent>>>,
    }

    #[async_trait]
    impl EventFeed for FakeFeed {
        async fn read_events(&mut self) -> Result<Vec<InboundEvent>> {
            self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingChat {
        posted: Arc<Mutex<Vec<(String, String)>>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatApi for RecordingChat {
        async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
            self.posted
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_string()));
            if self.fail {
                anyhow::bail!("chat.postMessage failed: channel_not_found");
            }
            Ok(())
        }
    }

    /// Answers from a fixed city → condition list; "Nowhere" fails.
    struct FakeWeather;

    #[async_trait]
    impl WeatherProvider for FakeWeather {
        async fn lookup(&self, city: &str) -> Result<WeatherOutcome> {
            match city {
                "Paris" => Ok(WeatherOutcome::Found {
                    condition: "Rain".to_string(),
                }),
                "Nowhere" => anyhow::bail!("connection refused"),
                _ => Ok(WeatherOutcome::NoData),
            }
        }
    }

    fn message(text: &str, channel: &str) -> InboundEvent {
        InboundEvent {
            kind: "message".to_string(),
            text: Some(text.to_string()),
            channel: Some(channel.to_string()),
            ..Default::default()
        }
    }

    fn bot(
        batches: Vec<Result<Vec<InboundEvent>>>,
        chat: RecordingChat,
    ) -> CommandLoop<FakeFeed, RecordingChat, FakeWeather> {
        CommandLoop::new(
            "UBOT".to_string(),
            FakeFeed {
                batches: batches.into(),
            },
            chat,
            FakeWeather,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_weather_command_replies_in_channel() {
        let chat = RecordingChat::default();
        let mut bot = bot(vec![Ok(vec![message("<@UBOT> weather in Paris", "C1")])], chat.clone());

        assert!(bot.poll_once().await);
        assert_eq!(
            chat.posted.lock().unwrap().as_slice(),
            &[(
                "C1".to_string(),
                "It's rain in Paris. :rain_cloud: Don't forget your umbrella.".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_unrecognized_and_missing_city() {
        let chat = RecordingChat::default();
        let mut bot = bot(vec![Ok(vec![message("<@UBOT> hello", "C1")])], chat.clone());

        bot.poll_once().await;
        bot.handle_command("weather in  ", "C2").await;
        let posted = chat.posted.lock().unwrap();
        assert_eq!(posted[0], ("C1".to_string(), "Wha?".to_string()));
        assert_eq!(
            posted[1],
            ("C2".to_string(), MISSING_CITY_REPLY.to_string())
        );
    }

    #[tokio::test]
    async fn test_bare_mention_is_silent() {
        let chat = RecordingChat::default();
        let mut bot = bot(
            vec![Ok(vec![
                message("<@UBOT>", "C1"),
                message("<@UBOT> weather in Paris", "C2"),
            ])],
            chat.clone(),
        );

        assert!(!bot.poll_once().await);
        assert!(chat.posted.lock().unwrap().is_empty());

        let mut bot = bot_with_text("<@UBOT>   ", chat.clone());
        assert!(!bot.poll_once().await);
        assert!(chat.posted.lock().unwrap().is_empty());
    }

    fn bot_with_text(
        text: &str,
        chat: RecordingChat,
    ) -> CommandLoop<FakeFeed, RecordingChat, FakeWeather> {
        bot(vec![Ok(vec![message(text, "C1")])], chat)
    }

    #[tokio::test]
    async fn test_no_data_reply() {
        let chat = RecordingChat::default();
        let mut bot = bot(vec![Ok(vec![message("<@UBOT> Atlantis weather", "C1")])], chat.clone());

        bot.poll_once().await;
        assert_eq!(
            chat.posted.lock().unwrap()[0].1,
            "I'm sorry I can't find the weather for Atlantis"
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_is_reported_not_fatal() {
        let chat = RecordingChat::default();
        let mut bot = bot(
            vec![
                Ok(vec![message("<@UBOT> weather in Nowhere", "C1")]),
                Ok(vec![message("<@UBOT> weather in Paris", "C1")]),
            ],
            chat.clone(),
        );

        assert!(bot.poll_once().await);
        assert!(bot.poll_once().await);
        let posted = chat.posted.lock().unwrap();
        assert_eq!(posted[0].1, weather::unavailable_reply("Nowhere"));
        assert!(posted[1].1.starts_with("It's rain in Paris."));
    }

    #[tokio::test]
    async fn test_only_first_command_in_batch_is_handled() {
        let chat = RecordingChat::default();
        let mut bot = bot(
            vec![Ok(vec![
                message("<@UBOT> weather in Paris", "C1"),
                message("<@UBOT> hello", "C2"),
            ])],
            chat.clone(),
        );

        bot.poll_once().await;
        assert_eq!(chat.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ignores_messages_for_others() {
        let chat = RecordingChat::default();
        let mut bot = bot(
            vec![Ok(vec![
                message("weather in Paris", "C1"),
                message("<@UOTHER> weather in Paris", "C1"),
            ])],
            chat.clone(),
        );

        assert!(!bot.poll_once().await);
        assert!(chat.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feed_and_post_errors_do_not_stop_loop() {
        let chat = RecordingChat {
            fail: true,
            ..Default::default()
        };
        let mut bot = bot(
            vec![
                Err(anyhow::anyhow!("RTM reconnect failed")),
                Ok(vec![message("<@UBOT> hello", "C1")]),
            ],
            chat.clone(),
        );

        assert!(!bot.poll_once().await);
        assert!(bot.poll_once().await);
        assert_eq!(chat.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let chat = RecordingChat::default();
        let mut bot = bot(vec![Ok(vec![message("<@UBOT> hello", "C1")])], chat.clone());

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            bot.run(async {
                rx.await.ok();
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(chat.posted.lock().unwrap()[0].1, "Wha?");
    }
}
