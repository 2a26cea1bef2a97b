use std::sync::LazyLock;

use regex::Regex;

use crate::platform::InboundEvent;

/// A mention at the very start of the text: `<@U123>` or `<@W123>`.
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<@(|[WU].+?)>(.*)").expect("mention pattern is valid")
});

/// "<anything>weather in <city>" or "<city> weather<anything>".
static WEATHER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\A(?:.*weather in\s+(.*)|(.*)\s+weather.*)")
        .expect("weather pattern is valid")
});

/// What a bot-directed message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Weather { city: String },
    /// Phrased as a weather request but no city could be read.
    MissingCity,
    Unrecognized,
}

/// Split a leading direct mention into `(mentioned id, trimmed remainder)`.
pub fn parse_direct_mention(text: &str) -> Option<(&str, &str)> {
    let caps = MENTION_RE.captures(text)?;
    let user_id = caps.get(1)?.as_str();
    let rest = caps.get(2).map_or("", |m| m.as_str()).trim();
    Some((user_id, rest))
}

/// First `(command text, channel)` in the batch addressed to `bot_id`.
pub fn parse_bot_commands(events: &[InboundEvent], bot_id: &str) -> Option<(String, String)> {
    events
        .iter()
        .filter(|event| event.is_plain_message())
        .find_map(|event| {
            let text = event.text.as_deref()?;
            let channel = event.channel.as_deref()?;
            match parse_direct_mention(text) {
                Some((user_id, command)) if user_id == bot_id => {
                    Some((command.to_string(), channel.to_string()))
                }
                _ => None,
            }
        })
}

pub fn classify(text: &str) -> Command {
    let Some(caps) = WEATHER_RE.captures(text) else {
        return Command::Unrecognized;
    };

    let city = [caps.get(1), caps.get(2)]
        .into_iter()
        .flatten()
        .map(|m| m.as_str().trim())
        .find(|city| !city.is_empty());

    match city {
        Some(city) => Command::Weather {
            city: city.to_string(),
        },
        None => Command::MissingCity,
    }
}
