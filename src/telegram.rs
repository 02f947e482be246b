//! Telegram delivery: the [`Notifier`] seam and the outbound message format.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, ParseMode, Recipient};
use teloxide::utils::markdown;
use teloxide::Bot;

use crate::model::Tweet;

/// Write side of the delivery pipeline. `deliver` returning `Err` means the
/// message must be retried; the caller decides what that does to watermarks.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, chat: &str, text: &str) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, chat: &str, text: &str) -> Result<()> {
        let target = parse_chat_target(chat)?;
        self.bot
            .send_message(target, text)
            .parse_mode(ParseMode::MarkdownV2)
            .await
            .with_context(|| format!("failed to send Telegram message to {chat}"))?;
        Ok(())
    }
}

/// A destination chat is either a numeric chat id or an `@channelname`.
pub fn parse_chat_target(chat: &str) -> Result<Recipient> {
    if chat.starts_with('@') {
        return Ok(Recipient::ChannelUsername(chat.to_string()));
    }
    chat.parse::<i64>()
        .map(|id| Recipient::Id(ChatId(id)))
        .map_err(|_| anyhow!("invalid chat target '{}': expected a chat id or @channelname", chat))
}

pub fn tweet_url(username: &str, tweet_id: &str) -> String {
    format!("https://twitter.com/{username}/status/{tweet_id}")
}

/// `2024-01-15 13:45 UTC` for a well-formed RFC 3339 stamp, the raw string
/// when it does not parse, `Unknown time` when absent.
pub fn render_timestamp(created_at: Option<&str>) -> String {
    match created_at {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => ts
                .with_timezone(&Utc)
                .format("%Y-%m-%d %H:%M UTC")
                .to_string(),
            Err(_) => raw.to_string(),
        },
        None => "Unknown time".to_string(),
    }
}

/// Render the outbound notification. Handle, tweet text, and timestamp are
/// escaped for MarkdownV2; the permalink URL is left as-is.
pub fn format_tweet_message(username: &str, tweet: &Tweet) -> String {
    format!(
        "🐦 {}\n\n{}\n\n📅 {}\n🔗 {}",
        markdown::bold(&markdown::escape(&format!("New tweet from @{username}"))),
        markdown::escape(&tweet.text),
        markdown::escape(&render_timestamp(tweet.created_at.as_deref())),
        markdown::link(&tweet_url(username, &tweet.id), "View on Twitter"),
    )
}
