//! Credential loader for the Twitter→Telegram bot.
//!
//! Credentials come from `credentials.json` when the file exists, otherwise
//! from the process environment. The file wins wholesale; the two sources are
//! never merged. Only the Telegram bot token is required. The Twitter bearer
//! token and the forward chat id are optional and their absence degrades the
//! bot (no account resolution / no forwarding) instead of failing startup.
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Credential set mirroring the `credentials.json` schema. The key names are
/// shared with the environment variables of the same spelling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Credentials {
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub twitter_bearer_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
}

/// Load credentials and validate them.
/// - If `path` is None, uses `credentials.json` in the current working
///   directory.
/// - A missing file falls back to the environment; an unreadable or malformed
///   file is an error (it holds the required token).
pub fn load(path: Option<&Path>) -> Result<Credentials, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("credentials.json"));
    let creds = if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_json::from_str::<Credentials>(&content)?
    } else {
        from_env()
    };
    let creds = normalize(creds);
    validate(&creds)?;
    Ok(creds)
}

fn from_env() -> Credentials {
    Credentials {
        telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
        twitter_bearer_token: env::var("TWITTER_BEARER_TOKEN").ok(),
        telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
    }
}

/// Treat blank optional values the same as absent ones.
fn normalize(mut creds: Credentials) -> Credentials {
    creds.twitter_bearer_token = creds
        .twitter_bearer_token
        .filter(|t| !t.trim().is_empty());
    creds.telegram_chat_id = creds.telegram_chat_id.filter(|c| !c.trim().is_empty());
    creds
}

fn validate(creds: &Credentials) -> Result<(), ConfigError> {
    if creds.telegram_bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("TELEGRAM_BOT_TOKEN must be set"));
    }
    Ok(())
}

/// Returns an example credentials file.
pub fn example() -> &'static str {
    r#"{
  "TELEGRAM_BOT_TOKEN": "123456789:AAExampleTelegramBotToken",
  "TWITTER_BEARER_TOKEN": "AAAAAAAAAAAAAAAAAAAAAExampleBearerToken",
  "TELEGRAM_CHAT_ID": "-1001234567890"
}
"#
}
