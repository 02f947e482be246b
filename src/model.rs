use serde::{Deserialize, Serialize};

/// A Twitter account on the watch list.
///
/// `username` is the case-insensitive key used by the operator commands;
/// `user_id` is the stable numeric id assigned once at `/add` time and never
/// re-resolved. `last_tweet_id` is the delivery watermark: the id of the most
/// recent tweet already forwarded, used as the exclusive lower bound
/// (`since_id`) for the next fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitoredAccount {
    pub username: String,
    pub user_id: String,
    #[serde(default)]
    pub last_tweet_id: Option<String>,
}

impl MonitoredAccount {
    pub fn new(username: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            user_id: user_id.into(),
            last_tweet_id: None,
        }
    }
}

/// A single tweet as returned by the timeline endpoint. Transient: once
/// forwarded, only its `id` survives as the account watermark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    /// RFC 3339 timestamp as sent on the wire; kept as a string so a
    /// malformed value degrades at render time instead of failing the fetch.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Tweet {
    /// Numeric view of the snowflake id, used for chronological ordering.
    /// Non-numeric ids sort first.
    pub fn numeric_id(&self) -> u64 {
        self.id.parse().unwrap_or(0)
    }
}
