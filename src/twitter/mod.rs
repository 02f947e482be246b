//! Twitter API v2 client.
//!
//! The rest of the bot only sees the [`TweetSource`] trait; `TwitterClient`
//! is the one real implementation. Rate limiting is handled inside the
//! client: a 429 on the timeline endpoint sleeps the cooldown and reports
//! an empty page, so callers never see it as an error.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::model::Tweet;
use crate::twitter::model::{TimelineResp, UserLookupResp};

pub mod model;

const TWITTER_API_BASE: &str = "https://api.twitter.com/2/";
/// Back-off applied when the timeline endpoint answers 429.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Page size per poll. One page per round; older history is not backfilled.
const TIMELINE_PAGE_SIZE: &str = "10";

#[derive(Clone)]
pub struct TwitterClient {
    http: Client,
    base_url: Url,
    bearer_token: String,
    cooldown: Duration,
}

impl fmt::Debug for TwitterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Read side of the delivery pipeline.
#[async_trait]
pub trait TweetSource: Send + Sync {
    /// Map a handle to its stable numeric user id. `Ok(None)` means the
    /// handle does not exist.
    async fn resolve_username(&self, username: &str) -> Result<Option<String>>;

    /// Tweets for `user_id` strictly newer than `since_id`, at most one page,
    /// in whatever order the API returns them.
    async fn tweets_since(&self, user_id: &str, since_id: Option<&str>) -> Result<Vec<Tweet>>;
}

impl TwitterClient {
    pub fn new(bearer_token: String) -> Self {
        let base_url = Url::parse(TWITTER_API_BASE).expect("valid default Twitter URL");
        Self::with_base_url(bearer_token, base_url)
    }

    pub fn with_base_url(bearer_token: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("tg-birdwatch/0.1")
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            bearer_token,
            cooldown: RATE_LIMIT_COOLDOWN,
        }
    }

    /// Override the 429 back-off. Used by tests.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn lookup_request(&self, username: &str) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("users/by/username/{username}"))
            .context("invalid Twitter base URL")?;
        self.http
            .get(endpoint)
            .header("Authorization", format!("Bearer {}", self.bearer_token))
            .build()
            .context("failed to build user lookup request")
    }

    pub fn timeline_request(&self, user_id: &str, since_id: Option<&str>) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("users/{user_id}/tweets"))
            .context("invalid Twitter base URL")?;
        let mut query: Vec<(&str, &str)> = vec![
            ("max_results", TIMELINE_PAGE_SIZE),
            ("tweet.fields", "id,text,created_at"),
            ("exclude", "retweets,replies"),
        ];
        if let Some(since) = since_id {
            query.push(("since_id", since));
        }
        self.http
            .get(endpoint)
            .header("Authorization", format!("Bearer {}", self.bearer_token))
            .query(&query)
            .build()
            .context("failed to build timeline request")
    }
}

#[async_trait]
impl TweetSource for TwitterClient {
    async fn resolve_username(&self, username: &str) -> Result<Option<String>> {
        let request = self.lookup_request(username)?;
        debug!(url = %request.url(), "resolving username");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Twitter")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("twitter user lookup error {}: {}", status, body));
        }
        let payload = res
            .json::<UserLookupResp>()
            .await
            .context("invalid user lookup response JSON")?;
        Ok(payload.data.map(|user| user.id))
    }

    async fn tweets_since(&self, user_id: &str, since_id: Option<&str>) -> Result<Vec<Tweet>> {
        let request = self.timeline_request(user_id, since_id)?;
        debug!(url = %request.url(), "fetching timeline");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Twitter")?;
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(
                user_id,
                cooldown_secs = self.cooldown.as_secs(),
                "rate limited by Twitter; backing off"
            );
            tokio::time::sleep(self.cooldown).await;
            return Ok(Vec::new());
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("twitter timeline error {}: {}", status, body));
        }
        let payload = res
            .json::<TimelineResp>()
            .await
            .context("invalid timeline response JSON")?;
        Ok(payload.data.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TwitterClient {
        TwitterClient::new("token".into())
    }

    #[test]
    fn lookup_request_targets_username_endpoint() {
        let request = client().lookup_request("alice").unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/2/users/by/username/alice");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
    }

    #[test]
    fn timeline_request_includes_watermark() {
        let request = client().timeline_request("123", Some("42")).unwrap();
        assert_eq!(request.url().path(), "/2/users/123/tweets");
        assert_eq!(
            request.url().query().unwrap(),
            "max_results=10&tweet.fields=id%2Ctext%2Ccreated_at&exclude=retweets%2Creplies&since_id=42"
        );
    }

    #[test]
    fn timeline_request_omits_absent_watermark() {
        let request = client().timeline_request("123", None).unwrap();
        let query = request.url().query().unwrap();
        assert!(!query.contains("since_id"));
        assert!(query.contains("max_results=10"));
    }

    #[test]
    fn timeline_response_parses_tweets() {
        let payload: TimelineResp = serde_json::from_str(
            r#"{"data": [{"id": "5", "text": "hi", "created_at": "2024-01-01T00:00:00.000Z"}]}"#,
        )
        .unwrap();
        let tweets = payload.data.unwrap();
        assert_eq!(tweets.len(), 1);
        assert_eq!(tweets[0].id, "5");
        assert_eq!(tweets[0].numeric_id(), 5);
    }

    #[test]
    fn empty_timeline_response_has_no_data() {
        let payload: TimelineResp =
            serde_json::from_str(r#"{"meta": {"result_count": 0}}"#).unwrap();
        assert!(payload.data.is_none());
    }

    #[test]
    fn user_lookup_response_without_data_is_none() {
        let payload: UserLookupResp = serde_json::from_str(r#"{"errors": [{}]}"#).unwrap();
        assert!(payload.data.is_none());
    }
}
