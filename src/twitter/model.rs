//! Wire types for the Twitter v2 responses we consume.
use crate::model::Tweet;
use serde::Deserialize;

/// `GET /2/users/by/username/{username}` body.
#[derive(Debug, Clone, Deserialize)]
pub struct UserLookupResp {
    #[serde(default)]
    pub data: Option<UserData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserData {
    pub id: String,
    pub username: String,
}

/// `GET /2/users/{id}/tweets` body. `data` is absent when the window holds
/// no tweets.
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineResp {
    #[serde(default)]
    pub data: Option<Vec<Tweet>>,
}
