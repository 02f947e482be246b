//! Durable watch list: which accounts are monitored and how far delivery has
//! progressed for each of them.
//!
//! The store is a plain JSON file (`monitored_accounts` + `check_interval`)
//! loaded once at startup and rewritten by `flush`. In-memory state is the
//! source of truth between flushes; a failed write keeps the dirty flag set
//! so the next flush retries. The store itself is single-threaded; callers
//! share it through [`SharedStore`] and serialize access with the mutex.
use crate::model::MonitoredAccount;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

pub type SharedStore = Arc<Mutex<AccountStore>>;

/// On-disk shape of the watch list. Missing fields take defaults so a partial
/// or hand-edited file still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WatchFile {
    #[serde(default)]
    monitored_accounts: Vec<MonitoredAccount>,
    #[serde(default = "default_check_interval")]
    check_interval: u64,
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

impl Default for WatchFile {
    fn default() -> Self {
        Self {
            monitored_accounts: Vec::new(),
            check_interval: DEFAULT_CHECK_INTERVAL_SECS,
        }
    }
}

#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    accounts: Vec<MonitoredAccount>,
    check_interval_secs: u64,
    dirty: bool,
}

impl AccountStore {
    /// Load the watch list from `path`. A missing or malformed file is not
    /// fatal: the store starts empty with the default interval.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<WatchFile>(&content) {
                Ok(file) => file,
                Err(err) => {
                    error!(?err, path = %path.display(), "malformed watch list; starting with defaults");
                    WatchFile::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no watch list found; starting with defaults");
                WatchFile::default()
            }
            Err(err) => {
                error!(?err, path = %path.display(), "failed to read watch list; starting with defaults");
                WatchFile::default()
            }
        };
        Self {
            path,
            accounts: file.monitored_accounts,
            check_interval_secs: file.check_interval,
            dirty: false,
        }
    }

    /// Add an account. Returns false without touching the list when the
    /// username is already present (case-insensitive).
    pub fn add(&mut self, username: &str, user_id: &str) -> bool {
        if self
            .accounts
            .iter()
            .any(|acc| acc.username.eq_ignore_ascii_case(username))
        {
            return false;
        }
        self.accounts.push(MonitoredAccount::new(username, user_id));
        self.dirty = true;
        true
    }

    /// Remove an account by username (case-insensitive). Returns false when
    /// it was not on the list.
    pub fn remove(&mut self, username: &str) -> bool {
        let before = self.accounts.len();
        self.accounts
            .retain(|acc| !acc.username.eq_ignore_ascii_case(username));
        let removed = self.accounts.len() < before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Read-only view in insertion order.
    pub fn accounts(&self) -> &[MonitoredAccount] {
        &self.accounts
    }

    /// Cloned snapshot for a poll round.
    pub fn snapshot(&self) -> Vec<MonitoredAccount> {
        self.accounts.clone()
    }

    /// Record that `tweet_id` has been delivered for `username`. Unknown
    /// usernames (e.g. removed mid-round) are logged and ignored.
    pub fn advance_watermark(&mut self, username: &str, tweet_id: &str) {
        match self
            .accounts
            .iter_mut()
            .find(|acc| acc.username.eq_ignore_ascii_case(username))
        {
            Some(acc) => {
                acc.last_tweet_id = Some(tweet_id.to_string());
                self.dirty = true;
            }
            None => {
                warn!(username, tweet_id, "watermark advance for unknown account");
            }
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the watch list back to disk. A clean store is a no-op, which is
    /// what keeps repeated flushes byte-identical. On failure the dirty flag
    /// stays set and in-memory state is untouched.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let file = WatchFile {
            monitored_accounts: self.accounts.clone(),
            check_interval: self.check_interval_secs,
        };
        let body =
            serde_json::to_string_pretty(&file).context("failed to serialize watch list")?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("failed to write watch list to {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }
}
