//! Monitoring scheduler and delivery pipeline.
//!
//! `Monitor::run` drives rounds on a fixed interval until the shutdown
//! channel fires. Each round snapshots the watch list, checks every account
//! concurrently, waits for all of them, then flushes the store once. Rounds
//! never overlap.
//!
//! Per account, `check_account` fetches tweets past the watermark, delivers
//! them oldest first and advances the watermark after each confirmed send.
//! A failure inside one account's check is logged at the round boundary and
//! leaves every other account untouched.
use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::model::{MonitoredAccount, Tweet};
use crate::store::SharedStore;
use crate::telegram::{self, Notifier};
use crate::twitter::TweetSource;

/// Pause between consecutive deliveries of one account's tweets.
pub const DELIVERY_PACING: Duration = Duration::from_secs(1);
/// Pause before the next round when a round itself fails (e.g. flush error).
pub const ROUND_ERROR_COOLDOWN: Duration = Duration::from_secs(10);

pub struct Monitor {
    store: SharedStore,
    source: Arc<dyn TweetSource>,
    notifier: Arc<dyn Notifier>,
    chat: String,
    running: Arc<AtomicBool>,
    pacing: Duration,
}

impl Monitor {
    pub fn new(
        store: SharedStore,
        source: Arc<dyn TweetSource>,
        notifier: Arc<dyn Notifier>,
        chat: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            chat: chat.into(),
            running: Arc::new(AtomicBool::new(false)),
            pacing: DELIVERY_PACING,
        }
    }

    /// Shared flag that is true exactly while [`run`](Self::run) is looping.
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Override the inter-delivery pause. Used by tests.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Loop rounds until `shutdown` flips to true or its sender is dropped.
    /// The round in flight always completes; shutdown is only observed
    /// between rounds and during the interval sleep.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        self.running.store(true, Ordering::SeqCst);
        info!("monitor started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let pause = match self.run_round().await {
                Ok(()) => self.store.lock().await.check_interval(),
                Err(err) => {
                    error!(?err, "monitor round failed");
                    ROUND_ERROR_COOLDOWN
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("monitor stopped");
    }

    /// One pass over every monitored account, then a single flush. Returns
    /// `Err` only for the flush; per-account failures are logged here and do
    /// not cross account boundaries.
    pub async fn run_round(&self) -> Result<()> {
        let accounts = self.store.lock().await.snapshot();
        if accounts.is_empty() {
            debug!("no accounts monitored");
        } else {
            let results = join_all(accounts.iter().map(|acc| self.check_account(acc))).await;
            for (account, result) in accounts.iter().zip(results) {
                if let Err(err) = result {
                    warn!(?err, username = %account.username, "account check failed");
                }
            }
        }
        self.store.lock().await.flush().await
    }

    #[instrument(skip_all, fields(username = %account.username))]
    async fn check_account(&self, account: &MonitoredAccount) -> Result<()> {
        let mut tweets = self
            .source
            .tweets_since(&account.user_id, account.last_tweet_id.as_deref())
            .await
            .context("failed to fetch tweets")?;
        if tweets.is_empty() {
            return Ok(());
        }
        // Deliver oldest first so the watermark never skips an undelivered
        // tweet; API page order is newest first.
        tweets.sort_by_key(Tweet::numeric_id);
        info!(count = tweets.len(), "new tweets found");
        for tweet in &tweets {
            let text = telegram::format_tweet_message(&account.username, tweet);
            self.notifier
                .deliver(&self.chat, &text)
                .await
                .with_context(|| format!("failed to deliver tweet {}", tweet.id))?;
            self.store
                .lock()
                .await
                .advance_watermark(&account.username, &tweet.id);
            info!(tweet_id = %tweet.id, "tweet delivered");
            tokio::time::sleep(self.pacing).await;
        }
        Ok(())
    }
}
