use anyhow::{anyhow, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tg_birdwatch::model::Tweet;
use tg_birdwatch::monitor::Monitor;
use tg_birdwatch::store::{AccountStore, SharedStore};
use tg_birdwatch::telegram::Notifier;
use tg_birdwatch::twitter::TweetSource;
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Clone, Default)]
struct ScriptedSource {
    timelines: Arc<Mutex<HashMap<String, VecDeque<Result<Vec<Tweet>>>>>>,
    fetches: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl ScriptedSource {
    async fn script(&self, user_id: &str, pages: Vec<Result<Vec<Tweet>>>) {
        self.timelines
            .lock()
            .await
            .insert(user_id.to_string(), VecDeque::from(pages));
    }

    async fn fetches(&self) -> Vec<(String, Option<String>)> {
        self.fetches.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl TweetSource for ScriptedSource {
    async fn resolve_username(&self, _username: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn tweets_since(&self, user_id: &str, since_id: Option<&str>) -> Result<Vec<Tweet>> {
        self.fetches
            .lock()
            .await
            .push((user_id.to_string(), since_id.map(str::to_string)));
        let mut timelines = self.timelines.lock().await;
        match timelines.get_mut(user_id).and_then(|pages| pages.pop_front()) {
            Some(page) => page,
            None => Ok(Vec::new()),
        }
    }
}

/// Sleeps its user id in milliseconds before answering with one tweet.
struct SlowSource;

#[async_trait::async_trait]
impl TweetSource for SlowSource {
    async fn resolve_username(&self, _username: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn tweets_since(&self, user_id: &str, _since_id: Option<&str>) -> Result<Vec<Tweet>> {
        let delay = user_id.parse::<u64>().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(vec![Tweet {
            id: user_id.to_string(),
            text: format!("from {user_id}"),
            created_at: None,
        }])
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    responses: Arc<Mutex<VecDeque<Result<()>>>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    fn with_responses(responses: Vec<Result<()>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, chat: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((chat.to_string(), text.to_string()));
        self.responses.lock().await.pop_front().unwrap_or(Ok(()))
    }
}

fn tweet(id: &str) -> Tweet {
    Tweet {
        id: id.into(),
        text: format!("tweet {id}"),
        created_at: None,
    }
}

fn store_with(
    dir: &tempfile::TempDir,
    accounts: &[(&str, &str, Option<&str>)],
) -> SharedStore {
    let mut store = AccountStore::load(dir.path().join("watchlist.json"));
    for (username, user_id, watermark) in accounts {
        store.add(username, user_id);
        if let Some(watermark) = watermark {
            store.advance_watermark(username, watermark);
        }
    }
    Arc::new(Mutex::new(store))
}

fn monitor(store: &SharedStore, source: &ScriptedSource, notifier: &RecordingNotifier) -> Monitor {
    Monitor::new(
        Arc::clone(store),
        Arc::new(source.clone()),
        Arc::new(notifier.clone()),
        "@chan",
    )
    .with_pacing(Duration::ZERO)
}

#[tokio::test]
async fn delivers_new_tweets_oldest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with(&dir, &[("alice", "100", Some("2"))]);
    let source = ScriptedSource::default();
    source
        .script("100", vec![Ok(vec![tweet("5"), tweet("3"), tweet("9")])])
        .await;
    let notifier = RecordingNotifier::default();

    monitor(&store, &source, &notifier).run_round().await.unwrap();

    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].0, "@chan");
    assert!(sent[0].1.contains("tweet 3"));
    assert!(sent[1].1.contains("tweet 5"));
    assert!(sent[2].1.contains("tweet 9"));

    assert_eq!(
        store.lock().await.accounts()[0].last_tweet_id.as_deref(),
        Some("9")
    );
    assert_eq!(
        source.fetches().await,
        vec![("100".to_string(), Some("2".to_string()))]
    );
}

#[tokio::test]
async fn failed_delivery_stops_batch_and_retries_next_round() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with(&dir, &[("alice", "100", Some("2"))]);
    let source = ScriptedSource::default();
    source
        .script(
            "100",
            vec![
                Ok(vec![tweet("3"), tweet("5"), tweet("9")]),
                Ok(vec![tweet("5"), tweet("9")]),
            ],
        )
        .await;
    let notifier = RecordingNotifier::with_responses(vec![Ok(()), Err(anyhow!("telegram down"))]);
    let monitor = monitor(&store, &source, &notifier);

    monitor.run_round().await.unwrap();
    assert_eq!(
        store.lock().await.accounts()[0].last_tweet_id.as_deref(),
        Some("3")
    );
    // 3 delivered, 5 attempted and failed, 9 never attempted
    assert_eq!(notifier.sent().await.len(), 2);

    monitor.run_round().await.unwrap();
    assert_eq!(
        store.lock().await.accounts()[0].last_tweet_id.as_deref(),
        Some("9")
    );
    assert_eq!(notifier.sent().await.len(), 4);

    let fetches = source.fetches().await;
    assert_eq!(fetches[1].1.as_deref(), Some("3"));
}

#[tokio::test]
async fn failing_accounts_leave_others_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with(
        &dir,
        &[
            ("alice", "100", None),
            ("bob", "200", None),
            ("carol", "300", None),
        ],
    );
    let source = ScriptedSource::default();
    source
        .script("100", vec![Err(anyhow!("twitter timeline error 500"))])
        .await;
    source.script("200", vec![Ok(vec![tweet("7")])]).await;
    // carol stays unscripted: the rate-limited case, an empty page
    let notifier = RecordingNotifier::default();

    monitor(&store, &source, &notifier).run_round().await.unwrap();

    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("@bob"));

    let store = store.lock().await;
    assert_eq!(store.accounts()[0].last_tweet_id, None);
    assert_eq!(store.accounts()[1].last_tweet_id.as_deref(), Some("7"));
    assert_eq!(store.accounts()[2].last_tweet_id, None);
}

#[tokio::test]
async fn round_waits_for_every_account() {
    for k in 1..=3usize {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = AccountStore::load(dir.path().join("watchlist.json"));
        for i in 0..k {
            // user id doubles as the fetch delay in milliseconds
            raw.add(&format!("user{i}"), &format!("{}", (i + 1) * 15));
        }
        let store: SharedStore = Arc::new(Mutex::new(raw));
        let notifier = RecordingNotifier::default();

        let monitor = Monitor::new(
            Arc::clone(&store),
            Arc::new(SlowSource),
            Arc::new(notifier.clone()),
            "@chan",
        )
        .with_pacing(Duration::ZERO);
        monitor.run_round().await.unwrap();

        assert_eq!(notifier.sent().await.len(), k, "k = {k}");
        let store = store.lock().await;
        for acc in store.accounts() {
            assert!(acc.last_tweet_id.is_some(), "k = {k}");
        }
    }
}

#[tokio::test]
async fn shutdown_during_sleep_stops_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watchlist.json");
    std::fs::write(
        &path,
        r#"{"monitored_accounts": [{"username": "alice", "user_id": "100"}], "check_interval": 3600}"#,
    )
    .unwrap();
    let store: SharedStore = Arc::new(Mutex::new(AccountStore::load(&path)));
    let source = ScriptedSource::default();
    source.script("100", vec![Ok(vec![tweet("1")])]).await;
    let notifier = RecordingNotifier::default();

    let monitor = monitor(&store, &source, &notifier);
    let running = monitor.running_handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(monitor.run(shutdown_rx));

    // Let the first round finish and the loop park in its interval sleep.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(running.load(Ordering::SeqCst));
    assert_eq!(source.fetches().await.len(), 1);

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(1), task)
        .await
        .expect("monitor did not stop")
        .unwrap();

    assert!(!running.load(Ordering::SeqCst));
    assert_eq!(source.fetches().await.len(), 1);
    assert_eq!(notifier.sent().await.len(), 1);
}
