use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use tg_birdwatch::config;
use tg_birdwatch::handlers::{self, BotContext};
use tg_birdwatch::monitor::Monitor;
use tg_birdwatch::store::{AccountStore, SharedStore};
use tg_birdwatch::telegram::{Notifier, TelegramNotifier};
use tg_birdwatch::twitter::{TweetSource, TwitterClient};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to JSON credentials file
    #[arg(long, default_value = "credentials.json")]
    credentials: PathBuf,
    /// Path to JSON watch-list file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let creds = config::load(Some(&args.credentials))?;

    let store: SharedStore = Arc::new(Mutex::new(AccountStore::load(&args.config)));
    let bot = Bot::new(creds.telegram_bot_token.clone());

    let twitter: Option<Arc<dyn TweetSource>> = creds
        .twitter_bearer_token
        .clone()
        .map(|token| Arc::new(TwitterClient::new(token)) as Arc<dyn TweetSource>);
    if twitter.is_none() {
        warn!("no Twitter bearer token; /add lookups and monitoring are disabled");
    }
    if creds.telegram_chat_id.is_none() {
        warn!("no Telegram chat id; tweet forwarding is disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (monitoring, monitor_task) = match (twitter.clone(), creds.telegram_chat_id.clone()) {
        (Some(source), Some(chat)) => {
            let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));
            let monitor = Monitor::new(Arc::clone(&store), source, notifier, chat);
            let monitoring = monitor.running_handle();
            let task = tokio::spawn(monitor.run(shutdown_rx));
            (monitoring, Some(task))
        }
        _ => (Arc::new(AtomicBool::new(false)), None),
    };

    let ctx = BotContext {
        store: Arc::clone(&store),
        twitter,
        forward_chat: creds.telegram_chat_id.clone(),
        monitoring,
    };

    info!("starting telegram bot");
    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let ctx = ctx.clone();
        async move {
            if let Err(err) = handlers::handle_update(&bot, &ctx, &msg).await {
                error!(?err, "failed to handle update");
            }
            respond(())
        }
    })
    .await;

    // The repl returns after ctrl-c; stop the monitor and persist.
    let _ = shutdown_tx.send(true);
    if let Some(task) = monitor_task {
        if let Err(err) = task.await {
            error!(?err, "monitor task failed");
        }
    }
    if let Err(err) = store.lock().await.flush().await {
        error!(?err, "failed to flush watch list at shutdown");
    }
    Ok(())
}
