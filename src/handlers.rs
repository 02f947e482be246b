//! Telegram command handlers for the operator chat.
//!
//! `/add` and `/remove` are the only paths that mutate the watch list from
//! outside the monitor. Replies are best effort; a dropped reply never fails
//! the update.
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{info, instrument, warn};

use crate::store::SharedStore;
use crate::twitter::TweetSource;

static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,15}$").expect("valid handle regex"));

const START_TEXT: &str = "Twitter monitor bot.\n\n\
    Commands:\n\
    /add <username> - start monitoring an account\n\
    /remove <username> - stop monitoring an account\n\
    /list - show monitored accounts\n\
    /status - show monitor status";

/// Shared state threaded through every update.
#[derive(Clone)]
pub struct BotContext {
    pub store: SharedStore,
    pub twitter: Option<Arc<dyn TweetSource>>,
    pub forward_chat: Option<String>,
    pub monitoring: Arc<AtomicBool>,
}

#[instrument(skip_all)]
pub async fn handle_update(bot: &Bot, ctx: &BotContext, msg: &Message) -> Result<()> {
    let text = match msg.text() {
        Some(text) => text.trim(),
        None => return Ok(()),
    };
    if !text.starts_with('/') {
        return Ok(());
    }

    let (command, arg) = parse_command(text);
    match command.as_str() {
        "/start" => {
            let _ = bot.send_message(msg.chat.id, START_TEXT).await;
        }
        "/add" => handle_add(bot, ctx, msg, arg).await?,
        "/remove" => handle_remove(bot, ctx, msg, arg).await?,
        "/list" => handle_list(bot, ctx, msg).await,
        "/status" => handle_status(bot, ctx, msg).await,
        _ => {
            let _ = bot.send_message(msg.chat.id, "Unknown command.").await;
        }
    }
    Ok(())
}

/// Split a command message into the command itself (lowercased, `@botname`
/// suffix stripped) and the first argument, if any.
fn parse_command(text: &str) -> (String, Option<&str>) {
    let mut parts = text.split_whitespace();
    let raw = parts.next().unwrap_or_default();
    let command = raw.split('@').next().unwrap_or(raw).to_ascii_lowercase();
    (command, parts.next())
}

/// Strip a leading `@` and validate the remaining Twitter handle.
fn normalize_handle(raw: &str) -> Option<&str> {
    let handle = raw.strip_prefix('@').unwrap_or(raw);
    HANDLE_RE.is_match(handle).then_some(handle)
}

async fn handle_add(bot: &Bot, ctx: &BotContext, msg: &Message, arg: Option<&str>) -> Result<()> {
    let handle = match arg.and_then(normalize_handle) {
        Some(handle) => handle,
        None => {
            let _ = bot.send_message(msg.chat.id, "Usage: /add <username>").await;
            return Ok(());
        }
    };
    let twitter = match &ctx.twitter {
        Some(twitter) => twitter,
        None => {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    "Twitter access is not configured; cannot look up accounts.",
                )
                .await;
            return Ok(());
        }
    };

    let already = ctx
        .store
        .lock()
        .await
        .accounts()
        .iter()
        .any(|acc| acc.username.eq_ignore_ascii_case(handle));
    if already {
        let _ = bot
            .send_message(msg.chat.id, format!("@{handle} is already monitored."))
            .await;
        return Ok(());
    }

    let user_id = match twitter.resolve_username(handle).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            let _ = bot
                .send_message(msg.chat.id, format!("Could not find Twitter user @{handle}."))
                .await;
            return Ok(());
        }
        Err(err) => {
            warn!(?err, handle, "username lookup failed");
            let _ = bot
                .send_message(
                    msg.chat.id,
                    format!("Lookup for @{handle} failed; try again later."),
                )
                .await;
            return Ok(());
        }
    };

    let mut store = ctx.store.lock().await;
    if !store.add(handle, &user_id) {
        drop(store);
        let _ = bot
            .send_message(msg.chat.id, format!("@{handle} is already monitored."))
            .await;
        return Ok(());
    }
    if let Err(err) = store.flush().await {
        warn!(?err, "failed to persist watch list");
    }
    drop(store);

    info!(handle, user_id = %user_id, "account added");
    let _ = bot
        .send_message(msg.chat.id, format!("Now monitoring @{handle}."))
        .await;
    Ok(())
}

async fn handle_remove(
    bot: &Bot,
    ctx: &BotContext,
    msg: &Message,
    arg: Option<&str>,
) -> Result<()> {
    let handle = match arg.and_then(normalize_handle) {
        Some(handle) => handle,
        None => {
            let _ = bot
                .send_message(msg.chat.id, "Usage: /remove <username>")
                .await;
            return Ok(());
        }
    };

    let mut store = ctx.store.lock().await;
    if !store.remove(handle) {
        drop(store);
        let _ = bot
            .send_message(msg.chat.id, format!("@{handle} is not monitored."))
            .await;
        return Ok(());
    }
    if let Err(err) = store.flush().await {
        warn!(?err, "failed to persist watch list");
    }
    drop(store);

    info!(handle, "account removed");
    let _ = bot
        .send_message(msg.chat.id, format!("Stopped monitoring @{handle}."))
        .await;
    Ok(())
}

async fn handle_list(bot: &Bot, ctx: &BotContext, msg: &Message) {
    let reply = {
        let store = ctx.store.lock().await;
        let accounts = store.accounts();
        if accounts.is_empty() {
            "No accounts are monitored. Add one with /add <username>.".to_string()
        } else {
            let mut lines = vec![format!("Monitoring {} account(s):", accounts.len())];
            for acc in accounts {
                lines.push(format!("• @{}", acc.username));
            }
            lines.join("\n")
        }
    };
    let _ = bot.send_message(msg.chat.id, reply).await;
}

async fn handle_status(bot: &Bot, ctx: &BotContext, msg: &Message) {
    let (count, interval) = {
        let store = ctx.store.lock().await;
        (store.accounts().len(), store.check_interval())
    };
    let monitoring = if ctx.monitoring.load(Ordering::SeqCst) {
        "running"
    } else {
        "stopped"
    };
    let forward = ctx.forward_chat.as_deref().unwrap_or("not configured");
    let reply = format!(
        "Monitoring: {monitoring}\nAccounts: {count}\nCheck interval: {}s\nForwarding to: {forward}",
        interval.as_secs()
    );
    let _ = bot.send_message(msg.chat.id, reply).await;
}
