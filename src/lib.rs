//! Twitter account monitor that forwards new tweets to a Telegram chat.
//!
//! The watch list lives in a JSON file next to the process; a scheduler
//! polls each listed account on an interval and delivers anything newer
//! than the account's watermark. Operators manage the list over Telegram
//! commands.
pub mod config;
pub mod handlers;
pub mod model;
pub mod monitor;
pub mod store;
pub mod telegram;
pub mod twitter;
