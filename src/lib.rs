// botguard: resilience layer for Discord- and Telegram-style Bot API calls
// Exposes the retry engine, backoff, error classification and channel runners

pub mod api_logging;
pub mod backoff;
pub mod classify;
pub mod cli;
pub mod client;
pub mod config;
pub mod discord;
pub mod error;
pub mod retry;
pub mod runner;
pub mod telegram;
