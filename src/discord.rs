//! Discord-style retry runner
//!
//! The Discord-style REST API tells clients exactly how long to back off when
//! they hit a rate limit. This runner retries only those rate limit errors,
//! waiting the mandated `retry_after` seconds; every other failure is
//! returned on first occurrence.

use std::sync::Arc;

use crate::config::{resolve_retry_config, DISCORD_RETRY_DEFAULTS};
use crate::error::ApiError;
use crate::runner::{ChannelRetryOptions, RetryRunner};

pub const CHANNEL: &str = "discord";

/// Mandated wait of a rate limit error, in milliseconds
pub fn discord_retry_after_ms(err: &ApiError) -> Option<f64> {
    if !err.is_rate_limit() {
        return None;
    }
    err.retry_after_secs().map(|secs| secs * 1000.0)
}

/// Builds the Discord runner from defaults, channel config and call-site
/// overrides
///
/// `options.should_retry` is ignored: non rate limit errors always fail fast.
pub fn create_discord_retry_runner(options: ChannelRetryOptions) -> RetryRunner<ApiError> {
    let config = resolve_retry_config(
        DISCORD_RETRY_DEFAULTS,
        &[options.config_retry.as_ref(), options.retry.as_ref()],
    );

    RetryRunner::new(
        CHANNEL,
        config,
        Arc::new(ApiError::is_rate_limit),
        Arc::new(discord_retry_after_ms),
        options.verbose,
    )
}
