//! Telegram-style retry runner
//!
//! Telegram-style APIs report throttling as an error response whose
//! `parameters.retry_after` holds the mandated wait in seconds. Depending on
//! the client library version that value sits at the top of the error body,
//! under `response`, or under `error`; one [`RetryAfterExtractor`] per shape
//! is tried in order.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

use crate::config::{resolve_retry_config, TELEGRAM_RETRY_DEFAULTS};
use crate::error::ApiError;
use crate::runner::{ChannelRetryOptions, RetryRunner};

pub const CHANNEL: &str = "telegram";

/// Transient wording retried by Telegram runners, independent of the network
/// classifier's phrase list
static TELEGRAM_RETRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)429|timeout|connect|reset|closed|unavailable|temporarily")
        .expect("static regex is valid")
});

/// `parameters` object of a Telegram-style error response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WithParameters {
    parameters: ResponseParameters,
}

#[derive(Debug, Deserialize)]
struct WithResponse {
    response: WithParameters,
}

#[derive(Debug, Deserialize)]
struct WithError {
    error: WithParameters,
}

/// One known place a `retry_after` value can hide in an error body
pub trait RetryAfterExtractor: Send + Sync {
    /// The raw `retry_after` value, if this shape carries one
    fn try_extract_retry_after(&self, body: &Value) -> Option<Value>;
}

/// `{ "parameters": { "retry_after": 5 } }`
pub struct DirectParameters;

/// `{ "response": { "parameters": { "retry_after": 5 } } }`
pub struct ResponseParametersShape;

/// `{ "error": { "parameters": { "retry_after": 5 } } }`
pub struct ErrorParametersShape;

impl RetryAfterExtractor for DirectParameters {
    fn try_extract_retry_after(&self, body: &Value) -> Option<Value> {
        WithParameters::deserialize(body).ok()?.parameters.retry_after
    }
}

impl RetryAfterExtractor for ResponseParametersShape {
    fn try_extract_retry_after(&self, body: &Value) -> Option<Value> {
        WithResponse::deserialize(body)
            .ok()?
            .response
            .parameters
            .retry_after
    }
}

impl RetryAfterExtractor for ErrorParametersShape {
    fn try_extract_retry_after(&self, body: &Value) -> Option<Value> {
        WithError::deserialize(body).ok()?.error.parameters.retry_after
    }
}

/// Extractors in the order they are tried
pub static RETRY_AFTER_EXTRACTORS: &[&dyn RetryAfterExtractor] = &[
    &DirectParameters,
    &ResponseParametersShape,
    &ErrorParametersShape,
];

/// Mandated wait of a Telegram-style error, in milliseconds
///
/// The first shape carrying a `retry_after` decides. Returns `None` when that
/// value is not a finite number, or no shape carries one, in which case the
/// runner falls back to computed backoff.
///
/// # Examples
///
/// ```
/// use botguard::error::ApiError;
/// use botguard::telegram::telegram_retry_after_ms;
/// use serde_json::json;
///
/// let err = ApiError::new("429: Too Many Requests: retry after 3")
///     .with_body(json!({ "response": { "parameters": { "retry_after": 3 } } }));
/// assert_eq!(telegram_retry_after_ms(&err), Some(3_000.0));
/// ```
pub fn telegram_retry_after_ms(err: &ApiError) -> Option<f64> {
    let body = err.body()?;
    RETRY_AFTER_EXTRACTORS
        .iter()
        .find_map(|extractor| extractor.try_extract_retry_after(body))?
        .as_f64()
        .filter(|secs| secs.is_finite())
        .map(|secs| secs * 1000.0)
}

/// True when the error message uses clearly transient wording
pub fn is_telegram_retryable_message(err: &ApiError) -> bool {
    TELEGRAM_RETRY_RE.is_match(&err.to_string())
}

/// Builds the Telegram runner from defaults, channel config and call-site
/// overrides
///
/// Errors are retried when their message matches the transient pattern or
/// when `options.should_retry` accepts them.
pub fn create_telegram_retry_runner(options: ChannelRetryOptions) -> RetryRunner<ApiError> {
    let config = resolve_retry_config(
        TELEGRAM_RETRY_DEFAULTS,
        &[options.config_retry.as_ref(), options.retry.as_ref()],
    );

    let extra = options.should_retry.clone();
    let should_retry = move |err: &ApiError| {
        is_telegram_retryable_message(err) || extra.as_ref().map(|f| f(err)).unwrap_or(false)
    };

    RetryRunner::new(
        CHANNEL,
        config,
        Arc::new(should_retry),
        Arc::new(telegram_retry_after_ms),
        options.verbose,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_body(body: Value) -> ApiError {
        ApiError::new("Too Many Requests").with_body(body)
    }

    #[test]
    fn reads_all_three_shapes() {
        let direct = with_body(json!({ "parameters": { "retry_after": 1 } }));
        let response = with_body(json!({ "response": { "parameters": { "retry_after": 2 } } }));
        let error = with_body(json!({ "error": { "parameters": { "retry_after": 3.5 } } }));

        assert_eq!(telegram_retry_after_ms(&direct), Some(1_000.0));
        assert_eq!(telegram_retry_after_ms(&response), Some(2_000.0));
        assert_eq!(telegram_retry_after_ms(&error), Some(3_500.0));
    }

    #[test]
    fn direct_shape_wins() {
        let err = with_body(json!({
            "parameters": { "retry_after": 1 },
            "response": { "parameters": { "retry_after": 9 } }
        }));
        assert_eq!(telegram_retry_after_ms(&err), Some(1_000.0));
    }

    #[test]
    fn non_numeric_retry_after_is_ignored() {
        let err = with_body(json!({ "parameters": { "retry_after": "soon" } }));
        assert_eq!(telegram_retry_after_ms(&err), None);
    }

    #[test]
    fn first_present_value_decides() {
        let err = with_body(json!({
            "parameters": { "retry_after": "soon" },
            "response": { "parameters": { "retry_after": 9 } }
        }));
        assert_eq!(telegram_retry_after_ms(&err), None);
    }

    #[test]
    fn shapes_without_the_key_are_skipped() {
        let err = with_body(json!({
            "parameters": { "migrate_to_chat_id": -100 },
            "error": { "parameters": { "retry_after": 2 } }
        }));
        assert_eq!(telegram_retry_after_ms(&err), Some(2_000.0));
    }

    #[test]
    fn missing_body_is_ignored() {
        assert_eq!(telegram_retry_after_ms(&ApiError::new("429")), None);
    }

    #[test]
    fn message_pattern_is_case_insensitive() {
        assert!(is_telegram_retryable_message(&ApiError::new("Service Unavailable")));
        assert!(is_telegram_retryable_message(&ApiError::new("ETIMEDOUT: Timeout while connecting")));
        assert!(!is_telegram_retryable_message(&ApiError::new("Bad Request: chat not found")));
    }
}
