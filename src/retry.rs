//! Retry operations with exponential backoff
//!
//! This module provides the attempt loop shared by every channel:
//!
//! - A bounded number of total attempts
//! - Exponential delay with jitter between attempts
//! - A pluggable predicate deciding which errors are worth retrying
//! - A retry-after override for errors that mandate their own wait
//! - An observation hook called once per retry
//! - Optional cancellation through a [`CancellationToken`]
//!
//! The loop never wraps or replaces the operation's error: once attempts are
//! exhausted or the predicate declines, the error that caused that decision
//! is returned as is.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backoff::compute_delay;
use crate::config::RetryConfig;

/// Decides whether an error should be retried
pub type ShouldRetry<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Extracts a mandated wait, in milliseconds, from an error
pub type RetryAfterMs<E> = Arc<dyn Fn(&E) -> Option<f64> + Send + Sync>;

/// Observes each retry before the loop waits
pub type OnRetry<E> = Arc<dyn Fn(&RetryAttemptInfo<'_, E>) + Send + Sync>;

/// Details of one upcoming retry, handed to the `on_retry` hook
#[derive(Debug)]
pub struct RetryAttemptInfo<'a, E> {
    /// 1-based number of the retry about to happen
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub label: Option<&'a str>,
    pub err: &'a E,
}

/// Error returned by [`retry_async_cancellable`]
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The token was cancelled before the next attempt could start
    #[error("retry cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// The operation failed and was not retried further
    #[error(transparent)]
    Operation(E),
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Returns the operation's error, if that is what stopped the loop
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RetryError::Operation(err) => Some(err),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Everything the attempt loop needs besides the operation itself
///
/// # Examples
///
/// ```
/// use botguard::config::RetryConfig;
/// use botguard::retry::RetryOptions;
///
/// let options: RetryOptions<std::io::Error> = RetryOptions::new(RetryConfig::default())
///     .should_retry(|err: &std::io::Error| err.kind() == std::io::ErrorKind::TimedOut)
///     .label("sendMessage");
/// assert_eq!(options.label_str(), Some("sendMessage"));
/// ```
pub struct RetryOptions<E> {
    pub config: RetryConfig,
    should_retry: Option<ShouldRetry<E>>,
    retry_after_ms: Option<RetryAfterMs<E>>,
    on_retry: Option<OnRetry<E>>,
    label: Option<String>,
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            should_retry: self.should_retry.clone(),
            retry_after_ms: self.retry_after_ms.clone(),
            on_retry: self.on_retry.clone(),
            label: self.label.clone(),
        }
    }
}

impl<E> RetryOptions<E> {
    /// Options that retry every error with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            should_retry: None,
            retry_after_ms: None,
            on_retry: None,
            label: None,
        }
    }

    pub fn should_retry(mut self, f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Some(Arc::new(f));
        self
    }

    pub fn retry_after_ms(mut self, f: impl Fn(&E) -> Option<f64> + Send + Sync + 'static) -> Self {
        self.retry_after_ms = Some(Arc::new(f));
        self
    }

    pub fn on_retry(mut self, f: impl Fn(&RetryAttemptInfo<'_, E>) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(f));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn with_hooks(
        mut self,
        should_retry: Option<ShouldRetry<E>>,
        retry_after_ms: Option<RetryAfterMs<E>>,
        on_retry: Option<OnRetry<E>>,
    ) -> Self {
        self.should_retry = should_retry;
        self.retry_after_ms = retry_after_ms;
        self.on_retry = on_retry;
        self
    }

    pub(crate) fn with_label(mut self, label: Option<&str>) -> Self {
        self.label = label.map(str::to_owned);
        self
    }

    pub fn label_str(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Decides what follows failed attempt number `attempt` (1-based)
    ///
    /// Returns the delay before the next attempt, or `None` when the error
    /// must be returned to the caller.
    fn next_delay(&self, config: &RetryConfig, attempt: u32, err: &E) -> Option<u64> {
        if attempt >= config.attempts {
            return None;
        }
        if let Some(should_retry) = &self.should_retry {
            if !should_retry(err) {
                return None;
            }
        }

        let mandated = self
            .retry_after_ms
            .as_ref()
            .and_then(|f| f(err))
            .filter(|ms| ms.is_finite());

        let delay = match mandated {
            Some(ms) => (ms.max(0.0).ceil() as u64).max(config.min_delay_ms),
            None => compute_delay(
                config.min_delay_ms,
                attempt - 1,
                config.max_delay_ms,
                config.jitter,
            ),
        };
        Some(delay)
    }

    fn notify(&self, config: &RetryConfig, attempt: u32, delay_ms: u64, err: &E) {
        if let Some(on_retry) = &self.on_retry {
            on_retry(&RetryAttemptInfo {
                attempt,
                max_attempts: config.attempts,
                delay_ms,
                label: self.label_str(),
                err,
            });
        }
    }
}

/// Runs `operation` until it succeeds, attempts run out, or the predicate
/// declines to retry
///
/// On failure the original error is returned unchanged.
///
/// # Examples
///
/// ```
/// use botguard::config::RetryConfig;
/// use botguard::retry::{retry_async, RetryOptions};
///
/// # async fn example() -> Result<(), std::io::Error> {
/// let options = RetryOptions::new(RetryConfig::default())
///     .should_retry(|err: &std::io::Error| err.kind() == std::io::ErrorKind::TimedOut);
///
/// let value = retry_async(|| async { Ok::<_, std::io::Error>(42) }, &options).await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_async<T, E, F, Fut>(mut operation: F, options: &RetryOptions<E>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let config = options.config.normalized();
    let mut attempt = 1u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(delay_ms) = options.next_delay(&config, attempt, &err) else {
            return Err(err);
        };

        options.notify(&config, attempt, delay_ms, &err);
        debug!(
            "Retry {}/{} for {} after {}ms delay",
            attempt,
            config.attempts,
            options.label_str().unwrap_or("operation"),
            delay_ms
        );

        sleep(Duration::from_millis(delay_ms)).await;
        attempt += 1;
    }
}

/// Like [`retry_async`], but stops as soon as `cancel` fires
///
/// Cancellation is checked before every attempt and raced against every
/// wait. A cancelled run never invokes the operation again and reports
/// [`RetryError::Cancelled`], which is distinct from the operation's error.
pub async fn retry_async_cancellable<T, E, F, Fut>(
    mut operation: F,
    options: &RetryOptions<E>,
    cancel: &CancellationToken,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let config = options.config.normalized();
    let mut attempt = 1u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled {
                attempts: attempt - 1,
            });
        }

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(delay_ms) = options.next_delay(&config, attempt, &err) else {
            return Err(RetryError::Operation(err));
        };

        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }

        options.notify(&config, attempt, delay_ms, &err);
        debug!(
            "Retry {}/{} for {} after {}ms delay",
            attempt,
            config.attempts,
            options.label_str().unwrap_or("operation"),
            delay_ms
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Retry wait cancelled after {} attempt(s)", attempt);
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            _ = sleep(Duration::from_millis(delay_ms)) => {}
        }

        attempt += 1;
    }
}

/// Simple form: retries every error up to `attempts` total invocations,
/// waiting `initial_delay_ms * 2^n` between them, without jitter or cap
pub async fn retry_with_attempts<T, E, F, Fut>(
    operation: F,
    attempts: u32,
    initial_delay_ms: u64,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let options = RetryOptions::new(RetryConfig {
        attempts,
        min_delay_ms: initial_delay_ms,
        max_delay_ms: u64::MAX,
        jitter: 0.0,
    });
    retry_async(operation, &options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(attempts: u32) -> RetryConfig {
        RetryConfig {
            attempts,
            min_delay_ms: 400,
            max_delay_ms: 30_000,
            jitter: 0.0,
        }
    }

    #[test]
    fn exhausted_attempts_stop() {
        let options: RetryOptions<()> = RetryOptions::new(fixed(3));
        let config = options.config;
        assert_eq!(options.next_delay(&config, 1, &()), Some(400));
        assert_eq!(options.next_delay(&config, 2, &()), Some(800));
        assert_eq!(options.next_delay(&config, 3, &()), None);
    }

    #[test]
    fn mandated_wait_is_at_least_min_delay() {
        let options: RetryOptions<f64> = RetryOptions::new(fixed(3)).retry_after_ms(|ms| Some(*ms));
        let config = options.config;
        assert_eq!(options.next_delay(&config, 1, &2_000.0), Some(2_000));
        assert_eq!(options.next_delay(&config, 1, &10.0), Some(400));
        assert_eq!(options.next_delay(&config, 1, &60_000.0), Some(60_000));
    }

    #[test]
    fn non_finite_mandate_falls_back_to_backoff() {
        let options: RetryOptions<f64> = RetryOptions::new(fixed(3)).retry_after_ms(|ms| Some(*ms));
        let config = options.config;
        assert_eq!(options.next_delay(&config, 2, &f64::NAN), Some(800));
        assert_eq!(options.next_delay(&config, 2, &f64::INFINITY), Some(800));
    }

    #[test]
    fn predicate_can_decline() {
        let options: RetryOptions<()> = RetryOptions::new(fixed(5)).should_retry(|_| false);
        let config = options.config;
        assert_eq!(options.next_delay(&config, 1, &()), None);
    }
}
