//! Reusable, preconfigured retry runners
//!
//! A [`RetryRunner`] binds a resolved configuration, a retry predicate, a
//! retry-after extractor and an optional observer once, then wraps any number
//! of operations. Channel factories live in [`crate::discord`] and
//! [`crate::telegram`].

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{RetryConfig, RetryOverride};
use crate::error::ApiError;
use crate::retry::{
    retry_async, retry_async_cancellable, OnRetry, RetryAfterMs, RetryAttemptInfo, RetryError,
    RetryOptions, ShouldRetry,
};

/// Label used in retry lines when the caller gave none
pub const DEFAULT_LABEL: &str = "request";

/// Options shared by the channel runner factories
#[derive(Clone, Default)]
pub struct ChannelRetryOptions {
    /// Call-site override, highest precedence
    pub retry: Option<RetryOverride>,

    /// Channel configuration override (`channels.<name>.retry`)
    pub config_retry: Option<RetryOverride>,

    /// Log one warning line per retry
    pub verbose: bool,

    /// Extra predicate OR-ed with the channel's own (Telegram only)
    pub should_retry: Option<ShouldRetry<ApiError>>,
}

impl ChannelRetryOptions {
    pub fn retry(mut self, layer: RetryOverride) -> Self {
        self.retry = Some(layer);
        self
    }

    pub fn config_retry(mut self, layer: Option<RetryOverride>) -> Self {
        self.config_retry = layer;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn should_retry(mut self, f: impl Fn(&ApiError) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Some(Arc::new(f));
        self
    }
}

/// A preconfigured retry engine for one channel
///
/// Cloning is cheap; clones share predicates and observers.
pub struct RetryRunner<E = ApiError> {
    channel: &'static str,
    options: RetryOptions<E>,
}

impl<E> Clone for RetryRunner<E> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel,
            options: self.options.clone(),
        }
    }
}

impl<E: Display + 'static> RetryRunner<E> {
    pub fn new(
        channel: &'static str,
        config: RetryConfig,
        should_retry: ShouldRetry<E>,
        retry_after_ms: RetryAfterMs<E>,
        verbose: bool,
    ) -> Self {
        let on_retry: Option<OnRetry<E>> = if verbose {
            Some(Arc::new(move |info: &RetryAttemptInfo<'_, E>| {
                warn!("{}", format_retry_line(channel, info));
            }))
        } else {
            None
        };

        Self {
            channel,
            options: RetryOptions::new(config).with_hooks(
                Some(should_retry),
                Some(retry_after_ms),
                on_retry,
            ),
        }
    }
}

impl<E> RetryRunner<E> {
    pub fn channel(&self) -> &'static str {
        self.channel
    }

    pub fn config(&self) -> RetryConfig {
        self.options.config
    }

    /// Wraps `operation` with this runner's retry behaviour
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use botguard::discord::create_discord_retry_runner;
    /// use botguard::error::ApiError;
    /// use botguard::runner::ChannelRetryOptions;
    ///
    /// # async fn example() -> Result<(), ApiError> {
    /// let runner = create_discord_retry_runner(ChannelRetryOptions::default());
    /// let id = runner
    ///     .run(|| async { Ok::<_, ApiError>("message-id") }, Some("createMessage"))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run<T, F, Fut>(&self, operation: F, label: Option<&str>) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let options = self.options.clone().with_label(label);
        retry_async(operation, &options).await
    }

    /// Same as [`RetryRunner::run`], stopping when `cancel` fires
    pub async fn run_cancellable<T, F, Fut>(
        &self,
        operation: F,
        label: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let options = self.options.clone().with_label(label);
        retry_async_cancellable(operation, &options, cancel).await
    }
}

/// Formats the single-line warning emitted by verbose runners
///
/// `<channel> <label> retry <n>/<max> in <ms>ms: <message>`; the message part
/// is omitted when the error renders empty.
pub fn format_retry_line<E: Display>(channel: &str, info: &RetryAttemptInfo<'_, E>) -> String {
    let label = info.label.unwrap_or(DEFAULT_LABEL);
    let message = info.err.to_string();

    let mut line = format!(
        "{} {} retry {}/{} in {}ms",
        channel, label, info.attempt, info.max_attempts, info.delay_ms
    );
    if !message.is_empty() {
        line.push_str(": ");
        line.push_str(&message);
    }
    line
}
