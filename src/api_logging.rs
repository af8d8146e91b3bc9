//! Failure logging around Bot API calls
//!
//! [`with_api_error_logging`] observes a call: on failure it writes one line
//! naming the operation and the error, then returns the very same error. It
//! never retries and never swallows anything.

use std::fmt::Display;
use std::future::Future;

use tracing::error;

/// Subsystem tag used by the fallback logger
pub const DEFAULT_SUBSYSTEM: &str = "bot-api";

/// Sink for failure lines
pub trait ApiLogger: Send + Sync {
    fn error(&self, line: &str);
}

impl<F> ApiLogger for F
where
    F: Fn(&str) + Send + Sync,
{
    fn error(&self, line: &str) {
        self(line)
    }
}

/// Fallback logger writing through `tracing` with a subsystem field
#[derive(Debug, Clone, Copy)]
pub struct SubsystemLogger {
    subsystem: &'static str,
}

impl SubsystemLogger {
    pub const fn new(subsystem: &'static str) -> Self {
        Self { subsystem }
    }
}

impl Default for SubsystemLogger {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSYSTEM)
    }
}

impl ApiLogger for SubsystemLogger {
    fn error(&self, line: &str) {
        error!(subsystem = self.subsystem, "{}", line);
    }
}

/// Describes one logged API call
///
/// Logger resolution: the explicit `logger`, else the runtime's logger, else
/// the fallback [`SubsystemLogger`].
pub struct ApiErrorLogging<'a, E> {
    operation: &'a str,
    logger: Option<&'a dyn ApiLogger>,
    runtime_logger: Option<&'a dyn ApiLogger>,
    fallback: SubsystemLogger,
    should_log: Option<&'a (dyn Fn(&E) -> bool + Send + Sync)>,
}

impl<'a, E> ApiErrorLogging<'a, E> {
    pub fn new(operation: &'a str) -> Self {
        Self {
            operation,
            logger: None,
            runtime_logger: None,
            fallback: SubsystemLogger::default(),
            should_log: None,
        }
    }

    pub fn logger(mut self, logger: &'a dyn ApiLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Logger provided by the hosting runtime, used when no explicit one is set
    pub fn runtime_logger(mut self, logger: Option<&'a dyn ApiLogger>) -> Self {
        self.runtime_logger = logger;
        self
    }

    pub fn subsystem(mut self, subsystem: &'static str) -> Self {
        self.fallback = SubsystemLogger::new(subsystem);
        self
    }

    pub fn should_log(mut self, filter: &'a (dyn Fn(&E) -> bool + Send + Sync)) -> Self {
        self.should_log = Some(filter);
        self
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    fn resolved_logger(&self) -> &dyn ApiLogger {
        self.logger
            .or(self.runtime_logger)
            .unwrap_or(&self.fallback)
    }
}

/// Formats the failure line for an operation
pub fn format_api_error_line(operation: &str, err: &impl Display) -> String {
    format!("{} failed: {}", operation, err)
}

/// Runs `call`, logging its failure once and returning the original error
///
/// # Examples
///
/// ```
/// use botguard::api_logging::{with_api_error_logging, ApiErrorLogging};
/// use botguard::error::ApiError;
///
/// # async fn example() {
/// let err = with_api_error_logging(ApiErrorLogging::new("sendMessage"), || async {
///     Err::<(), _>(ApiError::new("Bad Request: chat not found"))
/// })
/// .await
/// .unwrap_err();
/// assert_eq!(err.message(), "Bad Request: chat not found");
/// # }
/// ```
pub async fn with_api_error_logging<T, E, F, Fut>(
    logging: ApiErrorLogging<'_, E>,
    call: F,
) -> Result<T, E>
where
    E: Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match call().await {
        Ok(value) => Ok(value),
        Err(err) => {
            let wanted = logging.should_log.map(|filter| filter(&err)).unwrap_or(true);
            if wanted {
                logging
                    .resolved_logger()
                    .error(&format_api_error_line(logging.operation, &err));
            }
            Err(err)
        }
    }
}
