use anyhow::Result;
use botguard::api_logging::{with_api_error_logging, ApiErrorLogging, ApiLogger};
use botguard::discord::create_discord_retry_runner;
use botguard::error::ApiError;
use botguard::runner::ChannelRetryOptions;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing_test::traced_test;

#[derive(Default)]
struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl ApiLogger for RecordingLogger {
    fn error(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

impl RecordingLogger {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_success_passes_through_silently() -> Result<()> {
    let logger = RecordingLogger::default();

    let value = with_api_error_logging(
        ApiErrorLogging::<ApiError>::new("getMe").logger(&logger),
        || async { Ok(5) },
    )
    .await?;

    assert_eq!(value, 5);
    assert!(logger.lines().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failure_is_logged_and_returned_unchanged() -> Result<()> {
    let logger = RecordingLogger::default();
    let original = ApiError::new("403: Forbidden: bot was kicked from the group chat");

    let result: Result<(), ApiError> = with_api_error_logging(
        ApiErrorLogging::new("sendMessage").logger(&logger),
        || {
            let err = original.clone();
            async move { Err(err) }
        },
    )
    .await;

    assert!(result.unwrap_err().same_as(&original));
    assert_eq!(
        logger.lines(),
        vec!["sendMessage failed: 403: Forbidden: bot was kicked from the group chat".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_should_log_filter_suppresses_line_not_error() -> Result<()> {
    let logger = RecordingLogger::default();
    let skip_not_modified = |err: &ApiError| !err.message().contains("message is not modified");

    let result: Result<(), ApiError> = with_api_error_logging(
        ApiErrorLogging::<ApiError>::new("editMessageText")
            .logger(&logger)
            .should_log(&skip_not_modified),
        || async { Err(ApiError::new("400: Bad Request: message is not modified")) },
    )
    .await;

    assert!(result.is_err());
    assert!(logger.lines().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_explicit_logger_beats_runtime_logger() -> Result<()> {
    let explicit = RecordingLogger::default();
    let runtime = RecordingLogger::default();

    let _: Result<(), ApiError> = with_api_error_logging(
        ApiErrorLogging::new("getUpdates")
            .logger(&explicit)
            .runtime_logger(Some(&runtime)),
        || async { Err(ApiError::new("fetch failed")) },
    )
    .await;

    assert_eq!(explicit.lines().len(), 1);
    assert!(runtime.lines().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_runtime_logger_used_without_explicit_one() -> Result<()> {
    let runtime = RecordingLogger::default();

    let _: Result<(), ApiError> = with_api_error_logging(
        ApiErrorLogging::new("setWebhook").runtime_logger(Some(&runtime)),
        || async { Err(ApiError::new("401: Unauthorized")) },
    )
    .await;

    assert_eq!(runtime.lines(), vec!["setWebhook failed: 401: Unauthorized".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_closures_are_loggers() -> Result<()> {
    let lines = Mutex::new(Vec::new());
    let logger = |line: &str| lines.lock().unwrap().push(line.to_string());

    let _: Result<(), ApiError> = with_api_error_logging(
        ApiErrorLogging::new("deleteMessage").logger(&logger),
        || async { Err(ApiError::new("400: Bad Request: message to delete not found")) },
    )
    .await;

    assert_eq!(lines.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn test_fallback_logger_writes_through_tracing() {
    let _: Result<(), ApiError> = with_api_error_logging(
        ApiErrorLogging::new("answerCallbackQuery").subsystem("telegram"),
        || async { Err(ApiError::new("query is too old")) },
    )
    .await;

    assert!(logs_contain("answerCallbackQuery failed: query is too old"));
    assert!(logs_contain("telegram"));
}

#[tokio::test(start_paused = true)]
async fn test_wrapper_logs_once_around_retries() -> Result<()> {
    let logger = RecordingLogger::default();
    let runner = create_discord_retry_runner(ChannelRetryOptions::default());
    let calls = AtomicU32::new(0);

    let result: Result<(), ApiError> = with_api_error_logging(
        ApiErrorLogging::new("createMessage").logger(&logger),
        || {
            runner.run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::rate_limited("You are being rate limited.", 0.5))
                },
                Some("createMessage"),
            )
        },
    )
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(logger.lines().len(), 1);
    Ok(())
}
