use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;

use tokio::runtime::Builder;
use tracing::{debug, info};

use botguard::api_logging::{with_api_error_logging, ApiErrorLogging};
use botguard::backoff::compute_delay;
use botguard::classify::{is_recoverable_network_error, ClassifyOptions};
use botguard::cli::{Channel, Cli, Commands, RetryArgs};
use botguard::client::BotApiClient;
use botguard::config::{
    resolve_retry_config, BotguardConfig, RetryConfig, RetryOverride, DISCORD_RETRY_DEFAULTS,
    TELEGRAM_RETRY_DEFAULTS,
};
use botguard::discord::create_discord_retry_runner;
use botguard::error::ApiError;
use botguard::runner::{ChannelRetryOptions, RetryRunner};
use botguard::telegram::create_telegram_retry_runner;
use botguard::{discord, telegram};

fn main() -> Result<()> {
    // A handful of workers is plenty: every command drives at most one
    // retry sequence at a time.
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    let worker_threads = num_cpus.clamp(1, 4);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // stdout carries command output only
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BotguardConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BotguardConfig::default(),
    };
    debug!("Worker runtime ready, running command");

    match cli.command {
        Commands::Backoff {
            channel,
            retry,
            no_jitter,
        } => {
            let resolved = resolve_channel_config(channel, &config, &retry);
            info!("Resolved {:?} retry config: {:?}", channel, resolved);

            println!(
                "attempts={} min_delay_ms={} max_delay_ms={} jitter={}",
                resolved.attempts, resolved.min_delay_ms, resolved.max_delay_ms, resolved.jitter
            );
            for attempt in 1..resolved.attempts {
                let jitter = if no_jitter { 0.0 } else { resolved.jitter };
                let delay = compute_delay(
                    resolved.min_delay_ms,
                    attempt - 1,
                    resolved.max_delay_ms,
                    jitter,
                );
                println!("retry {}/{}: {}ms", attempt, resolved.attempts, delay);
            }
        }
        Commands::Classify {
            message,
            code,
            name,
            context,
            allow_message_match,
        } => {
            let mut err = ApiError::new(message);
            if let Some(code) = code {
                err = err.with_code(code);
            }
            if let Some(name) = name {
                err = err.with_name(name);
            }

            let mut options = ClassifyOptions::new(context.into());
            options.allow_message_match = allow_message_match;

            let verdict = if is_recoverable_network_error(&err, options) {
                "recoverable"
            } else {
                "fatal"
            };
            println!("{}", verdict);
        }
        Commands::Call {
            channel,
            token,
            method,
            payload,
            base_url,
            retry,
            verbose,
        } => {
            let payload: Value =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;

            let (client, subsystem) = match channel {
                Channel::Discord => (BotApiClient::discord(token)?, discord::CHANNEL),
                Channel::Telegram => (BotApiClient::telegram(token)?, telegram::CHANNEL),
            };
            let client = match base_url {
                Some(url) => client.with_base_url(url),
                None => client,
            };
            let runner = channel_runner(channel, &config, &retry, verbose);

            let result = with_api_error_logging(
                ApiErrorLogging::new(&method).subsystem(subsystem),
                || runner.run(|| client.call(&method, &payload), Some(&method)),
            )
            .await
            .with_context(|| format!("{} {} failed", subsystem, method))?;

            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn channel_defaults(
    channel: Channel,
    config: &BotguardConfig,
) -> (RetryConfig, Option<RetryOverride>) {
    match channel {
        Channel::Discord => (DISCORD_RETRY_DEFAULTS, config.discord_retry().copied()),
        Channel::Telegram => (TELEGRAM_RETRY_DEFAULTS, config.telegram_retry().copied()),
    }
}

fn resolve_channel_config(
    channel: Channel,
    config: &BotguardConfig,
    retry: &RetryArgs,
) -> RetryConfig {
    let (defaults, from_config) = channel_defaults(channel, config);
    let from_flags = retry.to_override();
    resolve_retry_config(defaults, &[from_config.as_ref(), Some(&from_flags)])
}

fn channel_runner(
    channel: Channel,
    config: &BotguardConfig,
    retry: &RetryArgs,
    verbose: bool,
) -> RetryRunner<ApiError> {
    let (_, from_config) = channel_defaults(channel, config);
    let options = ChannelRetryOptions::default()
        .config_retry(from_config)
        .retry(retry.to_override())
        .verbose(verbose);

    match channel {
        Channel::Discord => create_discord_retry_runner(options),
        Channel::Telegram => create_telegram_retry_runner(options),
    }
}
