//! Command-line interface for botguard
//!
//! Operator tooling around the retry core:
//!
//! - `backoff` previews the delay schedule a channel would use
//! - `classify` runs the network error classifier on a described error
//! - `call` performs one Bot API call through the logging wrapper and the
//!   channel's retry runner
//!
//! The optional `--config` document supplies `channels.<name>.retry`
//! overrides; command-line flags override those in turn.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::classify::ErrorContext;
use crate::config::RetryOverride;

/// Main command-line interface structure for botguard
///
/// # Examples
///
/// ```
/// use botguard::cli::{Cli, Commands};
/// use clap::Parser;
///
/// let cli = Cli::try_parse_from(["botguard", "backoff", "--channel", "telegram"]).unwrap();
/// assert!(matches!(cli.command, Commands::Backoff { .. }));
/// ```
#[derive(Parser)]
#[command(
    name = "botguard",
    about = "Retry, backoff and error classification for Bot API calls",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON configuration file with `channels.<name>.retry` sections
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,
}

/// Channels with a preconfigured retry runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Channel {
    Discord,
    Telegram,
}

/// Classification contexts as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContextArg {
    Polling,
    Send,
    Webhook,
    Unknown,
}

impl From<ContextArg> for ErrorContext {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::Polling => ErrorContext::Polling,
            ContextArg::Send => ErrorContext::Send,
            ContextArg::Webhook => ErrorContext::Webhook,
            ContextArg::Unknown => ErrorContext::Unknown,
        }
    }
}

/// Flags overriding the resolved retry configuration
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RetryArgs {
    /// Total number of attempts, including the first
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Base delay in milliseconds
    #[arg(long)]
    pub min_delay_ms: Option<u64>,

    /// Maximum delay in milliseconds
    #[arg(long)]
    pub max_delay_ms: Option<u64>,

    /// Jitter fraction in [0, 1]
    #[arg(long)]
    pub jitter: Option<f64>,
}

impl RetryArgs {
    /// Call-site override layer built from the flags that were given
    pub fn to_override(&self) -> RetryOverride {
        RetryOverride {
            attempts: self.attempts,
            min_delay_ms: self.min_delay_ms,
            max_delay_ms: self.max_delay_ms,
            jitter: self.jitter,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the delay before each retry for a channel's configuration
    Backoff {
        #[arg(long, value_enum)]
        channel: Channel,

        #[command(flatten)]
        retry: RetryArgs,

        /// Ignore jitter and print the deterministic schedule
        #[arg(long)]
        no_jitter: bool,
    },

    /// Decide whether a described error would be retried as a network failure
    Classify {
        /// Error message
        #[arg(short, long)]
        message: String,

        /// System error code, e.g. ECONNRESET
        #[arg(long)]
        code: Option<String>,

        /// Error name, e.g. TimeoutError
        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_enum, default_value = "unknown")]
        context: ContextArg,

        /// Force message matching on or off
        #[arg(long)]
        allow_message_match: Option<bool>,
    },

    /// Perform one Bot API call with retries and failure logging
    Call {
        #[arg(long, value_enum)]
        channel: Channel,

        /// Bot token
        #[arg(short, long, env = "BOTGUARD_TOKEN", hide_env_values = true)]
        token: String,

        /// Method name (Telegram) or path (Discord)
        #[arg(short, long)]
        method: String,

        /// JSON payload
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Override the API base URL
        #[arg(long)]
        base_url: Option<String>,

        #[command(flatten)]
        retry: RetryArgs,

        /// Log one line per retry
        #[arg(short, long)]
        verbose: bool,
    },
}
