//! Retry configuration and its layered resolution
//!
//! Every channel starts from a hardcoded default, which the channel section of
//! the configuration document may override, which a call site may override in
//! turn. Resolution is an explicit field-by-field merge:
//!
//! call-site override > channel configuration > hardcoded default
//!
//! The configuration document itself is a small JSON shape:
//!
//! ```json
//! { "channels": { "telegram": { "retry": { "attempts": 5, "minDelayMs": 250 } } } }
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Fully populated retry configuration
///
/// `attempts` counts total invocations of the operation, so `attempts - 1`
/// is the maximum number of retries after the first failure.
///
/// # Examples
///
/// ```
/// use botguard::config::{RetryConfig, TELEGRAM_RETRY_DEFAULTS};
///
/// let config = RetryConfig {
///     attempts: 5,
///     ..TELEGRAM_RETRY_DEFAULTS
/// };
/// assert_eq!(config.min_delay_ms, 400);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total number of invocations, including the first one
    pub attempts: u32,

    /// Base delay for the first retry, in milliseconds
    pub min_delay_ms: u64,

    /// Upper bound for the exponential part of the delay, in milliseconds
    pub max_delay_ms: u64,

    /// Fraction of the delay that may be randomly added or removed, in `[0, 1]`
    pub jitter: f64,
}

/// Fallback used by the generic engine when nothing more specific applies
pub const DEFAULT_RETRY_CONFIG: RetryConfig = RetryConfig {
    attempts: 3,
    min_delay_ms: 300,
    max_delay_ms: 30_000,
    jitter: 0.0,
};

pub const DISCORD_RETRY_DEFAULTS: RetryConfig = RetryConfig {
    attempts: 3,
    min_delay_ms: 500,
    max_delay_ms: 30_000,
    jitter: 0.1,
};

pub const TELEGRAM_RETRY_DEFAULTS: RetryConfig = RetryConfig {
    attempts: 3,
    min_delay_ms: 400,
    max_delay_ms: 30_000,
    jitter: 0.1,
};

impl Default for RetryConfig {
    fn default() -> Self {
        DEFAULT_RETRY_CONFIG
    }
}

impl RetryConfig {
    /// Returns a copy that satisfies the configuration invariants
    ///
    /// - `attempts` is at least 1
    /// - `max_delay_ms` is at least `min_delay_ms`
    /// - `jitter` is finite and within `[0, 1]`
    pub fn normalized(self) -> Self {
        let jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            attempts: self.attempts.max(1),
            min_delay_ms: self.min_delay_ms,
            max_delay_ms: self.max_delay_ms.max(self.min_delay_ms),
            jitter,
        }
    }

    /// Applies a partial override, keeping fields the override leaves unset
    pub fn merged_with(self, layer: &RetryOverride) -> Self {
        Self {
            attempts: layer.attempts.unwrap_or(self.attempts),
            min_delay_ms: layer.min_delay_ms.unwrap_or(self.min_delay_ms),
            max_delay_ms: layer.max_delay_ms.unwrap_or(self.max_delay_ms),
            jitter: layer.jitter.unwrap_or(self.jitter),
        }
    }
}

/// Partial retry configuration, as found in a configuration document or
/// passed by a call site
///
/// Keys are accepted in camelCase (`minDelayMs`) and snake_case
/// (`min_delay_ms`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOverride {
    pub attempts: Option<u32>,

    #[serde(alias = "min_delay_ms")]
    pub min_delay_ms: Option<u64>,

    #[serde(alias = "max_delay_ms")]
    pub max_delay_ms: Option<u64>,

    pub jitter: Option<f64>,
}

impl RetryOverride {
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn min_delay_ms(mut self, ms: u64) -> Self {
        self.min_delay_ms = Some(ms);
        self
    }

    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = Some(ms);
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }
}

/// Resolves the effective retry configuration from a default and a list of
/// override layers
///
/// Layers apply left to right, so later layers win field by field. Absent
/// layers (`None`) are skipped. Pass them in increasing precedence:
/// channel configuration first, call site last.
///
/// # Examples
///
/// ```
/// use botguard::config::{resolve_retry_config, RetryOverride, TELEGRAM_RETRY_DEFAULTS};
///
/// let from_config = RetryOverride::default().attempts(5);
/// let from_call = RetryOverride::default().min_delay_ms(100);
///
/// let resolved = resolve_retry_config(
///     TELEGRAM_RETRY_DEFAULTS,
///     &[Some(&from_config), Some(&from_call)],
/// );
/// assert_eq!(resolved.attempts, 5);
/// assert_eq!(resolved.min_delay_ms, 100);
/// assert_eq!(resolved.max_delay_ms, TELEGRAM_RETRY_DEFAULTS.max_delay_ms);
/// ```
pub fn resolve_retry_config(
    defaults: RetryConfig,
    overrides: &[Option<&RetryOverride>],
) -> RetryConfig {
    overrides
        .iter()
        .flatten()
        .fold(defaults, |acc, layer| acc.merged_with(layer))
        .normalized()
}

/// Errors raised while loading a configuration document
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Retry section of a single channel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub retry: Option<RetryOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub discord: ChannelConfig,

    #[serde(default)]
    pub telegram: ChannelConfig,
}

/// Root of the configuration document consumed by the retry core
///
/// Unknown keys are ignored so the document can be shared with the rest of
/// the client application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotguardConfig {
    #[serde(default)]
    pub channels: ChannelsConfig,
}

impl BotguardConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads and parses a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from {}", path.display());

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json_str(&raw)
    }

    pub fn discord_retry(&self) -> Option<&RetryOverride> {
        self.channels.discord.retry.as_ref()
    }

    pub fn telegram_retry(&self) -> Option<&RetryOverride> {
        self.channels.telegram.retry.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_win_field_by_field() {
        let defaults = RetryConfig {
            attempts: 3,
            min_delay_ms: 400,
            max_delay_ms: 30_000,
            jitter: 0.1,
        };
        let config_layer = RetryOverride::default().attempts(5);
        let call_layer = RetryOverride::default().min_delay_ms(100);

        let resolved = resolve_retry_config(defaults, &[Some(&config_layer), Some(&call_layer)]);

        assert_eq!(
            resolved,
            RetryConfig {
                attempts: 5,
                min_delay_ms: 100,
                max_delay_ms: 30_000,
                jitter: 0.1,
            }
        );
    }

    #[test]
    fn absent_layers_are_skipped() {
        let resolved = resolve_retry_config(DISCORD_RETRY_DEFAULTS, &[None, None]);
        assert_eq!(resolved, DISCORD_RETRY_DEFAULTS);
    }

    #[test]
    fn normalizes_degenerate_values() {
        let layer = RetryOverride::default()
            .attempts(0)
            .min_delay_ms(5_000)
            .max_delay_ms(10)
            .jitter(4.0);

        let resolved = resolve_retry_config(DEFAULT_RETRY_CONFIG, &[Some(&layer)]);

        assert_eq!(resolved.attempts, 1);
        assert_eq!(resolved.min_delay_ms, 5_000);
        assert_eq!(resolved.max_delay_ms, 5_000);
        assert_eq!(resolved.jitter, 1.0);
    }

    #[test]
    fn nan_jitter_becomes_zero() {
        let config = RetryConfig {
            jitter: f64::NAN,
            ..DEFAULT_RETRY_CONFIG
        };
        assert_eq!(config.normalized().jitter, 0.0);
    }
}
