//! HTTP client for Telegram-style and Discord-style Bot APIs
//!
//! The client performs single calls and turns every failure into an
//! [`ApiError`] the retry runners understand:
//!
//! - Telegram-style `{ "ok": false, ... }` bodies keep their JSON so
//!   `parameters.retry_after` stays reachable
//! - Discord-style HTTP 429 responses become rate limit errors carrying the
//!   body's `retry_after` seconds
//! - Transport failures keep their source chain and system codes
//!
//! Retries are not performed here; wrap calls with a runner.

use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::ApiError;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Which wire conventions a [`BotApiClient`] speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Telegram,
    Discord,
}

/// Bot API client for one channel
///
/// # Examples
///
/// ```no_run
/// use botguard::client::BotApiClient;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), botguard::error::ApiError> {
/// let client = BotApiClient::telegram("123:abc")?;
/// let me = client.call("getMe", &json!({})).await?;
/// # Ok(())
/// # }
/// ```
pub struct BotApiClient {
    client: Client,
    flavor: Flavor,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl BotApiClient {
    pub fn telegram(token: impl Into<String>) -> Result<Self, ApiError> {
        Self::new(Flavor::Telegram, TELEGRAM_API_BASE, token, Duration::from_secs(30))
    }

    pub fn discord(token: impl Into<String>) -> Result<Self, ApiError> {
        Self::new(Flavor::Discord, DISCORD_API_BASE, token, Duration::from_secs(30))
    }

    pub fn new(
        flavor: Flavor,
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("botguard/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            flavor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout,
        })
    }

    /// Points the client at another server, e.g. a local Bot API server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-call timeout; a timed-out call surfaces as a `TimeoutError`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// URL a method is posted to; the token is part of Telegram-style URLs
    pub fn method_url(&self, method: &str) -> String {
        let method = method.trim_start_matches('/');
        match self.flavor {
            Flavor::Telegram => format!("{}/bot{}/{}", self.base_url, self.token, method),
            Flavor::Discord => format!("{}/{}", self.base_url, method),
        }
    }

    /// Posts `payload` to `method` and returns the JSON result
    ///
    /// For Telegram-style APIs the `result` field of a successful envelope is
    /// returned; Discord-style APIs return the whole body.
    pub async fn call(&self, method: &str, payload: &Value) -> Result<Value, ApiError> {
        debug!("Calling {:?} method {}", self.flavor, method);

        let mut request = self
            .client
            .post(self.method_url(method))
            .timeout(self.timeout)
            .json(payload);
        if self.flavor == Flavor::Discord {
            request = request.header("Authorization", format!("Bot {}", self.token));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        debug!("{} responded with {}", method, status);

        match self.flavor {
            Flavor::Telegram => telegram_result(status, body),
            Flavor::Discord => discord_result(status, body),
        }
    }
}

/// Unwraps a Telegram-style envelope or turns it into an [`ApiError`]
pub fn telegram_result(status: StatusCode, body: Value) -> Result<Value, ApiError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body.get("result").cloned().unwrap_or(Value::Null));
    }

    let code = body
        .get("error_code")
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(status.as_u16()));
    let description = body
        .get("description")
        .and_then(Value::as_str)
        .or(status.canonical_reason())
        .unwrap_or("request failed");

    Err(ApiError::new(format!("{}: {}", code, description))
        .with_name("TelegramApiError")
        .with_body(body))
}

/// Accepts a Discord-style response or turns it into an [`ApiError`]
pub fn discord_result(status: StatusCode, body: Value) -> Result<Value, ApiError> {
    if status.is_success() {
        return Ok(body);
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .or(status.canonical_reason())
        .unwrap_or("request failed")
        .to_string();

    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(secs) = body.get("retry_after").and_then(Value::as_f64) {
            return Err(ApiError::rate_limited(message, secs).with_body(body));
        }
    }

    Err(ApiError::new(format!("{}: {}", status.as_u16(), message))
        .with_name("DiscordApiError")
        .with_body(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_urls_embed_token() {
        let client = BotApiClient::telegram("123:abc")
            .unwrap()
            .with_base_url("http://localhost:8081/");
        assert_eq!(client.method_url("getMe"), "http://localhost:8081/bot123:abc/getMe");
    }

    #[test]
    fn discord_urls_use_paths() {
        let client = BotApiClient::discord("secret").unwrap();
        assert_eq!(
            client.method_url("/channels/1/messages"),
            "https://discord.com/api/v10/channels/1/messages"
        );
    }
}
