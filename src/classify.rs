//! Network error classification
//!
//! Decides whether a failure is a transient network condition worth retrying.
//! Errors surfacing from HTTP and socket layers are heterogeneous and often
//! wrapped by intermediate libraries, so every error reachable from the root
//! (through `cause`, `reason`, `wrapped` and aggregate `errors`) is inspected
//! for three signals, in order:
//!
//! 1. a known transient system code (`code` or `errno`)
//! 2. a known transient error name
//! 3. a transient-sounding phrase in the message, when message matching is
//!    allowed for the calling context

use std::collections::{HashSet, VecDeque};

use crate::error::ApiError;

const RECOVERABLE_CODES: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "ECONNABORTED",
    "EPIPE",
    "ETIMEDOUT",
    "ESOCKETTIMEDOUT",
    "ENETUNREACH",
    "EHOSTUNREACH",
    "ENOTFOUND",
    "EAI_AGAIN",
    "UND_ERR_CONNECT_TIMEOUT",
    "UND_ERR_HEADERS_TIMEOUT",
    "UND_ERR_BODY_TIMEOUT",
    "UND_ERR_SOCKET",
    "UND_ERR_ABORTED",
    "UND_ERR_DNS_RESOLVE_FAILED",
    "ERR_NETWORK",
];

const RECOVERABLE_NAMES: &[&str] = &[
    "AbortError",
    "TimeoutError",
    "ConnectTimeoutError",
    "HeadersTimeoutError",
    "BodyTimeoutError",
];

const RECOVERABLE_MESSAGE_SNIPPETS: &[&str] = &[
    "fetch failed",
    "undici",
    "network error",
    "network request",
    "client network socket disconnected",
    "socket hang up",
    "getaddrinfo",
    "timeout",
    "timed out",
];

/// Where the failing call came from
///
/// The context only changes policy: message matching is too loose for
/// user-facing sends, where the text may merely mention these words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorContext {
    Polling,
    Send,
    Webhook,
    #[default]
    Unknown,
}

/// Options for [`is_recoverable_network_error`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyOptions {
    pub context: ErrorContext,

    /// Forces message matching on or off. When unset, it is off for
    /// [`ErrorContext::Send`] and on otherwise.
    pub allow_message_match: Option<bool>,
}

impl ClassifyOptions {
    pub fn new(context: ErrorContext) -> Self {
        Self {
            context,
            allow_message_match: None,
        }
    }

    pub fn allow_message_match(mut self, allow: bool) -> Self {
        self.allow_message_match = Some(allow);
        self
    }

    fn message_match_enabled(&self) -> bool {
        self.allow_message_match
            .unwrap_or(self.context != ErrorContext::Send)
    }
}

/// Returns every error reachable from `err`, breadth first, each at most once
///
/// Links are followed in the order `cause`, `reason`, `errors`, `wrapped`.
/// Deduplication is by identity, so cyclic or repeated references terminate.
pub fn error_candidates(err: &ApiError) -> Vec<&ApiError> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([err]);
    let mut candidates = Vec::new();

    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.id()) {
            continue;
        }
        candidates.push(current);

        let links = current
            .cause()
            .into_iter()
            .chain(current.reason())
            .chain(current.errors())
            .chain(current.wrapped());

        for next in links {
            if !seen.contains(&next.id()) {
                queue.push_back(next);
            }
        }
    }

    candidates
}

/// Decides whether `err` represents a transient, retryable network condition
///
/// # Examples
///
/// ```
/// use botguard::classify::{is_recoverable_network_error, ClassifyOptions, ErrorContext};
/// use botguard::error::ApiError;
///
/// let err = ApiError::new("network error occurred");
/// assert!(is_recoverable_network_error(&err, ClassifyOptions::new(ErrorContext::Polling)));
/// assert!(!is_recoverable_network_error(&err, ClassifyOptions::new(ErrorContext::Send)));
/// ```
pub fn is_recoverable_network_error(err: &ApiError, options: ClassifyOptions) -> bool {
    let match_messages = options.message_match_enabled();

    error_candidates(err).into_iter().any(|candidate| {
        has_recoverable_code(candidate)
            || has_recoverable_name(candidate)
            || (match_messages && has_recoverable_message(candidate))
    })
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn has_recoverable_code(err: &ApiError) -> bool {
    err.code()
        .into_iter()
        .chain(err.errno())
        .map(normalize_code)
        .any(|code| RECOVERABLE_CODES.contains(&code.as_str()))
}

fn has_recoverable_name(err: &ApiError) -> bool {
    err.name()
        .map(|name| RECOVERABLE_NAMES.contains(&name))
        .unwrap_or(false)
}

fn has_recoverable_message(err: &ApiError) -> bool {
    let message = err.to_string().to_lowercase();
    !message.is_empty()
        && RECOVERABLE_MESSAGE_SNIPPETS
            .iter()
            .any(|snippet| message.contains(snippet))
}
