//! Dynamic error value for Bot API failures
//!
//! Failures reach the retry core from very different places: system socket
//! errors that only carry a code, HTTP client errors that carry a kind name,
//! API responses that carry a JSON body, and wrappers that bury any of these
//! behind `cause`, `reason`, `wrapped` or an aggregate `errors` list.
//! [`ApiError`] models all of them with one cheaply clonable value so the
//! classifier and the channel runners can inspect them uniformly.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Name given to Discord-style rate limit errors
pub const RATE_LIMIT_ERROR_NAME: &str = "RateLimitError";

/// Upper bound on how deep a `std::error::Error` source chain is copied
const MAX_SOURCE_DEPTH: usize = 16;

/// A failure reported by a Bot API client, the network stack or the remote API
///
/// Clones share the same allocation; identity (see [`ApiError::id`]) is the
/// allocation address, which is what the classifier deduplicates on.
///
/// # Examples
///
/// ```
/// use botguard::error::ApiError;
///
/// let inner = ApiError::new("read ECONNRESET").with_code("ECONNRESET");
/// let outer = ApiError::new("request to api.telegram.org failed").with_cause(inner);
///
/// assert_eq!(outer.cause().and_then(|c| c.code()), Some("ECONNRESET"));
/// ```
#[derive(Clone)]
pub struct ApiError {
    inner: Arc<Inner>,
}

struct Inner {
    name: Option<String>,
    message: String,
    code: Option<String>,
    errno: Option<String>,
    retry_after_secs: Option<f64>,
    body: Option<Value>,
    errors: Vec<ApiError>,
    cause: OnceLock<ApiError>,
    reason: OnceLock<ApiError>,
    wrapped: OnceLock<ApiError>,
}

/// Returned when a link that can only be attached once is already set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} is already attached")]
pub struct LinkAlreadySet(pub &'static str);

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::from_inner(Inner {
            name: None,
            message: message.into(),
            code: None,
            errno: None,
            retry_after_secs: None,
            body: None,
            errors: Vec::new(),
            cause: OnceLock::new(),
            reason: OnceLock::new(),
            wrapped: OnceLock::new(),
        })
    }

    /// Discord-style rate limit error carrying the mandated wait in seconds
    pub fn rate_limited(message: impl Into<String>, retry_after_secs: f64) -> Self {
        Self::new(message)
            .with_name(RATE_LIMIT_ERROR_NAME)
            .with_retry_after_secs(retry_after_secs)
    }

    /// Error value collecting several underlying failures
    pub fn aggregate(message: impl Into<String>, errors: Vec<ApiError>) -> Self {
        Self::new(message).with_name("AggregateError").with_errors(errors)
    }

    fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    // Builders normally run before the value is shared. A shared value is
    // copied instead, so other holders never observe the edit.
    fn edit(mut self, f: impl FnOnce(&mut Inner)) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => {
                f(inner);
                self
            }
            None => {
                let mut copy = self.inner.duplicate();
                f(&mut copy);
                Self::from_inner(copy)
            }
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.edit(|i| i.name = Some(name.into()))
    }

    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.edit(|i| i.code = Some(code.into()))
    }

    pub fn with_errno(self, errno: impl ToString) -> Self {
        self.edit(|i| i.errno = Some(errno.to_string()))
    }

    pub fn with_retry_after_secs(self, secs: f64) -> Self {
        self.edit(|i| i.retry_after_secs = Some(secs))
    }

    /// Attaches the JSON body of an API error response
    pub fn with_body(self, body: Value) -> Self {
        self.edit(|i| i.body = Some(body))
    }

    pub fn with_errors(self, errors: Vec<ApiError>) -> Self {
        self.edit(|i| i.errors = errors)
    }

    pub fn with_cause(self, cause: ApiError) -> Self {
        self.edit(|i| i.cause = OnceLock::from(cause))
    }

    pub fn with_reason(self, reason: ApiError) -> Self {
        self.edit(|i| i.reason = OnceLock::from(reason))
    }

    /// Sets the error an HTTP client error wraps
    pub fn with_wrapped(self, wrapped: ApiError) -> Self {
        self.edit(|i| i.wrapped = OnceLock::from(wrapped))
    }

    /// Attaches a cause to an already shared error
    ///
    /// Client libraries sometimes attach causes after the error has been
    /// created, which can produce cycles (an error that is its own cause).
    pub fn attach_cause(&self, cause: ApiError) -> Result<(), LinkAlreadySet> {
        self.inner.cause.set(cause).map_err(|_| LinkAlreadySet("cause"))
    }

    pub fn attach_reason(&self, reason: ApiError) -> Result<(), LinkAlreadySet> {
        self.inner.reason.set(reason).map_err(|_| LinkAlreadySet("reason"))
    }

    pub fn attach_wrapped(&self, wrapped: ApiError) -> Result<(), LinkAlreadySet> {
        self.inner.wrapped.set(wrapped).map_err(|_| LinkAlreadySet("wrapped"))
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    pub fn code(&self) -> Option<&str> {
        self.inner.code.as_deref()
    }

    pub fn errno(&self) -> Option<&str> {
        self.inner.errno.as_deref()
    }

    pub fn body(&self) -> Option<&Value> {
        self.inner.body.as_ref()
    }

    pub fn errors(&self) -> &[ApiError] {
        &self.inner.errors
    }

    pub fn cause(&self) -> Option<&ApiError> {
        self.inner.cause.get()
    }

    pub fn reason(&self) -> Option<&ApiError> {
        self.inner.reason.get()
    }

    pub fn wrapped(&self) -> Option<&ApiError> {
        self.inner.wrapped.get()
    }

    /// True for Discord-style rate limit errors
    pub fn is_rate_limit(&self) -> bool {
        self.name() == Some(RATE_LIMIT_ERROR_NAME) && self.inner.retry_after_secs.is_some()
    }

    /// Mandated wait of a rate limit error, in seconds
    pub fn retry_after_secs(&self) -> Option<f64> {
        self.inner.retry_after_secs
    }

    /// Identity of the underlying allocation
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// True when both values are the same error, not merely equal-looking
    pub fn same_as(&self, other: &ApiError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copies a `std::error::Error` and its source chain into an `ApiError`
    ///
    /// IO errors found anywhere in the chain contribute their system code
    /// (e.g. `ECONNRESET`) and raw OS errno.
    pub fn from_std_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::from_std_error_at(err, 0)
    }

    fn from_std_error_at(err: &(dyn std::error::Error + 'static), depth: usize) -> Self {
        let mut converted = match err.downcast_ref::<std::io::Error>() {
            Some(io) => Self::from_io(io),
            None => Self::new(err.to_string()),
        };

        if depth < MAX_SOURCE_DEPTH {
            if let Some(source) = err.source() {
                converted = converted.with_cause(Self::from_std_error_at(source, depth + 1));
            }
        }

        converted
    }

    fn from_io(err: &std::io::Error) -> Self {
        let mut converted = Self::new(err.to_string());
        if let Some(code) = io_error_code(err.kind()) {
            converted = converted.with_code(code);
        }
        if let Some(errno) = err.raw_os_error() {
            converted = converted.with_errno(errno);
        }
        converted
    }
}

impl Inner {
    fn duplicate(&self) -> Self {
        Self {
            name: self.name.clone(),
            message: self.message.clone(),
            code: self.code.clone(),
            errno: self.errno.clone(),
            retry_after_secs: self.retry_after_secs,
            body: self.body.clone(),
            errors: self.errors.clone(),
            cause: self.cause.clone(),
            reason: self.reason.clone(),
            wrapped: self.wrapped.clone(),
        }
    }
}

/// Maps socket-level IO error kinds to their conventional system code
pub fn io_error_code(kind: std::io::ErrorKind) -> Option<&'static str> {
    use std::io::ErrorKind;

    let code = match kind {
        ErrorKind::ConnectionReset => "ECONNRESET",
        ErrorKind::ConnectionRefused => "ECONNREFUSED",
        ErrorKind::ConnectionAborted => "ECONNABORTED",
        ErrorKind::BrokenPipe => "EPIPE",
        ErrorKind::TimedOut => "ETIMEDOUT",
        ErrorKind::NotConnected => "ENOTCONN",
        ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        _ => return None,
    };
    Some(code)
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.message().is_empty(), self.name()) {
            (true, Some(name)) => f.write_str(name),
            _ => f.write_str(self.message()),
        }
    }
}

// Links are printed as identities only: a cyclic cause would otherwise
// recurse forever.
impl fmt::Debug for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiError")
            .field("name", &self.inner.name)
            .field("message", &self.inner.message)
            .field("code", &self.inner.code)
            .field("errno", &self.inner.errno)
            .field("retry_after_secs", &self.inner.retry_after_secs)
            .field("body", &self.inner.body)
            .field("cause", &self.cause().map(ApiError::id))
            .field("reason", &self.reason().map(ApiError::id))
            .field("wrapped", &self.wrapped().map(ApiError::id))
            .field("errors", &self.inner.errors.len())
            .finish()
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        // A self-referencing cause would make `source()` chains endless.
        match self.cause() {
            Some(cause) if !cause.same_as(self) => Some(cause),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::from_std_error(&err)
    }
}

/// Phrases hyper and the system resolver use for failed name lookups
const DNS_FAILURE_HINTS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "no such host",
];

/// System code describing a transport failure, found anywhere in its source
/// chain
///
/// Socket-level IO errors map through [`io_error_code`]. Resolver failures
/// arrive as uncategorized IO errors and are recognised by their wording:
/// `EAI_AGAIN` for temporary resolver failures, `ENOTFOUND` otherwise.
fn transport_code(err: &(dyn std::error::Error + 'static)) -> Option<&'static str> {
    let mut dns_failure = false;
    let mut temporary = false;
    let mut current = Some(err);
    let mut depth = 0;

    while let Some(level) = current {
        if depth > MAX_SOURCE_DEPTH {
            break;
        }
        if let Some(code) = level
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io_error_code(io.kind()))
        {
            return Some(code);
        }

        let text = level.to_string().to_lowercase();
        if text.contains("temporary failure in name resolution") {
            dns_failure = true;
            temporary = true;
        }
        if DNS_FAILURE_HINTS.iter().any(|hint| text.contains(hint)) {
            dns_failure = true;
        }

        current = level.source();
        depth += 1;
    }

    match (dns_failure, temporary) {
        (true, true) => Some("EAI_AGAIN"),
        (true, false) => Some("ENOTFOUND"),
        _ => None,
    }
}

// The request URL is stripped: Telegram-style URLs embed the bot token.
impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        let name = if err.is_timeout() {
            Some("TimeoutError")
        } else if err.is_connect() {
            Some("ConnectError")
        } else if err.is_decode() {
            Some("DecodeError")
        } else {
            None
        };

        let mut converted = Self::from_std_error(&err);
        if let Some(name) = name {
            converted = converted.with_name(name);
        }
        if let Some(code) = transport_code(&err) {
            converted = converted.with_code(code);
        }
        converted
    }
}
