//! Exponential backoff with multiplicative jitter
//!
//! The delay before retry number `n` (0-based attempt index) is
//!
//! ```text
//! raw   = min(base * 2^n, max)
//! delay = floor(raw * (1 + (U - 0.5) * 2 * jitter)),  U uniform in [0, 1)
//! ```
//!
//! so a jitter of `0.1` spreads delays over ±10% of the capped exponential
//! value, and a jitter of `0` is fully deterministic.

use rand::Rng;

use crate::config::RetryConfig;

/// Largest exponent applied to the base delay. `2^52` already exceeds any
/// sensible `max_delay_ms`, and keeps the `f64` computation exact.
const MAX_EXPONENT: u32 = 52;

/// Computes a jittered backoff delay in milliseconds using the thread-local RNG
///
/// # Examples
///
/// ```
/// use botguard::backoff::compute_delay;
///
/// assert_eq!(compute_delay(400, 0, 30_000, 0.0), 400);
/// assert_eq!(compute_delay(400, 2, 30_000, 0.0), 1_600);
/// assert_eq!(compute_delay(400, 10, 30_000, 0.0), 30_000);
/// ```
pub fn compute_delay(base_delay_ms: u64, attempt_index: u32, max_delay_ms: u64, jitter: f64) -> u64 {
    compute_delay_with_rng(
        base_delay_ms,
        attempt_index,
        max_delay_ms,
        jitter,
        &mut rand::thread_rng(),
    )
}

/// Same as [`compute_delay`] with a caller-supplied random source
pub fn compute_delay_with_rng<R: Rng + ?Sized>(
    base_delay_ms: u64,
    attempt_index: u32,
    max_delay_ms: u64,
    jitter: f64,
    rng: &mut R,
) -> u64 {
    let raw = capped_exponential(base_delay_ms, attempt_index, max_delay_ms);
    let jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };

    if jitter == 0.0 || raw == 0.0 {
        return raw as u64;
    }

    let unit: f64 = rng.gen();
    let factor = 1.0 + (unit - 0.5) * 2.0 * jitter;

    (raw * factor).floor().max(0.0) as u64
}

fn capped_exponential(base_delay_ms: u64, attempt_index: u32, max_delay_ms: u64) -> f64 {
    let exponent = attempt_index.min(MAX_EXPONENT) as i32;
    let raw = base_delay_ms as f64 * 2f64.powi(exponent);
    raw.min(max_delay_ms as f64)
}

impl RetryConfig {
    /// Backoff delay before the retry that follows failed attempt
    /// `attempt_index + 1`
    pub fn delay_for_attempt(&self, attempt_index: u32) -> u64 {
        compute_delay(self.min_delay_ms, attempt_index, self.max_delay_ms, self.jitter)
    }
}
