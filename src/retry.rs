//! Retry policy with exponential backoff for transient request failures.
//!
//! This module provides [`RetryConfig`], the [`Failure`] classification and
//! two pure functions the transports drive their retry loop with:
//!
//! - [`should_retry`] decides whether a failed attempt gets another try
//! - [`compute_delay`] decides how long to wait before that try
//!
//! Neither function holds state; the same config can be shared freely
//! across concurrent requests.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use docutray::retry::{Failure, RetryConfig, compute_delay, should_retry};
//!
//! let config = RetryConfig::default();
//! let failure = Failure::Status(503);
//!
//! if should_retry(0, &config, failure) {
//!     let delay = compute_delay(0, &config, None);
//!     assert!(delay >= Duration::from_millis(500));
//! }
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::error::Error;

/// Default retry budget (additional attempts after the first).
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay before the first retry (500ms).
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Default maximum delay cap (8 seconds).
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

/// Default backoff multiplier (doubles each attempt).
pub const EXPONENTIAL_BASE: f64 = 2.0;

/// Default lower jitter bound, as a fraction of the delay.
pub const JITTER_MIN: f64 = 0.25;

/// Default upper jitter bound, as a fraction of the delay.
pub const JITTER_MAX: f64 = 0.5;

/// Status codes retried by default.
pub const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
pub(crate) const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 2
/// - `initial_delay`: 500ms
/// - `max_delay`: 8 seconds
/// - `exponential_base`: 2.0
/// - `jitter_min` / `jitter_max`: 0.25 / 0.5
/// - `retryable_status_codes`: 429, 500, 502, 503, 504
///
/// # Delay Calculation
///
/// ```text
/// base  = min(initial_delay * exponential_base^attempt, max_delay)
/// delay = base + base * uniform(jitter_min, jitter_max)
/// ```
///
/// Values are immutable; `with_*` methods return a modified copy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    exponential_base: f64,
    jitter_min: f64,
    jitter_max: f64,
    retryable_status_codes: BTreeSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: INITIAL_RETRY_DELAY,
            max_delay: MAX_RETRY_DELAY,
            exponential_base: EXPONENTIAL_BASE,
            jitter_min: JITTER_MIN,
            jitter_max: JITTER_MAX,
            retryable_status_codes: RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl RetryConfig {
    /// Starts a builder seeded with the defaults.
    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder {
            config: Self::default(),
        }
    }

    /// Returns a copy with a different retry budget.
    #[must_use]
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self.clone()
        }
    }

    /// Maximum number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the first retry.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound on the backoff before jitter.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor between consecutive delays.
    #[must_use]
    pub fn exponential_base(&self) -> f64 {
        self.exponential_base
    }

    /// Jitter bounds as fractions of the delay.
    #[must_use]
    pub fn jitter(&self) -> (f64, f64) {
        (self.jitter_min, self.jitter_max)
    }

    /// Status codes that trigger a retry.
    #[must_use]
    pub fn retryable_status_codes(&self) -> &BTreeSet<u16> {
        &self.retryable_status_codes
    }

    /// Checks the invariants a config must hold before a transport uses it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRetry`] naming the first broken invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::InvalidRetry {
                reason: reason.to_string(),
            })
        };

        if self.initial_delay.is_zero() {
            return invalid("initial_delay must be greater than zero");
        }
        if self.max_delay < self.initial_delay {
            return invalid("max_delay must be at least initial_delay");
        }
        if !(self.exponential_base.is_finite() && self.exponential_base > 1.0) {
            return invalid("exponential_base must be greater than 1");
        }
        let in_unit = |value: f64| (0.0..=1.0).contains(&value);
        if !in_unit(self.jitter_min) || !in_unit(self.jitter_max) {
            return invalid("jitter bounds must be within [0, 1]");
        }
        if self.jitter_min > self.jitter_max {
            return invalid("jitter_min must not exceed jitter_max");
        }
        Ok(())
    }
}

/// Builder for [`RetryConfig`] that validates on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Sets the retry budget.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub fn exponential_base(mut self, base: f64) -> Self {
        self.config.exponential_base = base;
        self
    }

    /// Sets the jitter bounds; `(0.0, 0.0)` disables jitter.
    #[must_use]
    pub fn jitter(mut self, min: f64, max: f64) -> Self {
        self.config.jitter_min = min;
        self.config.jitter_max = max;
        self
    }

    /// Replaces the set of retryable status codes.
    #[must_use]
    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.config.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Validates and returns the config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRetry`] if an invariant is broken.
    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// What went wrong with an attempt, as far as the retry decision cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Connection-level failure carrying its own retry flag.
    Connection {
        /// False for failures that cannot heal (TLS, malformed request).
        retryable: bool,
    },

    /// The attempt timed out.
    Timeout,

    /// The server answered with this non-success status.
    Status(u16),

    /// Anything else (decode failures, configuration problems).
    Other,
}

impl Failure {
    /// Classifies an error for the retry decision.
    #[must_use]
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::Connection { retryable, .. } => Self::Connection {
                retryable: *retryable,
            },
            Error::Timeout { .. } => Self::Timeout,
            Error::Api(api) => Self::Status(api.status()),
            _ => Self::Other,
        }
    }
}

/// Decides whether a failed attempt should be retried.
///
/// `attempt` is 0-based: the first attempt is 0. Once `attempt` reaches
/// `max_retries` the answer is always `false`.
///
/// Connection failures answer with their own flag, independently of the
/// status-code table; timeouts are always retryable within the budget.
#[must_use]
pub fn should_retry(attempt: u32, config: &RetryConfig, failure: Failure) -> bool {
    if attempt >= config.max_retries {
        return false;
    }

    match failure {
        Failure::Connection { retryable } => retryable,
        Failure::Timeout => true,
        Failure::Status(status) => config.retryable_status_codes.contains(&status),
        Failure::Other => false,
    }
}

/// Computes the wait before the retry that follows `attempt`.
///
/// A server hint (from `Retry-After`) replaces the computed delay only when
/// it is longer.
#[must_use]
pub fn compute_delay(attempt: u32, config: &RetryConfig, server_hint: Option<Duration>) -> Duration {
    compute_delay_with_rng(attempt, config, server_hint, &mut rand::thread_rng())
}

/// [`compute_delay`] with a caller-provided random source.
#[must_use]
pub fn compute_delay_with_rng<R: Rng + ?Sized>(
    attempt: u32,
    config: &RetryConfig,
    server_hint: Option<Duration>,
    rng: &mut R,
) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let max_secs = config.max_delay.as_secs_f64();
    let raw_secs = config.initial_delay.as_secs_f64() * config.exponential_base.powi(exponent);
    let base_secs = if raw_secs.is_finite() {
        raw_secs.min(max_secs)
    } else {
        max_secs
    };

    let factor = if config.jitter_max > config.jitter_min {
        rng.gen_range(config.jitter_min..=config.jitter_max)
    } else {
        config.jitter_min
    };
    let delay = Duration::from_secs_f64(base_secs + base_secs * factor);

    match server_hint {
        Some(hint) if hint > delay => {
            debug!(
                hint_ms = hint.as_millis(),
                computed_ms = delay.as_millis(),
                "server hint exceeds computed backoff"
            );
            hint
        }
        _ => delay,
    }
}

/// Parses a `Retry-After` header value into a delay.
///
/// Accepts delay-seconds (integer or fractional) and RFC 7231 HTTP-dates.
/// Negative or unparseable values yield `None`; dates in the past yield zero;
/// anything beyond one hour is capped.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    // Try parsing as seconds first (most common)
    if let Ok(seconds) = header_value.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            debug!(header_value, "negative or non-finite Retry-After value, ignoring");
            return None;
        }

        let duration = Duration::from_secs_f64(seconds.min(MAX_RETRY_AFTER.as_secs_f64()));
        if seconds > MAX_RETRY_AFTER.as_secs_f64() {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
        }
        return Some(duration);
    }

    // Try parsing as HTTP-date
    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        if let Ok(duration) = datetime.duration_since(now) {
            if duration > MAX_RETRY_AFTER {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                return Some(MAX_RETRY_AFTER);
            }
            Some(duration)
        } else {
            debug!(header_value, "Retry-After date is in the past, returning zero");
            Some(Duration::ZERO)
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn no_jitter(initial: Duration, max: Duration) -> RetryConfig {
        RetryConfig::builder()
            .initial_delay(initial)
            .max_delay(max)
            .exponential_base(2.0)
            .jitter(0.0, 0.0)
            .build()
            .unwrap()
    }

    // ==================== RetryConfig Tests ====================

    #[test]
    fn test_retry_config_default_values() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries(), 2);
        assert_eq!(config.initial_delay(), Duration::from_millis(500));
        assert_eq!(config.max_delay(), Duration::from_secs(8));
        assert!((config.exponential_base() - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.jitter(), (0.25, 0.5));
        let codes: Vec<u16> = config.retryable_status_codes().iter().copied().collect();
        assert_eq!(codes, vec![429, 500, 502, 503, 504]);
    }

    #[test]
    fn test_with_max_retries_copies_other_fields() {
        let original = RetryConfig::default();
        let derived = original.with_max_retries(5);
        assert_eq!(derived.max_retries(), 5);
        assert_eq!(original.max_retries(), 2);
        assert_eq!(derived.initial_delay(), original.initial_delay());
        assert_eq!(derived.retryable_status_codes(), original.retryable_status_codes());
    }

    #[test]
    fn test_builder_rejects_broken_invariants() {
        let zero_initial = RetryConfig::builder().initial_delay(Duration::ZERO).build();
        assert!(matches!(zero_initial, Err(ConfigError::InvalidRetry { .. })));

        let max_below_initial = RetryConfig::builder()
            .initial_delay(Duration::from_secs(2))
            .max_delay(Duration::from_secs(1))
            .build();
        assert!(max_below_initial.is_err());

        let flat_base = RetryConfig::builder().exponential_base(1.0).build();
        assert!(flat_base.is_err());

        let jitter_out_of_range = RetryConfig::builder().jitter(0.0, 1.5).build();
        assert!(jitter_out_of_range.is_err());

        let jitter_inverted = RetryConfig::builder().jitter(0.6, 0.4).build();
        assert!(jitter_inverted.is_err());
    }

    #[test]
    fn test_builder_accepts_disabled_jitter() {
        let config = RetryConfig::builder().jitter(0.0, 0.0).build().unwrap();
        assert_eq!(config.jitter(), (0.0, 0.0));
    }

    // ==================== Delay Calculation Tests ====================

    #[test]
    fn test_delay_grows_exponentially_without_jitter() {
        let config = no_jitter(Duration::from_millis(500), Duration::from_secs(8));
        let delays: Vec<f64> = (0..4)
            .map(|attempt| compute_delay(attempt, &config, None).as_secs_f64())
            .collect();
        assert_eq!(delays, vec![0.5, 1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_delay_respects_max_delay() {
        let config = no_jitter(Duration::from_millis(500), Duration::from_secs(2));
        assert_eq!(compute_delay(3, &config, None), Duration::from_secs(2));
    }

    #[test]
    fn test_delay_huge_attempt_stays_capped() {
        let config = no_jitter(Duration::from_millis(500), Duration::from_secs(2));
        assert_eq!(compute_delay(u32::MAX, &config, None), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let config = RetryConfig::default();
        // Test 100 samples to verify bounds: base 0.5s, jitter 25%-50%
        for _ in 0..100 {
            let delay = compute_delay(0, &config, None);
            assert!(delay >= Duration::from_millis(625), "delay {delay:?} below bound");
            assert!(delay <= Duration::from_millis(750), "delay {delay:?} above bound");
        }
    }

    #[test]
    fn test_server_hint_longer_than_backoff_wins() {
        let config = no_jitter(Duration::from_millis(500), Duration::from_secs(8));
        assert_eq!(
            compute_delay(0, &config, Some(Duration::from_secs(10))),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_server_hint_shorter_than_backoff_ignored() {
        let config = no_jitter(Duration::from_millis(500), Duration::from_secs(8));
        assert_eq!(
            compute_delay(0, &config, Some(Duration::from_millis(100))),
            Duration::from_millis(500)
        );
    }

    // ==================== Should Retry Decision Tests ====================

    #[test]
    fn test_should_retry_budget_boundary() {
        let config = RetryConfig::default();
        let failures = [
            Failure::Status(500),
            Failure::Timeout,
            Failure::Connection { retryable: true },
        ];
        for failure in failures {
            assert!(!should_retry(2, &config, failure), "{failure:?} at budget");
            assert!(!should_retry(3, &config, failure), "{failure:?} past budget");
        }
        assert!(should_retry(1, &config, Failure::Status(500)));
    }

    #[test]
    fn test_should_retry_zero_budget_never_retries() {
        let config = RetryConfig::default().with_max_retries(0);
        assert!(!should_retry(0, &config, Failure::Status(503)));
        assert!(!should_retry(0, &config, Failure::Timeout));
    }

    #[test]
    fn test_retryable_status_codes() {
        let config = RetryConfig::default();
        for status in [429, 500, 502, 503, 504] {
            assert!(should_retry(0, &config, Failure::Status(status)), "{status}");
        }
        for status in [400, 401, 403, 404, 409, 422, 501] {
            assert!(!should_retry(0, &config, Failure::Status(status)), "{status}");
        }
    }

    #[test]
    fn test_connection_error_respects_own_flag() {
        let config = RetryConfig::default().with_max_retries(10);
        assert!(should_retry(0, &config, Failure::Connection { retryable: true }));
        assert!(!should_retry(0, &config, Failure::Connection { retryable: false }));
    }

    #[test]
    fn test_timeout_is_retryable() {
        let config = RetryConfig::default();
        assert!(should_retry(0, &config, Failure::Timeout));
    }

    #[test]
    fn test_other_failures_not_retried() {
        let config = RetryConfig::default();
        assert!(!should_retry(0, &config, Failure::Other));
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_classify_errors() {
        assert_eq!(
            Failure::classify(&Error::connection("reset", true)),
            Failure::Connection { retryable: true }
        );
        assert_eq!(Failure::classify(&Error::timeout("slow")), Failure::Timeout);
        assert_eq!(
            Failure::classify(&Error::NoMorePages { page: 1, total: 0 }),
            Failure::Other
        );
    }

    // ==================== Retry-After Parsing Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_fractional_seconds() {
        assert_eq!(parse_retry_after("0.25"), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_parse_retry_after_negative_and_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("invalid"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("999999"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_http_date() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }
}
