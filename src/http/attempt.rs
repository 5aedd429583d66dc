//! Per-attempt evaluation shared by the async and blocking transports.
//!
//! Both transports send a request, hand the result to [`evaluate`] and act
//! on the returned [`AttemptOutcome`]. Keeping the decision here means the
//! two execution modes cannot drift apart.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use super::response::RawResponse;
use crate::error::Error;
use crate::retry::{Failure, RetryConfig, compute_delay, should_retry};

/// What caused a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryCause {
    /// The server answered with a retryable status.
    Status(u16),
    /// The attempt timed out.
    Timeout,
    /// The connection failed.
    Connection(String),
}

impl fmt::Display for RetryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP {status}"),
            Self::Timeout => f.write_str("timeout"),
            Self::Connection(message) => write!(f, "connection error: {message}"),
        }
    }
}

/// Result of evaluating one attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The response is a success; return it.
    Success(RawResponse),
    /// The failure is retryable; wait `delay` and try again.
    Retry {
        /// What went wrong.
        cause: RetryCause,
        /// Wait before the next attempt, server hint already applied.
        delay: Duration,
    },
    /// Give up and return this error.
    Terminal(Error),
}

/// Decides what to do with the result of attempt `attempt` (0-based).
#[must_use]
pub fn evaluate(
    attempt: u32,
    config: &RetryConfig,
    result: Result<RawResponse, Error>,
) -> AttemptOutcome {
    match result {
        Ok(response) if response.is_success() => AttemptOutcome::Success(response),
        Ok(response) => {
            let status = response.status();
            if should_retry(attempt, config, Failure::Status(status)) {
                AttemptOutcome::Retry {
                    cause: RetryCause::Status(status),
                    delay: compute_delay(attempt, config, response.retry_after()),
                }
            } else {
                AttemptOutcome::Terminal(response.into_api_error().into())
            }
        }
        Err(error) => {
            let failure = Failure::classify(&error);
            if !should_retry(attempt, config, failure) {
                return AttemptOutcome::Terminal(error);
            }
            let cause = match &error {
                Error::Timeout { .. } => RetryCause::Timeout,
                other => RetryCause::Connection(other.to_string()),
            };
            AttemptOutcome::Retry {
                cause,
                delay: compute_delay(attempt, config, None),
            }
        }
    }
}

/// Emits the single diagnostic line for a retry.
pub(crate) fn log_retry(loud: bool, attempt: u32, max_retries: u32, delay: Duration, cause: &RetryCause) {
    let retry = attempt + 1;
    let delay_ms = delay.as_millis();
    if loud {
        warn!(retry, max_retries, delay_ms, %cause, "retrying request");
    } else {
        debug!(retry, max_retries, delay_ms, %cause, "retrying request");
    }
}

/// Error returned if the attempt loop ends without an outcome.
pub(crate) fn exhausted() -> Error {
    Error::connection("request failed without a response after all retries", false)
}
