//! Retry policy for collector requests

use std::time::Duration;

/// How often, and how fast, a failed request is sent again
///
/// Only failures that may go away on their own are retried: requests that
/// never got a response, and 5xx answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Send every request exactly once
    #[default]
    None,
    /// Retry up to the given number of attempts without waiting
    Immediate(u32),
    /// Retry up to the given number of attempts, waiting `attempt * delay_ms`
    LinearBackoff(u32, u64),
}

impl RetryStrategy {
    /// Total number of attempts allowed, including the first one
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryStrategy::None => 1,
            RetryStrategy::Immediate(attempts) | RetryStrategy::LinearBackoff(attempts, _) => {
                (*attempts).max(1)
            }
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::None | RetryStrategy::Immediate(_) => Duration::ZERO,
            RetryStrategy::LinearBackoff(_, delay_ms) => {
                Duration::from_millis(delay_ms.saturating_mul(u64::from(attempt)))
            }
        }
    }
}
