use std::time::Duration;

/// Bounded retry for upstream rate limiting (HTTP 429).
///
/// Kept separate from the HTTP client so the schedule can be checked without
/// a network: `next_delay` is a pure function of the attempt number and the
/// provider's `Retry-After` hint.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Wait used when the provider sends no usable `Retry-After`.
    pub default_retry_after: Duration,
    /// First step of the exponential schedule.
    pub backoff_base: Duration,
    /// Ceiling for the exponential schedule. Never applied to the provider hint.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_retry_after: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, default_retry_after: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_retry_after,
            ..Self::default()
        }
    }

    /// How long to wait after `attempt` (1-based) was rate limited, or `None`
    /// when no attempts remain.
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let hint = retry_after.unwrap_or(self.default_retry_after);
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        Some(hint.max(backoff))
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .map(str::trim)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
