/*
[INPUT]:  Consecutive reconnect attempt number
[OUTPUT]: Delay before the attempt, or None once the ceiling is passed
[POS]:    WebSocket layer - reconnect pacing
[UPDATE]: When changing backoff growth, ceiling or jitter
*/

use std::time::Duration;

use rand::Rng;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Exponential reconnect backoff with a bounded number of attempts.
///
/// Attempt `n` (1-indexed) waits `base_delay * 2^(n-1)`. Growth is not capped,
/// only the number of attempts is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
    /// Upper bound of a uniform random extra delay; zero disables jitter
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: Duration::ZERO,
        }
    }
}

impl ReconnectPolicy {
    /// Deterministic part of the delay for `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.checked_mul(factor).unwrap_or(Duration::MAX))
    }

    /// Delay for `attempt` including jitter.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        let delay = self.delay_for(attempt)?;
        if self.jitter.is_zero() {
            return Some(delay);
        }

        let max_extra = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = rand::thread_rng().gen_range(0..=max_extra);
        Some(delay.saturating_add(Duration::from_millis(extra)))
    }
}
