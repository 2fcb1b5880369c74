//! # Retry Policy
//!
//! Bounded exponential backoff for notification delivery.
//!
//! The first attempt is immediate. Before attempt `k` (k >= 2) the dispatcher
//! waits `min(base_delay * 2^(k-2), max_delay)`:
//!
//! | Attempt | Delay (base 1s, cap 30s) |
//! |---------|--------------------------|
//! | 1       | 0                        |
//! | 2       | 1s                       |
//! | 3       | 2s                       |
//! | 4       | 4s                       |
//! | 7       | 30s (capped)             |

use std::time::Duration;

/// Largest shift applied to the base delay; anything beyond is capped anyway.
const MAX_BACKOFF_SHIFT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts. `0` disables delivery entirely.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before the given 1-based attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use fpv_power_monitor::alert::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_before(1), Duration::ZERO);
    /// assert_eq!(policy.delay_before(3), Duration::from_secs(2));
    /// ```
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let shift = (attempt - 2).min(MAX_BACKOFF_SHIFT);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Sum of all backoff delays if every attempt fails
    pub fn worst_case_backoff(&self) -> Duration {
        (1..=self.max_attempts).map(|a| self.delay_before(a)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_until_cap() {
        let policy = RetryPolicy {
            max_attempts: 8,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };
        let delays: Vec<u64> = (1..=8).map(|a| policy.delay_before(a).as_secs()).collect();
        assert_eq!(delays, vec![0, 1, 2, 4, 8, 10, 10, 10]);
    }

    #[test]
    fn test_large_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(u32::MAX), policy.max_delay);
        assert_eq!(policy.delay_before(64), policy.max_delay);
    }

    #[test]
    fn test_worst_case_backoff() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        // 0 + 100 + 200 + 400
        assert_eq!(policy.worst_case_backoff(), Duration::from_millis(700));
    }

    #[test]
    fn test_zero_attempts_has_no_backoff() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.worst_case_backoff(), Duration::ZERO);
    }
}
