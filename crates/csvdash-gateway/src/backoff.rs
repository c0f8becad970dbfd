use std::time::Duration;

/// Exponential reconnect schedule: `initial * 2^(attempt-1)`, capped at
/// `max_delay`, given up after `max_retries` consecutive failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_retries: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another attempt may be scheduled after `retries` attempts.
    pub fn allows(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    /// The full delay schedule, one entry per permitted attempt.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).map(|attempt| self.next_delay(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_one_second() {
        let delays: Vec<u64> = ReconnectPolicy::default()
            .schedule()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn delay_is_capped() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_retries: 10,
        };
        assert_eq!(policy.next_delay(5), Duration::from_millis(16_000));
        assert_eq!(policy.next_delay(6), Duration::from_millis(30_000));
        assert_eq!(policy.next_delay(10), Duration::from_millis(30_000));
    }

    #[test]
    fn huge_attempts_do_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.next_delay(u32::MAX), policy.max_delay);
        assert_eq!(policy.next_delay(0), policy.initial_delay);
    }

    #[test]
    fn retries_are_bounded() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(0));
        assert!(policy.allows(4));
        assert!(!policy.allows(5));
    }
}
