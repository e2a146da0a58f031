//! Reconnect delay schedule: exponential growth with a ceiling, no jitter.

use std::time::Duration;

use cp_common::RealtimeConfig;

/// Reconnect delay parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Growth factor applied after each attempt. Values below 1.0 are treated as 1.0.
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(cfg: &RealtimeConfig) -> Self {
        Self {
            initial: cfg.reconnect_initial(),
            multiplier: cfg.reconnect_multiplier,
            max: cfg.reconnect_max(),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(2000),
            multiplier: 1.5,
            max: Duration::from_millis(10_000),
        }
    }
}

/// Stateful delay generator for one connection manager.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    next: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            next: policy.initial.min(policy.max),
            policy,
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt; grows the one after it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        let factor = if self.policy.multiplier.is_finite() && self.policy.multiplier > 1.0 {
            self.policy.multiplier
        } else {
            1.0
        };
        self.next = delay.mul_f64(factor).min(self.policy.max);
        self.attempt += 1;
        delay
    }

    /// Attempts scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.next = self.policy.initial.min(self.policy.max);
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(d: Duration) -> u128 {
        d.as_millis()
    }

    #[test]
    fn test_default_schedule_is_capped() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        let delays: Vec<u128> = (0..7).map(|_| ms(backoff.next_delay())).collect();
        assert_eq!(delays, vec![2000, 3000, 4500, 6750, 10_000, 10_000, 10_000]);
        assert_eq!(backoff.attempt(), 7);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(ms(backoff.next_delay()), 2000);
    }

    #[test]
    fn test_degenerate_multiplier_keeps_delay_flat() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            initial: Duration::from_millis(500),
            multiplier: f64::NAN,
            max: Duration::from_secs(5),
        });
        assert_eq!(ms(backoff.next_delay()), 500);
        assert_eq!(ms(backoff.next_delay()), 500);
    }

    #[test]
    fn test_initial_above_max_is_clamped() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            initial: Duration::from_secs(30),
            multiplier: 2.0,
            max: Duration::from_secs(10),
        });
        assert_eq!(ms(backoff.next_delay()), 10_000);
    }
}
