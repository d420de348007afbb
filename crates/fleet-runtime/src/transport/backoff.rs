//! Bounded exponential reconnect backoff

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter, capped at `max`.
///
/// Each failed attempt doubles the base delay; the returned delay is the base
/// plus up to 20% random jitter, never exceeding `max`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: 2.0,
            attempt: 0,
        }
    }

    /// Failed attempts since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before attempt `attempt` (1-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max.as_secs_f64()))
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let base = self.base_delay(self.attempt);
        let jitter = rand::thread_rng().gen_range(0.0..=0.2) * base.as_secs_f64();
        (base + Duration::from_secs_f64(jitter)).min(self.max)
    }

    /// Connection re-established
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
