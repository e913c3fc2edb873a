//! Reconnect backoff schedule.
//!
//! Delay doubles from a base up to a cap, with a small random jitter added on
//! top so that a fleet of clients does not reconnect in lockstep after a feed
//! outage. Retries are unlimited; the connection loop runs for the process
//! lifetime unless explicitly shut down.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with cap and jitter.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, attempt: 0 }
    }

    /// Deterministic delay for attempt `n` (0-based): `min(base * 2^n, max)`.
    pub fn delay_for_attempt(base: Duration, max: Duration, attempt: u32) -> Duration {
        let shift = attempt.min(63);
        let millis = (base.as_millis() as u64).saturating_mul(1u64.checked_shl(shift).unwrap_or(u64::MAX));
        Duration::from_millis(millis).min(max)
    }

    /// Delay to sleep before the next attempt, jittered by up to 25%.
    /// Advances the attempt counter.
    pub fn next(&mut self) -> Duration {
        let delay = Self::delay_for_attempt(self.base, self.max, self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        let jitter_cap = (delay.as_millis() as u64) / 4;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        delay + Duration::from_millis(jitter)
    }

    /// Reset after a successful connect so the next failure starts from the
    /// base delay again.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts consumed since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
