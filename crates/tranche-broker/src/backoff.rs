//! Capped exponential backoff.

use std::time::Duration;

use rand::Rng;

/// Delay schedule between submission attempts.
///
/// The delay after attempt `n` (1-based) is
/// `initial * multiplier^(n-1)`, capped at `max`. With jitter enabled a
/// random extra of up to 25% of that delay is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(5),
            multiplier: 2,
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after `attempt` without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Delay to wait after a failed `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }
        let max_extra_ms = u64::try_from(base.as_millis() / 4).unwrap_or(0);
        if max_extra_ms == 0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0..=max_extra_ms);
        base + Duration::from_millis(extra)
    }

    /// Sum of the delays before attempt `attempts` (no jitter).
    pub fn total_delay(&self, attempts: u32) -> Duration {
        (1..attempts).map(|a| self.base_delay(a)).sum()
    }
}
