//! # Retry policy for service commands.
//!
//! [`RetryPolicy`] controls how the delay between failed `install`/`uninstall`
//! attempts grows. Since those operations are retried indefinitely, the delay
//! is capped, and jitter can be enabled to keep a fleet of supervisors from
//! hammering a package source in lockstep.

use std::time::Duration;

use rand::Rng;

/// Delay schedule between service command attempts.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomize each delay within `[delay/2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// Returns a policy with `first = 1s`, `max = 30s`, `factor = 2.0` and
    /// jitter enabled.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Computes the next delay from the previous one.
    ///
    /// - `None` yields `first`, clamped to `max`.
    /// - Otherwise the previous delay is multiplied by `factor` and capped at
    ///   `max`; a non-finite product collapses to `max`.
    pub fn next(&self, prev: Option<Duration>) -> Duration {
        let grown = match prev {
            None => self.first,
            Some(delay) => {
                let secs = delay.as_secs_f64() * self.factor;
                if secs.is_finite() {
                    delay.mul_f64(self.factor)
                } else {
                    self.max
                }
            }
        };
        let capped = grown.min(self.max);
        if self.jitter && !capped.is_zero() {
            let half = capped / 2;
            half + rand::thread_rng().gen_range(Duration::ZERO..=half)
        } else {
            capped
        }
    }
}
