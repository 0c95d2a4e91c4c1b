//! Retry policy: decides backoff delays for rejected deliveries.

use std::time::Duration;

use crate::config::ConfirmConfig;

/// Exponential backoff with a cap and multiplicative jitter.
///
/// Jitter matters here: a connection-closed event rejects every in-flight
/// delivery at once, and without it they would all come back in one wave.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier per attempt.
    pub multiplier: f64,

    /// Upper bound on the computed delay.
    pub max_delay: Duration,

    /// Fraction (0.0..=1.0) by which a delay may be randomly shortened.
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ConfirmConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            multiplier: 2.0,
            max_delay: config.max_delay,
            jitter: 0.1,
        }
    }

    /// Delay before resubmitting after attempt number `attempt` failed
    /// (0-indexed: the initial send is attempt 0).
    ///
    /// delay = min(base_delay * multiplier^attempt, max_delay), then
    /// shortened by up to `jitter`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(63) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jittered = if self.jitter > 0.0 {
            capped * (1.0 - self.jitter * rand::random::<f64>())
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}
