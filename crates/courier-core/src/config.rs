//! Recognized configuration options for a publisher channel.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for one publisher + confirm listener pair.
///
/// The platform's config loader hands this struct over as a plain
/// deserialized section; unknown options are the loader's problem, defaults
/// here keep a bare section usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmConfig {
    /// Upper bound on concurrently unconfirmed deliveries. Publishes beyond
    /// this wait for a slot (see `admission_timeout`).
    pub max_in_flight: usize,

    /// Total attempts per logical message, the initial send included.
    /// Values below 1 are treated as 1.
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,

    /// Cap on the exponential backoff.
    pub max_delay: Duration,

    /// How long a publish may wait for an in-flight slot before failing
    /// with `BackpressureTimeout`.
    pub admission_timeout: Duration,

    /// How long `CompletionHandle::await_confirm` waits for a verdict.
    pub confirm_timeout: Duration,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 256,
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            admission_timeout: Duration::from_secs(5),
            confirm_timeout: Duration::from_secs(30),
        }
    }
}

impl ConfirmConfig {
    /// Effective attempt budget (clamps the degenerate `max_attempts: 0`).
    pub fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let cfg = ConfirmConfig::default();
        assert!(cfg.max_in_flight > 0);
        assert!(cfg.max_attempts >= 1);
        assert!(cfg.base_delay < cfg.max_delay);
    }

    #[test]
    fn zero_max_attempts_clamps_to_one() {
        let cfg = ConfirmConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(cfg.attempt_budget(), 1);
    }

    #[test]
    fn partial_section_fills_defaults() {
        let cfg: ConfirmConfig = serde_json::from_value(serde_json::json!({
            "max_in_flight": 8,
            "base_delay": { "secs": 1, "nanos": 0 },
        }))
        .unwrap();

        assert_eq!(cfg.max_in_flight, 8);
        assert_eq!(cfg.base_delay, Duration::from_secs(1));
        assert_eq!(cfg.max_attempts, ConfirmConfig::default().max_attempts);
    }
}
