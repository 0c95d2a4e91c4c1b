use serde::{Deserialize, Serialize};

/// Snapshot of one publisher channel, for observability hooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelCounts {
    /// Deliveries sent to the broker and not yet resolved.
    pub in_flight: usize,
    /// Rejected deliveries parked for a backoff delay or waiting for a slot.
    pub awaiting_retry: usize,
    /// Deliveries settled as confirmed since the channel opened.
    pub confirmed: u64,
    /// Deliveries settled as failed (exhausted, abandoned, or force-failed).
    pub failed: u64,
}
