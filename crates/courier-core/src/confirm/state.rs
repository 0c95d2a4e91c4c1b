//! Delivery state machine.

use serde::{Deserialize, Serialize};

/// State of one outstanding delivery.
///
/// State transitions:
/// - Pending -> Confirmed (broker ack)
/// - Pending -> Rejected -> Pending (resubmitted under a new sequence)
/// - Pending -> Rejected -> Failed (attempt budget exhausted)
///
/// Design note: Rejected is a transit state owned by the retry controller;
/// a record never sits in the pending set while Rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Sent (or about to be sent) and awaiting a broker verdict.
    Pending,

    /// Durably accepted by the broker.
    Confirmed,

    /// Declined by the broker or lost with the connection; eligible for
    /// resubmission.
    Rejected,

    /// Given up permanently.
    Failed,
}

impl DeliveryState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryState::Confirmed | DeliveryState::Failed)
    }
}
