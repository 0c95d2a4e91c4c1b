//! Delivery record: message + confirm bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::DeliveryState;
use crate::error::PublishError;

/// What the caller gets back on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Sequence number of the attempt the broker accepted.
    pub sequence: u64,
    /// How many sends it took, the initial one included.
    pub attempts: u32,
}

/// Caller-visible settlement verdict.
pub(crate) type SettleResult = Result<Confirmation, PublishError>;

/// One message bound for the broker. Opaque to the confirm machinery except
/// for the payload size (frame-limit and backpressure accounting).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub payload: Vec<u8>,
    pub routing_key: String,
    pub headers: Option<serde_json::Value>,
}

/// Per-publish options. Currently just headers; kept as a struct so new
/// options don't ripple through every call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOptions {
    pub headers: Option<serde_json::Value>,
}

/// Metadata + message for one outstanding delivery.
///
/// Design:
/// - Lives in the pending set exactly while `state == Pending`.
/// - `slot` is the caller's completion channel; settling consumes it, so a
///   record can never report two verdicts.
/// - A resubmission gets a fresh record under a new sequence; the old one
///   is consumed, never recycled.
#[derive(Debug)]
pub struct DeliveryRecord {
    pub sequence: u64,
    pub message: Message,
    pub enqueued_at: DateTime<Utc>,

    /// 0 for the initial send, incremented per resubmission.
    pub attempt: u32,

    pub state: DeliveryState,

    pub(crate) slot: Option<oneshot::Sender<SettleResult>>,
}

impl DeliveryRecord {
    pub(crate) fn new(
        sequence: u64,
        message: Message,
        attempt: u32,
        slot: Option<oneshot::Sender<SettleResult>>,
    ) -> Self {
        Self {
            sequence,
            message,
            enqueued_at: Utc::now(),
            attempt,
            state: DeliveryState::Pending,
            slot,
        }
    }

    /// True when nobody is waiting for the verdict anymore (handle dropped
    /// or cancelled). The broker exchange still runs to completion.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.slot.as_ref().is_none_or(|slot| slot.is_closed())
    }

    /// Settle as confirmed. A missing observer is fine; the verdict just
    /// goes unseen.
    pub(crate) fn settle_confirmed(mut self) {
        self.state = DeliveryState::Confirmed;
        let confirmation = Confirmation {
            sequence: self.sequence,
            attempts: self.attempt + 1,
        };
        if let Some(slot) = self.slot.take() {
            let _ = slot.send(Ok(confirmation));
        }
    }

    /// Settle as terminally failed.
    pub(crate) fn settle_failed(mut self, error: PublishError) {
        self.state = DeliveryState::Failed;
        if let Some(slot) = self.slot.take() {
            let _ = slot.send(Err(error));
        }
    }
}
