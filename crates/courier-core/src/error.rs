//! Error taxonomy for the publish-confirm layer.

use thiserror::Error;

/// Connection-level failures reported by a transport.
///
/// These are never surfaced to publish callers directly: the confirm
/// listener turns them into per-delivery rejections and drives the retry
/// policy, so only exhaustion becomes visible as [`PublishError::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("frame write failed: {0}")]
    SendFailed(String),
}

/// Terminal outcome of a publish, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The broker declined the delivery while a drain was in progress, so
    /// no retry was attempted.
    #[error("broker rejected delivery: {0}")]
    Rejected(String),

    /// Retries exhausted. `attempts` counts every send, including the first.
    #[error("delivery failed after {attempts} attempts: {last_reason}")]
    Failed { last_reason: String, attempts: u32 },

    /// No publish slot became available within the admission timeout.
    /// Nothing was sent; the caller may slow down and try again.
    #[error("publish admission timed out under backpressure")]
    BackpressureTimeout,

    /// Payload exceeds the transport's negotiated frame limit. Nothing was
    /// sent; this is not retryable.
    #[error("payload of {size} bytes exceeds frame limit of {limit} bytes")]
    OversizedPayload { size: usize, limit: usize },

    /// Routing key was empty. Nothing was sent.
    #[error("routing key must not be empty")]
    EmptyRoutingKey,

    /// No confirmation arrived within the confirm timeout. The delivery is
    /// still in flight; a late acknowledgment simply has no observer.
    #[error("no broker confirmation within the confirm timeout")]
    ConfirmTimeout,

    /// The completion handle was abandoned before settlement.
    #[error("publish was cancelled before settlement")]
    Cancelled,
}

/// Failure modes of [`crate::publisher::Publisher::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// The drain deadline passed with deliveries still unresolved; every
    /// straggler was force-failed so none is left permanently pending.
    #[error("drain timed out with {forced} deliveries force-failed")]
    DrainTimeout { forced: usize },
}
