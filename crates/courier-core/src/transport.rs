//! Transport port: the seam between the confirm machinery and the broker.
//!
//! The real transport (connection setup, TLS, channel multiplexing,
//! reconnect) lives elsewhere; this layer only needs "write a frame" plus a
//! stream of confirmation events. `InMemoryTransport` implements the port
//! for development and tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::confirm::Message;
use crate::error::TransportError;

/// Default negotiated frame limit when none is configured (128 KiB).
pub const DEFAULT_FRAME_LIMIT: usize = 128 * 1024;

/// Asynchronous confirmation events emitted by the broker.
///
/// `tag` is the delivery sequence number; with `multiple == true` the event
/// covers every outstanding sequence up to and including `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmEvent {
    Ack { tag: u64, multiple: bool },
    Nack { tag: u64, multiple: bool, reason: String },
    Closed { reason: String },
}

/// An open channel to the broker.
///
/// `send` is a wire enqueue only; broker acceptance arrives later through
/// the paired [`ConfirmEvent`] stream. One transport handle belongs to
/// exactly one publisher + listener pair: the sequence space is per handle.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Largest payload the negotiated connection accepts.
    fn frame_limit(&self) -> usize;

    /// Enqueue one framed message onto the wire.
    async fn send(&self, message: &Message) -> Result<(), TransportError>;
}

/// In-memory transport for development and tests.
///
/// Records every sent message and lets the test (or demo) play broker by
/// driving `ack`/`nack`/`close`. Delivery tags follow the publisher's
/// sequence counter: the first send is tag 1, the second tag 2, and so on.
pub struct InMemoryTransport {
    sent: Mutex<Vec<Message>>,
    events: mpsc::Sender<ConfirmEvent>,
    frame_limit: usize,
    fail_sends: AtomicBool,
}

impl InMemoryTransport {
    /// Create a transport plus the confirm-event receiver to hand to the
    /// publisher.
    pub fn new() -> (Self, mpsc::Receiver<ConfirmEvent>) {
        Self::with_frame_limit(DEFAULT_FRAME_LIMIT)
    }

    pub fn with_frame_limit(frame_limit: usize) -> (Self, mpsc::Receiver<ConfirmEvent>) {
        let (events, rx) = mpsc::channel(256);
        (
            Self {
                sent: Mutex::new(Vec::new()),
                events,
                frame_limit,
                fail_sends: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Make subsequent `send` calls fail, for fault injection.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    pub async fn ack(&self, tag: u64, multiple: bool) {
        let _ = self.events.send(ConfirmEvent::Ack { tag, multiple }).await;
    }

    pub async fn nack(&self, tag: u64, multiple: bool, reason: &str) {
        let _ = self
            .events
            .send(ConfirmEvent::Nack {
                tag,
                multiple,
                reason: reason.to_string(),
            })
            .await;
    }

    pub async fn close(&self, reason: &str) {
        let _ = self
            .events
            .send(ConfirmEvent::Closed {
                reason: reason.to_string(),
            })
            .await;
    }

    /// Everything successfully sent so far, in send order.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn frame_limit(&self) -> usize {
        self.frame_limit
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(TransportError::SendFailed(
                "injected send failure".to_string(),
            ));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(routing_key: &str) -> Message {
        Message {
            payload: b"{}".to_vec(),
            routing_key: routing_key.to_string(),
            headers: None,
        }
    }

    #[tokio::test]
    async fn send_records_messages_in_order() {
        let (transport, _rx) = InMemoryTransport::new();

        transport.send(&message("a")).await.unwrap();
        transport.send(&message("b")).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].routing_key, "a");
        assert_eq!(sent[1].routing_key, "b");
    }

    #[tokio::test]
    async fn injected_failures_are_not_recorded() {
        let (transport, _rx) = InMemoryTransport::new();
        transport.set_fail_sends(true);

        let err = transport.send(&message("a")).await.unwrap_err();

        assert!(matches!(err, TransportError::SendFailed(_)));
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn broker_events_reach_the_receiver() {
        let (transport, mut rx) = InMemoryTransport::new();

        transport.ack(3, true).await;
        transport.nack(4, false, "queue overflow").await;

        assert_eq!(
            rx.recv().await,
            Some(ConfirmEvent::Ack {
                tag: 3,
                multiple: true
            })
        );
        assert!(matches!(
            rx.recv().await,
            Some(ConfirmEvent::Nack { tag: 4, .. })
        ));
    }
}
