//! Publisher: the caller-facing side of the publish-confirm channel.
//!
//! `publish` admits a message under the in-flight bound, allocates the next
//! delivery sequence, records it as pending, writes the frame, and hands
//! back a completion handle. The paired confirm listener, spawned here as
//! the sole consumer of the event stream, settles the handle.
//!
//! Concurrency model: any number of tasks may call `publish`; the confirm
//! listener is the only resolver. The sequence counter and the pending set
//! share one lock so "allocate sequence, insert record" is a single atomic
//! step — an acknowledgment can never reference a sequence the pending set
//! does not know yet. No await happens while the lock is held.

use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::warn;

use crate::config::ConfirmConfig;
use crate::confirm::{
    Confirmation, DeliveryRecord, Message, PendingSet, PublishOptions, RetryPolicy, SettleResult,
};
use crate::error::{PublishError, ShutdownError};
use crate::listener;
use crate::listener::{RetryEntry, ScheduledRetry};
use crate::status::ChannelCounts;
use crate::transport::{ConfirmEvent, Transport};

/// Mutable channel state, shared between publishers and the confirm
/// listener behind one lock.
pub(crate) struct ChannelState {
    /// Next delivery sequence. Monotonic for the life of the transport
    /// handle; advanced on every allocation and never rolled back, so a
    /// failed attempt can never alias a later one.
    next_sequence: u64,

    pub(crate) pending: PendingSet,

    /// Backoff holding area. Parked retries do not occupy in-flight slots.
    pub(crate) scheduled: BinaryHeap<ScheduledRetry>,

    /// Retries whose backoff elapsed, waiting for a free slot.
    pub(crate) ready_retries: VecDeque<RetryEntry>,

    pub(crate) confirmed: u64,
    pub(crate) failed: u64,

    /// Set once shutdown begins; rejections stop retrying from then on.
    pub(crate) closing: bool,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            pending: PendingSet::new(),
            scheduled: BinaryHeap::new(),
            ready_retries: VecDeque::new(),
            confirmed: 0,
            failed: 0,
            closing: false,
        }
    }

    pub(crate) fn allocate_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn counts(&self) -> ChannelCounts {
        ChannelCounts {
            in_flight: self.pending.len(),
            awaiting_retry: self.scheduled.len() + self.ready_retries.len(),
            confirmed: self.confirmed,
            failed: self.failed,
        }
    }
}

/// State shared by the publisher handle and the confirm listener task.
pub(crate) struct Shared {
    pub(crate) state: Mutex<ChannelState>,
    /// Woken whenever an in-flight slot frees up.
    pub(crate) admission: Notify,
    /// Wakes the listener when someone other than it schedules a retry.
    pub(crate) retry_wake: Notify,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: ConfirmConfig,
    pub(crate) policy: RetryPolicy,
}

impl Shared {
    /// Write the frame for an already-pending sequence. On a synchronous
    /// transport failure the record is pulled back out and rerouted through
    /// the rejection path instead of lingering as pending forever.
    pub(crate) async fn send_allocated(&self, sequence: u64, message: &Message) {
        if let Err(error) = self.transport.send(message).await {
            warn!(sequence, %error, "frame write failed, rerouting delivery");
            {
                let mut state = self.state.lock().await;
                // Absent means a closed-channel fan-out already swept it.
                if let Some(record) = state.pending.take(sequence) {
                    listener::reject_record(&mut state, self, record, error.to_string());
                }
            }
            self.admission.notify_one();
            self.retry_wake.notify_one();
        }
    }
}

/// Settles exactly once with the broker's verdict on one publish.
///
/// Dropping (or `cancel`ing) the handle abandons the delivery: the broker
/// exchange still completes and clears the pending entry, there is just no
/// observer left, and a later rejection is not retried.
#[derive(Debug)]
pub struct CompletionHandle {
    sequence: u64,
    confirm_timeout: Duration,
    rx: oneshot::Receiver<SettleResult>,
}

impl CompletionHandle {
    /// Sequence of the initial send. Resubmissions run under later
    /// sequences; the confirmed one is reported in [`Confirmation`].
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wait for the verdict, bounded by the configured confirm timeout.
    pub async fn await_confirm(self) -> Result<Confirmation, PublishError> {
        match timeout(self.confirm_timeout, self.rx).await {
            Err(_) => Err(PublishError::ConfirmTimeout),
            Ok(result) => result.unwrap_or(Err(PublishError::Cancelled)),
        }
    }

    /// Wait without a deadline.
    pub async fn wait(self) -> Result<Confirmation, PublishError> {
        self.rx.await.unwrap_or(Err(PublishError::Cancelled))
    }

    /// Give up on observing the verdict.
    pub fn cancel(self) {}
}

/// One publish-confirm channel over an exclusively owned transport handle.
///
/// Taking the event receiver by value keeps the pairing honest: a second
/// publisher on the same handle would corrupt the sequence space.
pub struct Publisher {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    listener: JoinHandle<()>,
}

impl Publisher {
    /// Wire up shared state and spawn the confirm listener task.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<ConfirmEvent>,
        config: ConfirmConfig,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        let shared = Arc::new(Shared {
            state: Mutex::new(ChannelState::new()),
            admission: Notify::new(),
            retry_wake: Notify::new(),
            transport,
            config,
            policy,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(listener::confirm_loop(
            Arc::clone(&shared),
            events,
            shutdown_rx,
        ));
        Self {
            shared,
            shutdown_tx,
            listener,
        }
    }

    /// Publish one message. Returns as soon as the frame is written; the
    /// handle settles when the broker confirms, the retry budget runs out,
    /// or the channel shuts down.
    ///
    /// Admission failures (`EmptyRoutingKey`, `OversizedPayload`,
    /// `BackpressureTimeout`) mean nothing was sent and are never retried.
    pub async fn publish(
        &self,
        payload: Vec<u8>,
        routing_key: impl Into<String>,
        options: PublishOptions,
    ) -> Result<CompletionHandle, PublishError> {
        let routing_key = routing_key.into();
        if routing_key.is_empty() {
            return Err(PublishError::EmptyRoutingKey);
        }
        let limit = self.shared.transport.frame_limit();
        if payload.len() > limit {
            return Err(PublishError::OversizedPayload {
                size: payload.len(),
                limit,
            });
        }

        let message = Message {
            payload,
            routing_key,
            headers: options.headers,
        };
        let (tx, rx) = oneshot::channel();
        let sequence = self.admit(message.clone(), tx).await?;
        self.shared.send_allocated(sequence, &message).await;

        Ok(CompletionHandle {
            sequence,
            confirm_timeout: self.shared.config.confirm_timeout,
            rx,
        })
    }

    /// Wait for a free in-flight slot, then allocate the sequence and
    /// insert the pending record as one step under the lock. The insert
    /// happens before the frame write, never after.
    async fn admit(
        &self,
        message: Message,
        slot: oneshot::Sender<SettleResult>,
    ) -> Result<u64, PublishError> {
        let deadline = Instant::now() + self.shared.config.admission_timeout;
        loop {
            // Register interest before re-checking, so a slot freed in
            // between does not go unnoticed.
            let notified = self.shared.admission.notified();
            {
                let mut state = self.shared.state.lock().await;
                if state.pending.len() < self.shared.config.max_in_flight {
                    let sequence = state.allocate_sequence();
                    state
                        .pending
                        .insert(DeliveryRecord::new(sequence, message, 0, Some(slot)));
                    if state.pending.len() < self.shared.config.max_in_flight {
                        // Room left, pass the wakeup along.
                        self.shared.admission.notify_one();
                    }
                    return Ok(sequence);
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Err(PublishError::BackpressureTimeout);
            }
        }
    }

    /// Channel snapshot for observability.
    pub async fn counts(&self) -> ChannelCounts {
        self.shared.state.lock().await.counts()
    }

    /// Drain and release the channel: refuse retries, keep applying broker
    /// verdicts until nothing is pending, and after `drain_timeout`
    /// force-fail the rest. Either way, no delivery is left unsettled.
    pub async fn shutdown(mut self, drain_timeout: Duration) -> Result<(), ShutdownError> {
        {
            let mut state = self.shared.state.lock().await;
            state.closing = true;
        }
        let _ = self.shutdown_tx.send(true);

        match timeout(drain_timeout, &mut self.listener).await {
            Ok(_) => Ok(()),
            Err(_) => {
                self.listener.abort();
                let forced = {
                    let mut state = self.shared.state.lock().await;
                    force_fail_all(&mut state)
                };
                warn!(forced, "drain timed out, force-failed outstanding deliveries");
                Err(ShutdownError::DrainTimeout { forced })
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn pending_sequences(&self) -> Vec<u64> {
        self.shared.state.lock().await.pending.sequences()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        // No detached listener outliving its publisher.
        self.listener.abort();
    }
}

/// Terminal verdict for everything still outstanding, pending and parked
/// alike. Returns how many deliveries were forced.
fn force_fail_all(state: &mut ChannelState) -> usize {
    let mut forced = 0;
    for record in state.pending.drain() {
        let attempts = record.attempt + 1;
        forced += 1;
        state.failed += 1;
        record.settle_failed(PublishError::Failed {
            last_reason: "shutdown drain timed out".to_string(),
            attempts,
        });
    }
    forced + listener::fail_parked(state)
}
