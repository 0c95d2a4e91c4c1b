//! Confirm listener: the single consumer of the broker's acknowledgment
//! stream, and the retry/backpressure controller behind it.
//!
//! One task owns every resolution transition. Events are applied strictly
//! in arrival order; cumulative tags resolve ascending. Rejected deliveries
//! park in a backoff heap (not counting against the in-flight bound) and
//! re-enter the pending set only when a slot is free.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::confirm::{DeliveryRecord, DeliveryState, Message, SettleResult};
use crate::error::PublishError;
use crate::publisher::{ChannelState, Shared};
use crate::transport::ConfirmEvent;

/// Wakeup horizon when nothing is scheduled; the loop re-checks on events
/// and retry wakeups anyway.
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// A rejected delivery waiting outside the pending set. Carries the attempt
/// history forward; resubmission allocates a fresh sequence.
pub(crate) struct RetryEntry {
    pub(crate) message: Message,
    /// Attempt number the resubmission will run as.
    pub(crate) attempt: u32,
    pub(crate) last_reason: String,
    pub(crate) slot: Option<oneshot::Sender<SettleResult>>,
}

impl RetryEntry {
    pub(crate) fn is_abandoned(&self) -> bool {
        self.slot.as_ref().is_none_or(|slot| slot.is_closed())
    }

    pub(crate) fn settle_failed(self) {
        if let Some(slot) = self.slot {
            let _ = slot.send(Err(PublishError::Failed {
                last_reason: self.last_reason,
                attempts: self.attempt,
            }));
        }
    }
}

/// Heap entry for the backoff holding area.
///
/// Reverse ordering so `BinaryHeap` acts as a min-heap (earliest due first).
pub(crate) struct ScheduledRetry {
    pub(crate) due: Instant,
    pub(crate) entry: RetryEntry,
}

impl PartialEq for ScheduledRetry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}

impl Eq for ScheduledRetry {}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.due.cmp(&self.due)
    }
}

pub(crate) async fn confirm_loop(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<ConfirmEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut stream_alive = true;
    let mut shutdown_alive = true;

    loop {
        let draining = *shutdown_rx.borrow();
        let next_due = {
            let mut state = shared.state.lock().await;
            if draining {
                // Parked retries never go back out during a drain.
                fail_parked(&mut state);
                if state.pending.is_empty() {
                    info!(
                        confirmed = state.confirmed,
                        failed = state.failed,
                        "confirm listener drained"
                    );
                    break;
                }
                None
            } else {
                promote_due(&mut state);
                state.scheduled.peek().map(|scheduled| scheduled.due)
            }
        };
        if !draining {
            flush_ready(&shared).await;
        }

        let wake_at = next_due.unwrap_or_else(|| Instant::now() + IDLE_WAKE);
        tokio::select! {
            changed = shutdown_rx.changed(), if shutdown_alive => {
                if changed.is_err() {
                    shutdown_alive = false;
                }
            }
            _ = shared.retry_wake.notified() => {}
            event = events.recv(), if stream_alive => {
                match event {
                    Some(event) => handle_event(&shared, event).await,
                    None => {
                        stream_alive = false;
                        handle_event(
                            &shared,
                            ConfirmEvent::Closed {
                                reason: "confirm stream ended".to_string(),
                            },
                        )
                        .await;
                    }
                }
            }
            _ = sleep_until(wake_at), if next_due.is_some() => {}
        }
    }
}

/// Apply one broker event. Resolutions happen under the state lock; no
/// await while it is held.
async fn handle_event(shared: &Shared, event: ConfirmEvent) {
    let freed = {
        let mut state = shared.state.lock().await;
        match event {
            ConfirmEvent::Ack { tag, multiple } => {
                let records = take_scope(&mut state, tag, multiple);
                if records.is_empty() {
                    debug!(tag, multiple, "ack for unknown delivery tag, ignoring");
                }
                let freed = records.len();
                for record in records {
                    state.confirmed += 1;
                    record.settle_confirmed();
                }
                freed
            }
            ConfirmEvent::Nack {
                tag,
                multiple,
                reason,
            } => {
                let records = take_scope(&mut state, tag, multiple);
                if records.is_empty() {
                    debug!(tag, multiple, "nack for unknown delivery tag, ignoring");
                }
                let freed = records.len();
                for record in records {
                    reject_record(&mut state, shared, record, reason.clone());
                }
                freed
            }
            ConfirmEvent::Closed { reason } => {
                let records = state.pending.drain();
                if !records.is_empty() {
                    warn!(
                        count = records.len(),
                        reason = %reason,
                        "channel closed with deliveries in flight"
                    );
                }
                let freed = records.len();
                for record in records {
                    reject_record(
                        &mut state,
                        shared,
                        record,
                        format!("connection lost: {reason}"),
                    );
                }
                freed
            }
        }
    };

    for _ in 0..freed {
        shared.admission.notify_one();
    }
}

fn take_scope(state: &mut ChannelState, tag: u64, multiple: bool) -> Vec<DeliveryRecord> {
    if multiple {
        state.pending.take_up_to(tag)
    } else {
        state.pending.take(tag).into_iter().collect()
    }
}

/// Rejection path shared by nacks, closed-channel fan-out, and synchronous
/// send failures. Decides between resubmission and a terminal verdict.
pub(crate) fn reject_record(
    state: &mut ChannelState,
    shared: &Shared,
    mut record: DeliveryRecord,
    reason: String,
) {
    record.state = DeliveryState::Rejected;
    if record.is_abandoned() {
        debug!(
            sequence = record.sequence,
            "rejected delivery has no observer, dropping"
        );
        state.failed += 1;
        return;
    }

    let attempts = record.attempt + 1;
    if state.closing {
        state.failed += 1;
        record.settle_failed(PublishError::Rejected(reason));
        return;
    }
    if attempts < shared.config.attempt_budget() {
        let delay = shared.policy.next_delay(record.attempt);
        debug!(
            sequence = record.sequence,
            attempt = record.attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "scheduling resubmission"
        );
        state.scheduled.push(ScheduledRetry {
            due: Instant::now() + delay,
            entry: RetryEntry {
                message: record.message,
                attempt: attempts,
                last_reason: reason,
                slot: record.slot,
            },
        });
    } else {
        debug!(
            sequence = record.sequence,
            attempts,
            reason = %reason,
            "attempt budget exhausted"
        );
        state.failed += 1;
        record.settle_failed(PublishError::Failed {
            last_reason: reason,
            attempts,
        });
    }
}

/// Move retries whose backoff elapsed into the ready queue.
fn promote_due(state: &mut ChannelState) {
    let now = Instant::now();
    while let Some(scheduled) = state.scheduled.peek() {
        if scheduled.due > now {
            break; // heap is ordered, the rest is later
        }
        let scheduled = state.scheduled.pop().unwrap();
        state.ready_retries.push_back(scheduled.entry);
    }
}

/// Re-admit ready retries while in-flight slots are free: fresh sequence,
/// incremented attempt, frame re-sent. Sends happen outside the lock.
async fn flush_ready(shared: &Shared) {
    loop {
        let batch = {
            let mut state = shared.state.lock().await;
            let mut batch = Vec::new();
            while state.pending.len() < shared.config.max_in_flight {
                let Some(entry) = state.ready_retries.pop_front() else {
                    break;
                };
                if entry.is_abandoned() {
                    state.failed += 1;
                    continue;
                }
                let sequence = state.allocate_sequence();
                let record =
                    DeliveryRecord::new(sequence, entry.message.clone(), entry.attempt, entry.slot);
                state.pending.insert(record);
                batch.push((sequence, entry.message));
            }
            batch
        };

        if batch.is_empty() {
            return;
        }
        for (sequence, message) in batch {
            // A failed resend re-parks the record, freeing its slot, so
            // another pass may find more admissible retries.
            shared.send_allocated(sequence, &message).await;
        }
    }
}

/// Force every parked retry to its terminal verdict. Used during drains and
/// by the forced-shutdown path.
pub(crate) fn fail_parked(state: &mut ChannelState) -> usize {
    let parked: Vec<RetryEntry> = state
        .scheduled
        .drain()
        .map(|scheduled| scheduled.entry)
        .chain(state.ready_retries.drain(..))
        .collect();

    let forced = parked.len();
    for entry in parked {
        state.failed += 1;
        entry.settle_failed();
    }
    forced
}
