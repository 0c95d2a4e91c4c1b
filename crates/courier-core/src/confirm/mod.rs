//! Confirm bookkeeping: delivery records, the pending set, and retry policy.

mod pending;
mod record;
mod retry;
mod state;

pub use pending::PendingSet;
pub use record::{Confirmation, DeliveryRecord, Message, PublishOptions};
pub use retry::RetryPolicy;
pub use state::DeliveryState;

pub(crate) use record::SettleResult;
