//! courier-core
//!
//! Reliable publish-confirm layer for the platform's message fan-out: every
//! published message either gets a durable broker acknowledgment or a
//! terminal failure report, driven by the broker's asynchronous (possibly
//! cumulative, possibly out-of-order) confirm stream rather than blocking
//! round-trips.
//!
//! # Module layout
//! - **transport**: the broker seam (`Transport` port, `ConfirmEvent`
//!   stream, `InMemoryTransport` for development)
//! - **confirm**: delivery records, the ordered pending set, retry policy
//! - **publisher**: public surface (`Publisher`, `CompletionHandle`)
//! - **listener**: the confirm loop and retry/backpressure controller
//! - **config / error / status**: options, error taxonomy, channel counts

pub mod config;
pub mod confirm;
pub mod error;
pub mod publisher;
pub mod status;
pub mod transport;

mod listener;

pub use config::ConfirmConfig;
pub use confirm::{Confirmation, DeliveryState, Message, PublishOptions, RetryPolicy};
pub use error::{PublishError, ShutdownError, TransportError};
pub use publisher::{CompletionHandle, Publisher};
pub use status::ChannelCounts;
pub use transport::{ConfirmEvent, InMemoryTransport, Transport};
