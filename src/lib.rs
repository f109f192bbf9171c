//! Relay the lines of a byte stream to a connection-oriented log sink.
//!
//! A [`Forwarder`] splits its source into lines on one thread and delivers
//! them to a [`Sink`] on another. A bounded queue sits between the two and
//! drops the newest line when full, so a slow or unreachable sink never
//! blocks the producer. [`FluentSink`](fluent::FluentSink) speaks the Fluent
//! Forward protocol.

pub mod delivery;
pub mod diagnostics;
pub mod fluent;
pub mod forwarder;
pub mod queue;
pub mod rate_limited_warner;
pub mod sink;
pub mod splitter;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use delivery::{ConnectionState, Delivery, DeliveryLoop, DeliverySummary, DropReason};
pub use diagnostics::{Diagnostics, LogDiagnostics, RelayEvent, RelayEventKind};
pub use forwarder::{
    DEFAULT_QUEUE_CAPACITY, ForwardSummary, Forwarder, ForwarderConfig, ForwarderHandle,
};
pub use queue::{PushError, QueueClosed, RelayReceiver, RelaySender, relay_queue};
pub use rate_limited_warner::RateLimitedWarner;
pub use sink::{Sink, SinkError};
pub use splitter::{LineSplitter, SplitSummary, pump_lines};
