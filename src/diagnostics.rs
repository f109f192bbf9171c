//! Diagnostic events emitted by the forwarding pipeline.
//!
//! Every failure in the pipeline degrades to "this line is lost" and is
//! reported here instead of being returned to the caller. Components receive
//! an `Arc<dyn Diagnostics>` so tests can observe events without capturing
//! global log output. [`LogDiagnostics`] is the production implementation and
//! writes through the `log` facade.

use std::{fmt, io, time::Duration};

use log::{Level, info, log};

use crate::{
    rate_limited_warner::{DEFAULT_WARN_INTERVAL, RateLimitedWarner},
    sink::SinkError,
};

/// Something noteworthy that happened inside a forwarder.
#[derive(Debug)]
pub enum RelayEvent<'a> {
    /// The best-effort connect at forwarder construction failed.
    InitialConnectFailed(&'a SinkError),
    /// A lazy connect or a reconnect failed; the current line is dropped.
    ConnectFailed(&'a SinkError),
    /// A connect attempt made while delivering a line succeeded.
    Reconnected,
    /// The relay queue was full; the newest line is dropped.
    QueueFull,
    /// The first send of a line failed; a reconnect follows.
    SendFailed(&'a SinkError),
    /// The retried send after a reconnect failed; the line is dropped.
    RetryFailed(&'a SinkError),
    /// The sink refused the line itself, e.g. it could not be encoded. The
    /// line is dropped and the connection kept.
    LineRejected(&'a SinkError),
    /// Reading the source stream failed; the producer stops.
    ReadFailed(&'a io::Error),
    /// The teardown disconnect failed.
    DisconnectFailed(&'a SinkError),
}

/// Data-free discriminant of [`RelayEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelayEventKind {
    InitialConnectFailed,
    ConnectFailed,
    Reconnected,
    QueueFull,
    SendFailed,
    RetryFailed,
    LineRejected,
    ReadFailed,
    DisconnectFailed,
}

impl RelayEvent<'_> {
    pub fn kind(&self) -> RelayEventKind {
        match self {
            Self::InitialConnectFailed(_) => RelayEventKind::InitialConnectFailed,
            Self::ConnectFailed(_) => RelayEventKind::ConnectFailed,
            Self::Reconnected => RelayEventKind::Reconnected,
            Self::QueueFull => RelayEventKind::QueueFull,
            Self::SendFailed(_) => RelayEventKind::SendFailed,
            Self::RetryFailed(_) => RelayEventKind::RetryFailed,
            Self::LineRejected(_) => RelayEventKind::LineRejected,
            Self::ReadFailed(_) => RelayEventKind::ReadFailed,
            Self::DisconnectFailed(_) => RelayEventKind::DisconnectFailed,
        }
    }

    /// Severity the event is logged at.
    ///
    /// Connection churn is expected while a collector restarts and stays at
    /// debug. A line lost after a successful reconnect, or a dead source
    /// stream, is operationally notable.
    ///
    /// `QueueFull` fires per dropped line and stays at debug; [`LogDiagnostics`]
    /// rolls those drops into a periodic info summary.
    pub fn level(&self) -> Level {
        match self {
            Self::InitialConnectFailed(_)
            | Self::ConnectFailed(_)
            | Self::Reconnected
            | Self::QueueFull
            | Self::SendFailed(_) => Level::Debug,
            Self::LineRejected(_) | Self::DisconnectFailed(_) => Level::Warn,
            Self::RetryFailed(_) | Self::ReadFailed(_) => Level::Error,
        }
    }
}

impl fmt::Display for RelayEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitialConnectFailed(err) => {
                write!(f, "error connecting sink; will retry on first line: {err}")
            }
            Self::ConnectFailed(err) => write!(f, "error connecting sink; dropping line: {err}"),
            Self::Reconnected => f.write_str("sink reconnected"),
            Self::QueueFull => f.write_str("relay queue is full; dropping line"),
            Self::SendFailed(err) => write!(f, "error sending line; reconnecting: {err}"),
            Self::RetryFailed(err) => write!(f, "error sending line; dropping line: {err}"),
            Self::LineRejected(err) => write!(f, "sink rejected line; dropping it: {err}"),
            Self::ReadFailed(err) => write!(f, "error reading lines: {err}"),
            Self::DisconnectFailed(err) => write!(f, "error disconnecting sink: {err}"),
        }
    }
}

/// Receiver of pipeline events.
///
/// Shared between the producer and consumer threads of a forwarder, hence
/// `Send + Sync`.
pub trait Diagnostics: Send + Sync {
    /// Record a single event for the forwarder called `label`.
    fn record(&self, label: &str, event: &RelayEvent<'_>);

    /// Called once by the producer when the source stream is finished.
    fn flush(&self, _label: &str) {}
}

/// [`Diagnostics`] backed by the `log` facade.
///
/// Each event is logged at [`RelayEvent::level`]. Queue-full drops are also
/// summarised at info level, at most once per interval.
pub struct LogDiagnostics {
    queue_full: RateLimitedWarner,
}

impl LogDiagnostics {
    pub fn new() -> Self {
        Self::with_warn_interval(DEFAULT_WARN_INTERVAL)
    }

    /// Use a custom interval between queue-full summaries.
    pub fn with_warn_interval(interval: Duration) -> Self {
        Self {
            queue_full: RateLimitedWarner::new(interval),
        }
    }
}

impl Default for LogDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics for LogDiagnostics {
    fn record(&self, label: &str, event: &RelayEvent<'_>) {
        log!(event.level(), "{label}: {event}");
        if matches!(event, RelayEvent::QueueFull) {
            self.queue_full.record_drop();
            self.queue_full.warn_if_due(|count| {
                info!("{label}: {count} lines dropped because the relay queue was full");
            });
        }
    }

    fn flush(&self, label: &str) {
        self.queue_full.flush(|count| {
            info!("{label}: {count} lines dropped because the relay queue was full");
        });
    }
}

impl fmt::Debug for LogDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogDiagnostics")
            .field("pending_drops", &self.queue_full.pending())
            .finish()
    }
}
