//! Consumer half of a forwarder.
//!
//! [`DeliveryLoop`] drains the relay queue and owns the sink together with
//! its connection state. Connection problems never stall the loop: a line
//! that cannot be delivered after at most one reconnect and two sends is
//! dropped, and the next line starts afresh.

use std::sync::Arc;

use crate::{
    diagnostics::{Diagnostics, RelayEvent},
    queue::RelayReceiver,
    sink::{Sink, SinkError},
};

#[cfg(test)]
mod tests;

/// Connection state as last observed by the delivery loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Why a line was abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The sink was disconnected and connecting failed.
    ConnectFailed,
    /// The first send failed and the reconnect failed too.
    ReconnectFailed,
    /// The send after a successful reconnect failed.
    RetryFailed,
    /// The sink refused the line itself; the connection was left alone.
    Rejected,
}

/// Outcome of delivering one line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Sent on the second attempt, after a reconnect.
    SentAfterReconnect,
    Dropped(DropReason),
}

/// Totals for one [`DeliveryLoop::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub sent: u64,
    pub dropped: u64,
}

/// Drains a relay queue into a [`Sink`].
pub struct DeliveryLoop<S> {
    label: String,
    sink: S,
    diagnostics: Arc<dyn Diagnostics>,
    state: ConnectionState,
}

impl<S: Sink> DeliveryLoop<S> {
    /// Start in [`ConnectionState::Disconnected`].
    pub fn new(label: impl Into<String>, sink: S, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self::with_state(label, sink, diagnostics, ConnectionState::Disconnected)
    }

    /// Start in `state`, e.g. after a connect made by the caller.
    pub fn with_state(
        label: impl Into<String>,
        sink: S,
        diagnostics: Arc<dyn Diagnostics>,
        state: ConnectionState,
    ) -> Self {
        Self {
            label: label.into(),
            sink,
            diagnostics,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Deliver one line according to the retry policy.
    ///
    /// 1. Connect if the sink reports no connection. Drop on failure.
    /// 2. Send. Done on success.
    /// 3. On failure, disconnect and reconnect once. Drop if that fails.
    /// 4. Send once more. On failure, drop and disconnect so the next line
    ///    performs a fresh handshake.
    ///
    /// A send error that is not a connection fault (see
    /// [`SinkError::is_connection_fault`]) drops the line at step 3 and keeps
    /// the connection.
    pub fn deliver(&mut self, line: &str) -> Delivery {
        if !self.sink.is_connected() {
            if let Err(err) = self.connect() {
                self.emit(&RelayEvent::ConnectFailed(&err));
                return Delivery::Dropped(DropReason::ConnectFailed);
            }
            self.emit(&RelayEvent::Reconnected);
        }

        let err = match self.sink.send(line) {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                return Delivery::Sent;
            }
            Err(err) => err,
        };
        if !err.is_connection_fault() {
            self.state = ConnectionState::Connected;
            self.emit(&RelayEvent::LineRejected(&err));
            return Delivery::Dropped(DropReason::Rejected);
        }
        self.emit(&RelayEvent::SendFailed(&err));

        self.mark_disconnected();
        if let Err(err) = self.connect() {
            self.emit(&RelayEvent::ConnectFailed(&err));
            return Delivery::Dropped(DropReason::ReconnectFailed);
        }
        self.emit(&RelayEvent::Reconnected);

        match self.sink.send(line) {
            Ok(()) => Delivery::SentAfterReconnect,
            Err(err) if !err.is_connection_fault() => {
                self.emit(&RelayEvent::LineRejected(&err));
                Delivery::Dropped(DropReason::Rejected)
            }
            Err(err) => {
                self.emit(&RelayEvent::RetryFailed(&err));
                self.mark_disconnected();
                Delivery::Dropped(DropReason::RetryFailed)
            }
        }
    }

    /// Deliver every queued line until the queue is closed and drained, then
    /// disconnect the sink exactly once.
    pub fn run(mut self, receiver: RelayReceiver) -> DeliverySummary {
        let mut summary = DeliverySummary::default();
        for line in receiver {
            match self.deliver(&line) {
                Delivery::Sent | Delivery::SentAfterReconnect => summary.sent += 1,
                Delivery::Dropped(_) => summary.dropped += 1,
            }
        }
        self.teardown();
        summary
    }

    fn connect(&mut self) -> Result<(), SinkError> {
        match self.sink.connect() {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    // The connection is presumed broken; a failed close changes nothing.
    fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        let _ = self.sink.disconnect();
    }

    fn teardown(&mut self) {
        if let Err(err) = self.sink.disconnect() {
            self.emit(&RelayEvent::DisconnectFailed(&err));
        }
        self.state = ConnectionState::Disconnected;
    }

    fn emit(&self, event: &RelayEvent<'_>) {
        self.diagnostics.record(&self.label, event);
    }
}

impl<S> std::fmt::Debug for DeliveryLoop<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryLoop")
            .field("label", &self.label)
            .field("state", &self.state)
            .finish()
    }
}
