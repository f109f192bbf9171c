//! Wiring a byte stream to a sink.
//!
//! A [`Forwarder`] binds one source stream to one sink. Construction makes a
//! single best-effort connect; [`Forwarder::forward`] then spawns a reader
//! thread running [`pump_lines`] and a writer thread running a
//! [`DeliveryLoop`], joined only by a bounded relay queue. `forward` returns
//! as soon as both threads are launched.

use std::{
    fmt,
    io::Read,
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{error, warn};
use parking_lot::Mutex;

use crate::{
    delivery::{ConnectionState, DeliveryLoop, DeliverySummary},
    diagnostics::{Diagnostics, LogDiagnostics, RelayEvent},
    queue::relay_queue,
    sink::Sink,
    splitter::{SplitSummary, pump_lines},
};

/// Default relay queue capacity, in lines.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8192;

/// Per-forwarder settings.
#[derive(Clone, Debug)]
pub struct ForwarderConfig {
    /// Name used in diagnostics and thread names, e.g. `"stdout"`.
    pub label: String,
    /// Relay queue capacity; zero only hands off to a waiting writer.
    pub capacity: usize,
}

impl ForwarderConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// One source stream bound to one sink, ready to start.
pub struct Forwarder<R, S> {
    config: ForwarderConfig,
    source: R,
    sink: S,
    diagnostics: Arc<dyn Diagnostics>,
    state: ConnectionState,
}

impl<R, S> Forwarder<R, S>
where
    R: Read + Send + 'static,
    S: Sink + 'static,
{
    /// Create a forwarder reporting through [`LogDiagnostics`].
    pub fn new(label: impl Into<String>, capacity: usize, source: R, sink: S) -> Self {
        Self::with_diagnostics(
            ForwarderConfig::new(label).with_capacity(capacity),
            source,
            sink,
            Arc::new(LogDiagnostics::new()),
        )
    }

    /// Create a forwarder with an explicit diagnostics receiver.
    ///
    /// Attempts one connect. A failure is reported and otherwise ignored;
    /// the writer retries lazily when the first line arrives.
    pub fn with_diagnostics(
        config: ForwarderConfig,
        source: R,
        mut sink: S,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        let state = match sink.connect() {
            Ok(()) => ConnectionState::Connected,
            Err(err) => {
                diagnostics.record(&config.label, &RelayEvent::InitialConnectFailed(&err));
                ConnectionState::Disconnected
            }
        };
        Self {
            config,
            source,
            sink,
            diagnostics,
            state,
        }
    }

    /// Connection state after the construction-time connect.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Launch the reader and writer threads and return immediately.
    ///
    /// The threads run until the source is exhausted or fails. Dropping the
    /// returned handle detaches them.
    pub fn forward(self) -> ForwarderHandle {
        let Self {
            config,
            source,
            sink,
            diagnostics,
            state,
        } = self;
        let ForwarderConfig { label, capacity } = config;
        let (tx, rx) = relay_queue(capacity);

        let delivery = DeliveryLoop::with_state(label.clone(), sink, Arc::clone(&diagnostics), state);
        let writer = thread::Builder::new()
            .name(format!("log2fluent-{label}-writer"))
            .spawn(move || delivery.run(rx))
            .map_err(|err| error!("{label}: failed to spawn writer thread: {err}"))
            .ok();

        let reader_label = label.clone();
        let reader = thread::Builder::new()
            .name(format!("log2fluent-{label}-reader"))
            .spawn(move || pump_lines(&reader_label, source, tx, diagnostics.as_ref()))
            .map_err(|err| error!("{label}: failed to spawn reader thread: {err}"))
            .ok();

        ForwarderHandle {
            label,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl<R, S> fmt::Debug for Forwarder<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

/// Totals from both halves of a finished forwarder.
///
/// A half is `None` when its thread could not be spawned or panicked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForwardSummary {
    pub split: Option<SplitSummary>,
    pub delivery: Option<DeliverySummary>,
}

/// Handle to a running forwarder.
///
/// Callers that only need fire-and-forget behaviour can drop it.
pub struct ForwarderHandle {
    label: String,
    reader: Mutex<Option<JoinHandle<SplitSummary>>>,
    writer: Mutex<Option<JoinHandle<DeliverySummary>>>,
}

impl ForwarderHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether both threads have exited.
    pub fn is_finished(&self) -> bool {
        slot_finished(&self.reader) && slot_finished(&self.writer)
    }

    /// Wait for both threads and collect their summaries.
    ///
    /// Later calls return an empty summary.
    pub fn join(&self) -> ForwardSummary {
        ForwardSummary {
            split: self.join_slot(&self.reader, "reader"),
            delivery: self.join_slot(&self.writer, "writer"),
        }
    }

    fn join_slot<T>(&self, slot: &Mutex<Option<JoinHandle<T>>>, role: &str) -> Option<T> {
        let handle = slot.lock().take()?;
        match handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                warn!("{}: {role} thread panicked", self.label);
                None
            }
        }
    }
}

fn slot_finished<T>(slot: &Mutex<Option<JoinHandle<T>>>) -> bool {
    slot.lock().as_ref().is_none_or(|handle| handle.is_finished())
}

impl fmt::Debug for ForwarderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwarderHandle")
            .field("label", &self.label)
            .field("finished", &self.is_finished())
            .finish()
    }
}
