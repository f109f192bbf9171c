//! Diagnostics that remember every event for later assertions.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::diagnostics::{Diagnostics, RelayEvent, RelayEventKind};

/// [`Diagnostics`] implementation that stores event kinds in memory.
///
/// Clones share storage, so a test can keep one copy and hand another to a
/// forwarder.
#[derive(Clone, Default)]
pub struct RecordingDiagnostics {
    events: Arc<Mutex<Vec<(String, RelayEventKind)>>>,
    flushes: Arc<AtomicUsize>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinds of every event recorded so far, in order.
    pub fn kinds(&self) -> Vec<RelayEventKind> {
        self.events.lock().iter().map(|(_, kind)| *kind).collect()
    }

    /// Number of recorded events of `kind`.
    pub fn count(&self, kind: RelayEventKind) -> usize {
        self.events.lock().iter().filter(|(_, k)| *k == kind).count()
    }

    /// Labels attached to recorded events, in order.
    pub fn labels(&self) -> Vec<String> {
        self.events.lock().iter().map(|(label, _)| label.clone()).collect()
    }

    /// How many times [`Diagnostics::flush`] was called.
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn record(&self, label: &str, event: &RelayEvent<'_>) {
        self.events.lock().push((label.to_owned(), event.kind()));
    }

    fn flush(&self, _label: &str) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}
