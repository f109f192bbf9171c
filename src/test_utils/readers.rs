//! Byte sources with observable failure and close behaviour.

use std::{
    io::{self, Cursor, Read},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::queue::{QueueClosed, RelayReceiver};

/// Reader that serves `data` and then fails instead of reporting EOF.
pub struct FailingReader {
    data: Cursor<Vec<u8>>,
}

impl FailingReader {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: Cursor::new(data.to_vec()),
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.data.read(buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated read failure",
            )),
            n => Ok(n),
        }
    }
}

#[derive(Default)]
struct ReaderState {
    dropped: bool,
    queue_closed_at_drop: Option<bool>,
}

/// Observes a [`TrackedReader`] after it has been moved into a forwarder.
#[derive(Clone, Default)]
pub struct ReaderProbe {
    state: Arc<Mutex<ReaderState>>,
}

impl ReaderProbe {
    /// Whether the reader has been dropped, i.e. the stream was closed.
    pub fn dropped(&self) -> bool {
        self.state.lock().dropped
    }

    /// Whether the watched queue was already closed when the reader was
    /// dropped. `None` when no queue was watched or the reader is alive.
    pub fn queue_closed_at_drop(&self) -> Option<bool> {
        self.state.lock().queue_closed_at_drop
    }
}

/// In-memory reader that reports when it is dropped.
pub struct TrackedReader {
    data: Cursor<Vec<u8>>,
    watched: Option<RelayReceiver>,
    probe: ReaderProbe,
}

impl TrackedReader {
    /// Serve `data`. The returned probe observes the reader's drop.
    pub fn new(data: &[u8]) -> (Self, ReaderProbe) {
        let probe = ReaderProbe::default();
        let reader = Self {
            data: Cursor::new(data.to_vec()),
            watched: None,
            probe: probe.clone(),
        };
        (reader, probe)
    }

    /// Serve `data` and, when dropped, check whether `queue` is closed.
    ///
    /// Any lines still in the queue are drained during the check.
    pub fn watching(data: &[u8], queue: RelayReceiver) -> (Self, ReaderProbe) {
        let (mut reader, probe) = Self::new(data);
        reader.watched = Some(queue);
        (reader, probe)
    }
}

impl Read for TrackedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        let closed = self.watched.as_ref().map(|queue| loop {
            match queue.try_pop() {
                Ok(Some(_)) => continue,
                Ok(None) => break false,
                Err(QueueClosed) => break true,
            }
        });
        let mut state = self.probe.state.lock();
        state.dropped = true;
        state.queue_closed_at_drop = closed;
    }
}
