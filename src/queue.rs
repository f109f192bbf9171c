//! Bounded hand-off between the line reader and the delivery loop.
//!
//! Pushing never blocks: when the queue is full the incoming line is handed
//! back to the caller and the oldest queued lines are left untouched. Popping
//! blocks until a line arrives or the sender side is closed and the queue is
//! drained.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use thiserror::Error;

/// Reasons a line could not be queued. The rejected line is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    /// The queue is at capacity.
    #[error("relay queue is full")]
    Full(String),
    /// The receiving side has gone away.
    #[error("relay queue is closed")]
    Closed(String),
}

impl PushError {
    /// Recover the rejected line.
    pub fn into_line(self) -> String {
        match self {
            Self::Full(line) | Self::Closed(line) => line,
        }
    }
}

/// Returned by [`RelayReceiver::try_pop`] once the queue is closed and drained.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("relay queue is closed")]
pub struct QueueClosed;

/// Create a queue holding at most `capacity` lines.
///
/// A capacity of zero yields a rendezvous queue: a push only succeeds when
/// the receiver is already blocked in [`RelayReceiver::pop`].
pub fn relay_queue(capacity: usize) -> (RelaySender, RelayReceiver) {
    let (tx, rx) = bounded(capacity);
    (RelaySender { tx }, RelayReceiver { rx })
}

/// Producer half of the relay queue.
#[derive(Debug)]
pub struct RelaySender {
    tx: Sender<String>,
}

impl RelaySender {
    /// Queue `line` without blocking.
    pub fn push(&self, line: String) -> Result<(), PushError> {
        self.tx.try_send(line).map_err(|err| match err {
            TrySendError::Full(line) => PushError::Full(line),
            TrySendError::Disconnected(line) => PushError::Closed(line),
        })
    }

    /// Close the queue. Lines already queued remain available to the
    /// receiver. Dropping the sender has the same effect.
    pub fn close(self) {
        drop(self);
    }

    pub fn capacity(&self) -> Option<usize> {
        self.tx.capacity()
    }
}

/// Consumer half of the relay queue.
#[derive(Debug)]
pub struct RelayReceiver {
    rx: Receiver<String>,
}

impl RelayReceiver {
    /// Block until a line is available.
    ///
    /// Returns `None` once the sender is closed and every queued line has
    /// been taken; every later call returns `None` as well.
    pub fn pop(&self) -> Option<String> {
        self.rx.recv().ok()
    }

    /// Take a line if one is ready, without blocking.
    ///
    /// `Ok(None)` means the queue is open but currently empty.
    pub fn try_pop(&self) -> Result<Option<String>, QueueClosed> {
        match self.rx.try_recv() {
            Ok(line) => Ok(Some(line)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(QueueClosed),
        }
    }

    /// Number of lines currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl IntoIterator for RelayReceiver {
    type Item = String;
    type IntoIter = crossbeam_channel::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.rx.into_iter()
    }
}
