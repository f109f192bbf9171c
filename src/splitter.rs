//! Splitting a byte stream into lines.
//!
//! [`LineSplitter`] lazily yields `\n`-terminated lines of any length from a
//! reader. [`pump_lines`] drives a splitter as the producer half of a
//! forwarder, pushing each line into the relay queue without ever waiting
//! for space.

use std::io::{self, BufRead, BufReader, Read};

use crate::{
    diagnostics::{Diagnostics, RelayEvent},
    queue::{PushError, RelaySender},
};

/// Default size of the internal read buffer. Lines longer than this are
/// accumulated across refills, never truncated.
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// Lazy iterator over the lines of a byte stream.
///
/// Each item is one line with its trailing `\n` removed. A final fragment
/// without a newline is yielded if it is non-empty. Bytes that are not valid
/// UTF-8 are replaced with U+FFFD. After the end of the stream, or after the
/// first read error, the iterator only returns `None`.
pub struct LineSplitter<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: Read> LineSplitter<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(DEFAULT_READ_BUFFER, reader)
    }

    /// Use a read buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity.max(1), reader),
            buf: Vec::new(),
            finished: false,
        }
    }
}

fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

impl<R: Read> Iterator for LineSplitter<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.finished = true;
                None
            }
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                } else {
                    // Unterminated fragment at EOF.
                    self.finished = true;
                }
                Some(Ok(decode(std::mem::take(&mut self.buf))))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for LineSplitter<R> {}

/// Outcome of one producer run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SplitSummary {
    /// Lines read from the source.
    pub lines: u64,
    /// Lines accepted by the relay queue.
    pub queued: u64,
    /// Lines discarded because the queue was full or closed.
    pub dropped: u64,
    /// Whether a read error ended the stream early.
    pub read_failed: bool,
}

/// Read `reader` to the end, pushing every line into `sender`.
///
/// Lines that do not fit are dropped and reported as
/// [`RelayEvent::QueueFull`]. A read error is reported as
/// [`RelayEvent::ReadFailed`] and stops the run. On every exit path the
/// queue is closed first and the reader is dropped second.
pub fn pump_lines<R: Read>(
    label: &str,
    reader: R,
    sender: RelaySender,
    diagnostics: &dyn Diagnostics,
) -> SplitSummary {
    let mut splitter = LineSplitter::new(reader);
    let mut summary = SplitSummary::default();
    for item in splitter.by_ref() {
        let line = match item {
            Ok(line) => line,
            Err(err) => {
                diagnostics.record(label, &RelayEvent::ReadFailed(&err));
                summary.read_failed = true;
                break;
            }
        };
        summary.lines += 1;
        match sender.push(line) {
            Ok(()) => summary.queued += 1,
            Err(PushError::Full(_)) => {
                summary.dropped += 1;
                diagnostics.record(label, &RelayEvent::QueueFull);
            }
            // The consumer is gone; keep draining so the writer end of the
            // pipe never blocks.
            Err(PushError::Closed(_)) => summary.dropped += 1,
        }
    }
    sender.close();
    drop(splitter);
    diagnostics.flush(label);
    summary
}
