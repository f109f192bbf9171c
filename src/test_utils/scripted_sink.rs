//! A [`Sink`] whose answers are scripted in advance.

use std::{collections::VecDeque, io, sync::Arc, thread, time::Duration};

use parking_lot::Mutex;

use crate::sink::{Sink, SinkError};

/// One call made against a [`ScriptedSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkCall {
    IsConnected,
    Connect,
    Disconnect,
    Send(String),
}

#[derive(Default)]
struct Recorded {
    calls: Vec<SinkCall>,
    delivered: Vec<String>,
}

/// Read-only view of what a [`ScriptedSink`] was asked to do.
#[derive(Clone, Default)]
pub struct SinkProbe {
    recorded: Arc<Mutex<Recorded>>,
}

impl SinkProbe {
    /// Every call in the order it was made.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.recorded.lock().calls.clone()
    }

    /// Lines whose `send` succeeded, in order.
    pub fn delivered(&self) -> Vec<String> {
        self.recorded.lock().delivered.clone()
    }

    pub fn connects(&self) -> usize {
        self.count(|c| matches!(c, SinkCall::Connect))
    }

    pub fn disconnects(&self) -> usize {
        self.count(|c| matches!(c, SinkCall::Disconnect))
    }

    /// Number of send attempts, successful or not.
    pub fn sends(&self) -> usize {
        self.count(|c| matches!(c, SinkCall::Send(_)))
    }

    fn count(&self, pred: impl Fn(&SinkCall) -> bool) -> usize {
        self.recorded.lock().calls.iter().filter(|c| pred(c)).count()
    }
}

/// Sink driven by per-method scripts.
///
/// Each method consumes the next scripted answer and falls back to a default
/// once its script runs out: `is_connected` answers `true`, while `connect`,
/// `send` and `disconnect` succeed.
#[derive(Default)]
pub struct ScriptedSink {
    // `is_connected` takes `&self`, so its script needs interior mutability.
    connected: Mutex<VecDeque<bool>>,
    connect_ok: VecDeque<bool>,
    send_ok: VecDeque<bool>,
    disconnect_ok: VecDeque<bool>,
    send_delay: Option<Duration>,
    max_line_len: Option<usize>,
    probe: SinkProbe,
}

fn scripted_failure(what: &str) -> SinkError {
    SinkError::Io(io::Error::other(format!("scripted {what} failure")))
}

impl ScriptedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers for successive `is_connected` calls.
    pub fn connected_sequence(mut self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.connected.get_mut().extend(answers);
        self
    }

    /// Results for successive `connect` calls; `false` fails.
    pub fn connect_results(mut self, results: impl IntoIterator<Item = bool>) -> Self {
        self.connect_ok.extend(results);
        self
    }

    /// Results for successive `send` calls; `false` fails.
    pub fn send_results(mut self, results: impl IntoIterator<Item = bool>) -> Self {
        self.send_ok.extend(results);
        self
    }

    /// Results for successive `disconnect` calls; `false` fails.
    pub fn disconnect_results(mut self, results: impl IntoIterator<Item = bool>) -> Self {
        self.disconnect_ok.extend(results);
        self
    }

    /// Sleep before every send to simulate a slow collector.
    pub fn send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    /// Refuse lines longer than `limit` bytes with
    /// [`SinkError::FrameTooLarge`], without consuming a send answer.
    pub fn reject_lines_longer_than(mut self, limit: usize) -> Self {
        self.max_line_len = Some(limit);
        self
    }

    pub fn probe(&self) -> SinkProbe {
        self.probe.clone()
    }

    fn record(&self, call: SinkCall) {
        self.probe.recorded.lock().calls.push(call);
    }
}

impl Sink for ScriptedSink {
    fn connect(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Connect);
        if self.connect_ok.pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(scripted_failure("connect"))
        }
    }

    fn disconnect(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Disconnect);
        if self.disconnect_ok.pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(scripted_failure("disconnect"))
        }
    }

    fn is_connected(&self) -> bool {
        self.record(SinkCall::IsConnected);
        self.connected.lock().pop_front().unwrap_or(true)
    }

    fn send(&mut self, line: &str) -> Result<(), SinkError> {
        self.record(SinkCall::Send(line.to_owned()));
        if let Some(delay) = self.send_delay {
            thread::sleep(delay);
        }
        if let Some(limit) = self.max_line_len
            && line.len() > limit
        {
            return Err(SinkError::FrameTooLarge {
                size: line.len(),
                limit,
            });
        }
        if self.send_ok.pop_front().unwrap_or(true) {
            self.probe.recorded.lock().delivered.push(line.to_owned());
            Ok(())
        } else {
            Err(scripted_failure("send"))
        }
    }
}
