//! Test doubles shared by unit and integration tests.
//!
//! Compiled for the crate's own tests and, through the `test-util` feature,
//! for the integration tests under `tests/`.

mod readers;
mod recording_diagnostics;
mod scripted_sink;

pub use readers::{FailingReader, ReaderProbe, TrackedReader};
pub use recording_diagnostics::RecordingDiagnostics;
pub use scripted_sink::{ScriptedSink, SinkCall, SinkProbe};
