//! Send/Sync guarantees for types shared across forwarder threads.

use log2fluent::{
    Diagnostics, ForwarderHandle, LogDiagnostics, RateLimitedWarner, RelayReceiver, RelaySender,
    fluent::{FluentSink, FluentSinkConfig},
    test_utils::{RecordingDiagnostics, ScriptedSink},
};
use rstest::rstest;
use static_assertions::{assert_impl_all, assert_obj_safe};

#[rstest]
fn queue_ends_cross_threads() {
    assert_impl_all!(RelaySender: Send);
    assert_impl_all!(RelayReceiver: Send);
}

#[rstest]
fn diagnostics_are_shareable() {
    assert_obj_safe!(Diagnostics);
    assert_impl_all!(LogDiagnostics: Send, Sync);
    assert_impl_all!(RecordingDiagnostics: Send, Sync);
    assert_impl_all!(RateLimitedWarner: Send, Sync);
}

#[rstest]
fn sinks_move_to_the_writer_thread() {
    assert_impl_all!(FluentSink: Send);
    assert_impl_all!(ScriptedSink: Send);
    assert_impl_all!(FluentSinkConfig: Send, Sync, Clone);
}

#[rstest]
fn handle_is_shareable() {
    assert_impl_all!(ForwarderHandle: Send, Sync);
}
