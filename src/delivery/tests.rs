//! Tests for the delivery loop's retry and teardown policy.

use std::sync::Arc;

use rstest::{fixture, rstest};

use super::*;
use crate::{
    diagnostics::RelayEventKind,
    queue::relay_queue,
    test_utils::{RecordingDiagnostics, ScriptedSink, SinkCall},
};

#[fixture]
fn diagnostics() -> RecordingDiagnostics {
    RecordingDiagnostics::new()
}

fn delivery_loop(sink: ScriptedSink, diagnostics: &RecordingDiagnostics) -> DeliveryLoop<ScriptedSink> {
    DeliveryLoop::new("test", sink, Arc::new(diagnostics.clone()))
}

fn run_lines(
    sink: ScriptedSink,
    diagnostics: &RecordingDiagnostics,
    lines: &[&str],
) -> DeliverySummary {
    let (tx, rx) = relay_queue(lines.len());
    for line in lines {
        tx.push((*line).to_owned()).expect("queue sized for every line");
    }
    drop(tx);
    delivery_loop(sink, diagnostics).run(rx)
}

#[rstest]
fn connected_sink_sends_once(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new();
    let probe = sink.probe();
    let mut delivery = delivery_loop(sink, &diagnostics);

    assert_eq!(delivery.deliver("hello"), Delivery::Sent);
    assert_eq!(
        probe.calls(),
        [SinkCall::IsConnected, SinkCall::Send("hello".into())]
    );
    assert_eq!(delivery.state(), ConnectionState::Connected);
    assert!(diagnostics.kinds().is_empty());
}

#[rstest]
fn disconnected_sink_connects_then_sends_exactly_once(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new().connected_sequence([false]);
    let probe = sink.probe();
    let mut delivery = delivery_loop(sink, &diagnostics);

    assert_eq!(delivery.deliver("hello"), Delivery::Sent);
    assert_eq!(probe.connects(), 1);
    assert_eq!(probe.sends(), 1);
    assert_eq!(diagnostics.kinds(), [RelayEventKind::Reconnected]);
}

#[rstest]
fn failed_connect_drops_without_sending(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new()
        .connected_sequence([false])
        .connect_results([false]);
    let probe = sink.probe();
    let mut delivery = delivery_loop(sink, &diagnostics);

    assert_eq!(
        delivery.deliver("lost"),
        Delivery::Dropped(DropReason::ConnectFailed)
    );
    assert_eq!(probe.sends(), 0);
    assert_eq!(delivery.state(), ConnectionState::Disconnected);
    assert_eq!(diagnostics.kinds(), [RelayEventKind::ConnectFailed]);
}

#[rstest]
fn send_failure_reconnects_and_retries_once(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new().send_results([false]);
    let probe = sink.probe();
    let mut delivery = delivery_loop(sink, &diagnostics);

    assert_eq!(delivery.deliver("again"), Delivery::SentAfterReconnect);
    assert_eq!(
        probe.calls(),
        [
            SinkCall::IsConnected,
            SinkCall::Send("again".into()),
            SinkCall::Disconnect,
            SinkCall::Connect,
            SinkCall::Send("again".into()),
        ]
    );
    assert_eq!(probe.delivered(), ["again"]);
    assert_eq!(
        diagnostics.kinds(),
        [RelayEventKind::SendFailed, RelayEventKind::Reconnected]
    );
}

#[rstest]
fn failed_reconnect_drops_after_one_attempt(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new()
        .send_results([false])
        .connect_results([false]);
    let probe = sink.probe();
    let mut delivery = delivery_loop(sink, &diagnostics);

    assert_eq!(
        delivery.deliver("lost"),
        Delivery::Dropped(DropReason::ReconnectFailed)
    );
    assert_eq!(probe.connects(), 1);
    assert_eq!(probe.sends(), 1);
    assert_eq!(delivery.state(), ConnectionState::Disconnected);
}

#[rstest]
fn failed_retry_drops_and_forces_new_handshake(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new().send_results([false, false]);
    let probe = sink.probe();
    let mut delivery = delivery_loop(sink, &diagnostics);

    assert_eq!(
        delivery.deliver("lost"),
        Delivery::Dropped(DropReason::RetryFailed)
    );
    assert_eq!(probe.connects(), 1, "never more than one reconnect per line");
    assert_eq!(probe.sends(), 2, "never more than two sends per line");
    assert_eq!(probe.disconnects(), 2);
    assert_eq!(probe.calls().last(), Some(&SinkCall::Disconnect));
    assert_eq!(delivery.state(), ConnectionState::Disconnected);
    assert_eq!(diagnostics.count(RelayEventKind::RetryFailed), 1);
}

#[rstest]
fn run_disconnects_once_after_draining(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new();
    let probe = sink.probe();
    let summary = run_lines(sink, &diagnostics, &["a", "b", "c"]);

    assert_eq!(summary, DeliverySummary { sent: 3, dropped: 0 });
    assert_eq!(probe.delivered(), ["a", "b", "c"]);
    assert_eq!(probe.disconnects(), 1);
    assert_eq!(probe.calls().last(), Some(&SinkCall::Disconnect));
}

#[rstest]
fn run_on_empty_queue_still_disconnects(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new();
    let probe = sink.probe();
    let summary = run_lines(sink, &diagnostics, &[]);

    assert_eq!(summary, DeliverySummary::default());
    assert_eq!(probe.calls(), [SinkCall::Disconnect]);
}

#[rstest]
fn teardown_disconnect_error_is_reported_not_raised(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new().disconnect_results([false]);
    let summary = run_lines(sink, &diagnostics, &["a"]);

    assert_eq!(summary.sent, 1);
    assert_eq!(diagnostics.kinds(), [RelayEventKind::DisconnectFailed]);
}

#[rstest]
fn reconnect_policy_restarts_for_next_line(diagnostics: RecordingDiagnostics) {
    // line1 is sent, line2 finds the sink down and cannot connect, line3
    // finds it up again.
    let sink = ScriptedSink::new()
        .connected_sequence([true, false, true])
        .connect_results([false]);
    let probe = sink.probe();
    let summary = run_lines(sink, &diagnostics, &["line1", "line2", "line3"]);

    assert_eq!(summary, DeliverySummary { sent: 2, dropped: 1 });
    assert_eq!(probe.delivered(), ["line1", "line3"]);
}

#[rstest]
fn reconnect_after_send_error_loses_nothing(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new()
        .connected_sequence([true, false, true])
        .send_results([false]);
    let probe = sink.probe();
    let summary = run_lines(sink, &diagnostics, &["line1", "line2", "line3"]);

    assert_eq!(summary, DeliverySummary { sent: 3, dropped: 0 });
    assert_eq!(probe.delivered(), ["line1", "line2", "line3"]);
    assert_eq!(probe.connects(), 2);
    assert_eq!(probe.disconnects(), 2);
}

#[rstest]
fn two_send_errors_drop_only_the_first_line(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new()
        .connected_sequence([true, false, true])
        .send_results([false, false]);
    let probe = sink.probe();
    let summary = run_lines(sink, &diagnostics, &["line1", "line2", "line3"]);

    assert_eq!(summary, DeliverySummary { sent: 2, dropped: 1 });
    assert_eq!(probe.delivered(), ["line2", "line3"]);
    assert_eq!(probe.connects(), 2);
    assert_eq!(probe.disconnects(), 3);
}

#[rstest]
fn rejected_line_is_dropped_without_touching_the_connection(
    diagnostics: RecordingDiagnostics,
) {
    let sink = ScriptedSink::new().reject_lines_longer_than(8);
    let probe = sink.probe();
    let mut delivery = delivery_loop(sink, &diagnostics);

    assert_eq!(
        delivery.deliver("far too long for the sink"),
        Delivery::Dropped(DropReason::Rejected)
    );
    assert_eq!(delivery.deliver("short"), Delivery::Sent);

    assert_eq!(probe.connects(), 0);
    assert_eq!(probe.disconnects(), 0);
    assert_eq!(probe.sends(), 2);
    assert_eq!(probe.delivered(), ["short"]);
    assert_eq!(delivery.state(), ConnectionState::Connected);
    assert_eq!(diagnostics.kinds(), [RelayEventKind::LineRejected]);
}

#[rstest]
fn rejected_line_counts_as_dropped_in_run(diagnostics: RecordingDiagnostics) {
    let sink = ScriptedSink::new().reject_lines_longer_than(5);
    let probe = sink.probe();
    let summary = run_lines(sink, &diagnostics, &["one", "oversized", "two"]);

    assert_eq!(summary, DeliverySummary { sent: 2, dropped: 1 });
    assert_eq!(probe.delivered(), ["one", "two"]);
    assert_eq!(probe.disconnects(), 1);
}
