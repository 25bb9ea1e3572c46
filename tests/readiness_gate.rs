mod common;
use crate::common::{init_tracing, with_timeout};

use std::sync::Arc;

use proptest::prelude::*;
use serverwrap::errors::SupervisorError;
use serverwrap::sink::MessageSink;
use serverwrap::supervisor::{Markers, ReadinessGate};
use serverwrap::types::{Message, MessageSource, ReadinessState};

fn stdout(text: &str) -> Message {
    Message::new(MessageSource::Stdout, text)
}

fn gate_with_failure() -> ReadinessGate {
    ReadinessGate::new(Markers::new(r"Done \(", Some("FAILED TO BIND")).unwrap())
}

#[test]
fn test_ready_marker_loads_gate_once() {
    let gate = gate_with_failure();
    assert_eq!(gate.state(), ReadinessState::NotStarted);

    gate.observe(&stdout("Preparing spawn area: 40%"));
    assert_eq!(gate.state(), ReadinessState::NotStarted);

    gate.observe(&stdout("Done (3.2s)! For help, type \"help\""));
    assert_eq!(gate.state(), ReadinessState::Loaded);

    // Terminal: later markers change nothing.
    gate.observe(&stdout("**** FAILED TO BIND TO PORT!"));
    assert!(!gate.fail());
    assert_eq!(gate.state(), ReadinessState::Loaded);
}

#[test]
fn test_failure_marker_fails_gate() {
    let gate = gate_with_failure();
    gate.observe(&Message::new(MessageSource::Stderr, "**** FAILED TO BIND TO PORT!"));
    assert_eq!(gate.state(), ReadinessState::Failed);

    gate.observe(&stdout("Done (1.0s)!"));
    assert_eq!(gate.state(), ReadinessState::Failed);
}

#[test]
fn test_failure_marker_wins_when_line_matches_both() {
    let gate = gate_with_failure();
    gate.observe(&stdout("Done (0.1s)! but FAILED TO BIND"));
    assert_eq!(gate.state(), ReadinessState::Failed);
}

#[test]
fn test_markers_match_stderr_lines() {
    let gate = gate_with_failure();
    gate.observe(&Message::new(MessageSource::Stderr, "Done (9.9s)!"));
    assert_eq!(gate.state(), ReadinessState::Loaded);
}

#[test]
fn test_internal_messages_are_ignored() {
    let gate = gate_with_failure();
    gate.observe(&Message::internal("Done ( FAILED TO BIND"));
    assert_eq!(gate.state(), ReadinessState::NotStarted);
}

#[test]
fn test_fail_only_transitions_from_not_started() {
    let gate = gate_with_failure();
    assert!(gate.fail());
    assert!(!gate.fail());
    assert_eq!(gate.state(), ReadinessState::Failed);

    gate.observe(&stdout("Done (0.5s)!"));
    assert_eq!(gate.state(), ReadinessState::Failed);
}

#[test]
fn test_literal_markers_do_not_interpret_regex_syntax() {
    let gate = ReadinessGate::new(Markers::literal("Done (", Some("[x]")).unwrap());

    gate.observe(&stdout("x"));
    assert_eq!(gate.state(), ReadinessState::NotStarted);

    gate.observe(&stdout("Done (12.0s)!"));
    assert_eq!(gate.state(), ReadinessState::Loaded);
}

#[test]
fn test_invalid_pattern_is_config_error() {
    match Markers::new("Done (", None) {
        Err(SupervisorError::ConfigError(msg)) => {
            assert!(msg.contains("ready_pattern"), "unexpected message: {msg}");
        }
        other => panic!("Expected ConfigError, got: {other:?}"),
    }

    match Markers::new("ready", Some("([")) {
        Err(SupervisorError::ConfigError(msg)) => assert!(msg.contains("failure_pattern")),
        other => panic!("Expected ConfigError, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_every_waiter_sees_the_same_outcome() {
    init_tracing();
    let gate = Arc::new(gate_with_failure());

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait().await })
        })
        .collect();

    tokio::task::yield_now().await;
    // Delivered through the sink interface, the way relays feed it.
    gate.receive(&stdout("Done (2.0s)!"));

    for waiter in waiters {
        let state = with_timeout(waiter).await.unwrap();
        assert_eq!(state, ReadinessState::Loaded);
    }
}

#[tokio::test]
async fn test_wait_returns_immediately_when_resolved() {
    let gate = gate_with_failure();
    gate.fail();
    assert_eq!(with_timeout(gate.wait()).await, ReadinessState::Failed);
}

#[derive(Debug, Clone)]
enum Line {
    Noise,
    Ready,
    Failure,
    Internal,
}

fn line_strategy() -> impl Strategy<Value = Line> {
    prop_oneof![
        4 => Just(Line::Noise),
        1 => Just(Line::Ready),
        1 => Just(Line::Failure),
        1 => Just(Line::Internal),
    ]
}

proptest! {
    // Whatever the output, the gate settles on the first marker line and
    // never moves again.
    #[test]
    fn test_gate_resolves_to_first_marker(lines in proptest::collection::vec(line_strategy(), 0..40)) {
        let gate = gate_with_failure();
        let mut expected = ReadinessState::NotStarted;

        for line in &lines {
            let message = match line {
                Line::Noise => stdout("[Server thread/INFO]: Preparing level"),
                Line::Ready => stdout("Done (1.5s)!"),
                Line::Failure => stdout("FAILED TO BIND TO PORT"),
                Line::Internal => Message::internal("Done (internal)"),
            };
            if expected == ReadinessState::NotStarted {
                expected = match line {
                    Line::Ready => ReadinessState::Loaded,
                    Line::Failure => ReadinessState::Failed,
                    _ => ReadinessState::NotStarted,
                };
            }
            gate.observe(&message);
            prop_assert_eq!(gate.state(), expected);
        }
    }
}
