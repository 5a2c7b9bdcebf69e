//! Integration tests for trace session lifecycle.
//!
//! Tests BEGIN/END ordering, per-probe failure isolation, exit draining,
//! stop semantics and determinism.

use std::sync::Arc;

use axsonde::{
    Action, ActionError, CmpOp, Error, Expr, LifecyclePhase, LocalProcess, MatchStrictness, Predicate,
    ProbeEvent, ProbeRegistry, ProbeSpec, SessionConfig, SessionState, TraceSession, VecSink,
};

fn greeting_program() -> Vec<ProbeSpec> {
    vec![
        ProbeSpec::begin().then(Action::print("Hello World", vec![])),
        ProbeSpec::matching("Hello*:::you").with_args(2).then(Action::print(
            "who=%s",
            vec![Expr::copy_str(0, Expr::Arg(1))],
        )),
        ProbeSpec::end().then(Action::print("Goodbye World", vec![])),
    ]
}

fn session(specs: Vec<ProbeSpec>) -> (TraceSession, VecSink) {
    let registry = ProbeRegistry::load(specs, MatchStrictness::default()).unwrap();
    let sink = VecSink::new();
    let session = TraceSession::new(SessionConfig::default(), registry, sink.clone());
    (session, sink)
}

fn name_event(target: &Arc<LocalProcess>, addr: u64, len: u64) -> ProbeEvent {
    ProbeEvent::new("Hello77:::you")
        .with_pointer(addr, target.clone())
        .with_scalar(len)
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_begin_event_end_order() {
    let target = Arc::new(LocalProcess::new(77));
    let addr = target.map(b"alice\0".to_vec());
    let (mut s, sink) = session(greeting_program());

    assert_eq!(s.state(), SessionState::Uninitialized);
    s.start().unwrap();
    assert_eq!(s.state(), SessionState::Running);
    s.on_event(&name_event(&target, addr, 6)).unwrap();
    s.stop().unwrap();
    assert_eq!(s.state(), SessionState::Terminated);

    assert_eq!(sink.lines(), ["Hello World", "who=alice", "Goodbye World"]);
}

#[test]
fn test_event_before_start_rejected() {
    let (mut s, sink) = session(greeting_program());
    let err = s.on_event(&ProbeEvent::new("Hello1:::you")).unwrap_err();
    assert_eq!(err, Error::NotRunning(SessionState::Uninitialized));
    assert!(sink.is_empty());
    assert_eq!(s.stats().events_rejected, 1);
}

#[test]
fn test_start_twice() {
    let (mut s, _sink) = session(vec![]);
    s.start().unwrap();
    assert_eq!(s.start(), Err(Error::AlreadyStarted(SessionState::Running)));
}

#[test]
fn test_stop_before_start() {
    let (mut s, _sink) = session(vec![]);
    assert_eq!(s.stop(), Err(Error::NotStarted));
}

#[test]
fn test_stop_is_idempotent() {
    let (mut s, sink) = session(greeting_program());
    s.start().unwrap();
    s.stop().unwrap();
    s.stop().unwrap();
    assert_eq!(sink.lines(), ["Hello World", "Goodbye World"]);
}

#[test]
fn test_register_only_before_start() {
    let (mut s, _sink) = session(vec![]);
    s.register(ProbeSpec::matching("a:b")).unwrap();
    assert_eq!(s.registry().len(), 1);
    s.start().unwrap();
    assert_eq!(
        s.register(ProbeSpec::matching("a:c")),
        Err(Error::RegistryFrozen)
    );
}

/// Predicate comparing a string with an integer; fails every time it runs.
fn mismatched_predicate() -> Predicate {
    Predicate::compare(Expr::Str("x".into()), CmpOp::Eq, Expr::Const(1))
}

#[test]
fn test_begin_failure_keeps_session_uninitialized() {
    let begin = ProbeSpec::begin()
        .when(mismatched_predicate())
        .then(Action::print("never", vec![]));
    let (mut s, sink) = session(vec![begin]);

    let err = s.start().unwrap_err();
    assert_eq!(
        err,
        Error::Lifecycle {
            phase: LifecyclePhase::Begin,
            source: ActionError::TypeMismatch,
        }
    );
    assert_eq!(s.state(), SessionState::Uninitialized);
    assert!(sink.is_empty());
    assert_eq!(s.stop(), Err(Error::NotStarted));
}

#[test]
fn test_end_failure_still_terminates() {
    let end = ProbeSpec::end()
        .when(mismatched_predicate())
        .then(Action::print("never", vec![]));
    let (mut s, sink) = session(vec![end]);
    s.start().unwrap();

    let err = s.stop().unwrap_err();
    assert_eq!(
        err,
        Error::Lifecycle {
            phase: LifecyclePhase::End,
            source: ActionError::TypeMismatch,
        }
    );
    assert_eq!(s.state(), SessionState::Terminated);
    assert!(sink.is_empty());
}

// =============================================================================
// Failure Isolation Tests
// =============================================================================

#[test]
fn test_unterminated_copy_becomes_diagnostic() {
    let target = Arc::new(LocalProcess::new(77));
    let addr = target.map(b"alice\0".to_vec());
    let (mut s, sink) = session(greeting_program());

    s.start().unwrap();
    s.on_event(&name_event(&target, addr, 3)).unwrap();
    s.on_event(&name_event(&target, addr, 6)).unwrap();
    s.stop().unwrap();

    let lines = sink.lines();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Hello World");
    assert!(lines[1].starts_with("error: probe #2 Hello*:::you on Hello77:::you"));
    assert!(!lines.iter().any(|l| l == "who=ali"));
    assert_eq!(lines[2], "who=alice");
    assert_eq!(lines[3], "Goodbye World");
    assert_eq!(s.stats().diagnostics, 1);
}

#[test]
fn test_failing_probe_does_not_block_others() {
    let specs = vec![
        ProbeSpec::matching("p:::x")
            .with_args(1)
            .then(Action::print("%s", vec![Expr::copy_str(0, Expr::Const(8))])),
        ProbeSpec::matching("p:::*").then(Action::print("second", vec![])),
    ];
    let (mut s, sink) = session(specs);
    s.start().unwrap();
    s.on_event(&ProbeEvent::new("p:::x").with_scalar(0x10)).unwrap();

    let lines = sink.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("error: "));
    assert_eq!(lines[1], "second");
}

#[test]
fn test_predicate_filters_events() {
    let specs = vec![ProbeSpec::matching("p:::x")
        .with_args(1)
        .when(Predicate::compare(Expr::Arg(0), CmpOp::Eq, Expr::Const(1)))
        .then(Action::print("one", vec![]))];
    let (mut s, sink) = session(specs);
    s.start().unwrap();
    for v in [0, 1, 2, 1] {
        s.on_event(&ProbeEvent::new("p:::x").with_scalar(v)).unwrap();
    }
    assert_eq!(sink.lines(), ["one", "one"]);
    assert_eq!(s.stats().events_seen, 4);
    assert_eq!(s.stats().firings, 2);
}

// =============================================================================
// Exit and Stop Signal Tests
// =============================================================================

#[test]
fn test_exit_drains_and_runs_end_once() {
    let specs = vec![
        ProbeSpec::matching("p:::x")
            .then(Action::print("fired", vec![]))
            .then(Action::Exit(2)),
        ProbeSpec::matching("p:::*").then(Action::print("same event", vec![])),
        ProbeSpec::end().then(Action::print("END", vec![])),
    ];
    let (mut s, sink) = session(specs);
    let events: Vec<_> = (0..5).map(|_| ProbeEvent::new("p:::x")).collect();

    assert_eq!(s.run(&events), Ok(Some(2)));
    assert_eq!(s.state(), SessionState::Terminated);
    assert_eq!(s.exit_status(), Some(2));
    assert_eq!(sink.lines(), ["fired", "same event", "END"]);

    assert_eq!(
        s.on_event(&ProbeEvent::new("p:::x")),
        Err(Error::NotRunning(SessionState::Terminated))
    );
}

#[test]
fn test_exit_in_begin() {
    let specs = vec![
        ProbeSpec::begin().then(Action::Exit(0)),
        ProbeSpec::matching("p:::x").then(Action::print("never", vec![])),
    ];
    let (mut s, sink) = session(specs);
    s.start().unwrap();
    assert_eq!(s.state(), SessionState::Draining);
    assert!(s.on_event(&ProbeEvent::new("p:::x")).is_err());
    s.stop().unwrap();
    assert!(sink.is_empty());
    assert_eq!(s.exit_status(), Some(0));
}

#[test]
fn test_stop_signal_from_other_thread() {
    let specs = vec![
        ProbeSpec::matching("p:::x").then(Action::print("x", vec![])),
        ProbeSpec::end().then(Action::print("END", vec![])),
    ];
    let (s, sink) = session(specs);
    let session = Arc::new(spin::Mutex::new(s));
    session.lock().start().unwrap();

    let signal = session.lock().stop_signal();
    std::thread::spawn(move || signal.raise()).join().unwrap();
    assert_eq!(session.lock().state(), SessionState::Draining);

    let err = session.lock().on_event(&ProbeEvent::new("p:::x")).unwrap_err();
    assert_eq!(err, Error::NotRunning(SessionState::Draining));
    session.lock().stop().unwrap();
    assert_eq!(sink.lines(), ["END"]);
}

#[test]
fn test_stop_after_signal_runs_end_once() {
    let specs = vec![ProbeSpec::end().then(Action::print("END", vec![]))];
    let (mut s, sink) = session(specs);
    s.start().unwrap();

    s.stop_signal().raise();
    assert_eq!(s.state(), SessionState::Draining);
    s.stop().unwrap();
    s.stop().unwrap();
    assert_eq!(s.state(), SessionState::Terminated);
    assert_eq!(sink.lines(), ["END"]);
}

#[test]
fn test_concurrent_events_serialized() {
    let specs = vec![
        ProbeSpec::matching("p:::*").then(Action::print("%s", vec![Expr::ProbeName])),
    ];
    let (s, sink) = session(specs);
    let session = Arc::new(spin::Mutex::new(s));
    session.lock().start().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let id = format!("p:::t{}e{}", t, i);
                    session.lock().on_event(&ProbeEvent::new(&id)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    session.lock().stop().unwrap();
    assert_eq!(sink.len(), 100);
}

// =============================================================================
// Determinism and Drop Tests
// =============================================================================

#[test]
fn test_same_events_same_output() {
    let target = Arc::new(LocalProcess::new(77));
    let alice = target.map(b"alice\0".to_vec());
    let bob = target.map(b"bob\0".to_vec());
    let events = vec![
        name_event(&target, alice, 6),
        name_event(&target, bob, 2),
        name_event(&target, bob, 4),
        ProbeEvent::new("Other:::you"),
    ];

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let (mut s, sink) = session(greeting_program());
        s.run(&events).unwrap();
        outputs.push(sink.lines());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0].len(), 5);
}

#[test]
fn test_drop_runs_end() {
    let (mut s, sink) = session(greeting_program());
    s.start().unwrap();
    drop(s);
    assert_eq!(sink.lines(), ["Hello World", "Goodbye World"]);
}

#[test]
fn test_config_strictness_applies_to_registry() {
    let registry = ProbeRegistry::load(
        vec![ProbeSpec::matching("mod:*").then(Action::print("hit", vec![]))],
        MatchStrictness::WildcardTrailing,
    )
    .unwrap();
    let sink = VecSink::new();
    let config = SessionConfig::new().with_match_strictness(MatchStrictness::Exact);
    let mut s = TraceSession::new(config, registry, sink.clone());

    assert_eq!(s.registry().strictness(), MatchStrictness::Exact);
    s.start().unwrap();
    s.on_event(&ProbeEvent::new("mod:fn:entry")).unwrap();
    s.on_event(&ProbeEvent::new("mod:fn")).unwrap();
    assert_eq!(sink.lines(), ["hit"]);
}
