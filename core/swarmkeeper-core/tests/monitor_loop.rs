//! Integration tests for the monitoring loop with scripted collaborators.

mod support;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use support::{
    dead, live, registry_of, FakeCapture, FakeClassifier, MemoryPersistence, NoSleep,
    RecordingSink,
};
use swarmkeeper_core::protocol::EventType;
use swarmkeeper_core::{
    CheckStatus, Classification, ClassificationStrategy, ClassifyError, DetectionResult,
    DetectionStrategy, LoopConfig, LoopState, MatchMode, MonitorError, MonitorLoop, PaneCapture,
    PatternSet, PatternStrategy, PendingPolicy, Result, StrategyKind, SwarmError,
    TerminationReason,
};

const PROMPT: &str = "Do you want to continue? [y/n]";

fn prompt_strategy() -> PatternStrategy {
    PatternStrategy::new(
        PatternSet::new(vec!["continue?".to_string()], MatchMode::Fuzzy),
        100,
    )
}

fn auto_type_config(confirm: bool) -> LoopConfig {
    LoopConfig {
        interval: Duration::from_secs(1),
        auto_type: Some("y\\n".to_string()),
        auto_type_max: 2,
        confirm,
        ..LoopConfig::default()
    }
}

fn not_cancelled() -> AtomicBool {
    AtomicBool::new(false)
}

#[test]
fn test_two_consecutive_detections_trigger_one_action() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live(PROMPT), live(PROMPT), live("working...")]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, auto_type_config(true));
    let mut state = LoopState::new(registry_of(&["a"]), monitor.config());

    assert_eq!(monitor.step(&mut state).expect("step 1"), None);
    assert!(capture.sent().is_empty());
    assert!(state.tracker.is_pending("a"));

    assert_eq!(monitor.step(&mut state).expect("step 2"), None);
    assert_eq!(capture.sent(), vec![("a".to_string(), "y\\n".to_string())]);
    assert!(!state.tracker.is_pending("a"));
    assert_eq!(state.controller.count("a"), 1);

    assert_eq!(monitor.step(&mut state).expect("step 3"), None);
    assert_eq!(capture.sent().len(), 1);
    assert_eq!(store.save_count(), 3);
}

#[test]
fn test_single_detection_then_termination_takes_no_action() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live(PROMPT), dead()]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let sleeper = NoSleep::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, auto_type_config(true))
        .with_sleeper(&sleeper);

    let outcome = monitor
        .run(registry_of(&["a"]), &not_cancelled())
        .expect("loop finishes");

    assert_eq!(outcome.reason, TerminationReason::NoSessions);
    assert_eq!(outcome.iterations, 2);
    assert!(capture.sent().is_empty());
    assert!(sink.payloads().is_empty());
    assert!(outcome.registry.is_empty());
}

#[test]
fn test_budget_exhaustion_stops_before_third_injection() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live(PROMPT)]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let sleeper = NoSleep::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, auto_type_config(false))
        .with_sleeper(&sleeper);

    let outcome = monitor
        .run(registry_of(&["a"]), &not_cancelled())
        .expect("loop finishes");

    assert_eq!(
        outcome.reason,
        TerminationReason::BudgetExhausted {
            session: "a".to_string()
        }
    );
    assert_eq!(outcome.iterations, 3);
    assert_eq!(capture.sent().len(), 2);
    // Every confirmed match leaves a stopped check, including the one that hit the ceiling.
    let checks = &outcome.registry.get("a").expect("session kept").checks;
    assert_eq!(checks.len(), 3);
    assert!(checks.iter().all(|check| check.status == CheckStatus::Stopped));
}

#[test]
fn test_budget_exhaustion_still_drops_later_dead_sessions() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live(PROMPT)]);
    capture.script("b", vec![dead()]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let config = LoopConfig {
        auto_type_max: 0,
        ..auto_type_config(false)
    };
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, config);
    let mut state = LoopState::new(registry_of(&["a", "b"]), monitor.config());

    assert_eq!(
        monitor.step(&mut state).expect("step"),
        Some(TerminationReason::BudgetExhausted {
            session: "a".to_string()
        })
    );
    assert!(capture.sent().is_empty());
    assert_eq!(state.registry.names(), vec!["a".to_string()]);
    let saved = store.last_saved().expect("persisted");
    assert!(!saved.contains("b"));
}

#[test]
fn test_dead_session_is_dropped_from_registry_and_tracker() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live(PROMPT), dead()]);
    capture.script("b", vec![live("compiling")]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, auto_type_config(true));
    let mut state = LoopState::new(registry_of(&["a", "b"]), monitor.config());

    monitor.step(&mut state).expect("step 1");
    assert!(state.tracker.is_pending("a"));

    assert_eq!(monitor.step(&mut state).expect("step 2"), None);
    assert!(!state.registry.contains("a"));
    assert!(!state.tracker.is_pending("a"));
    assert_eq!(state.registry.names(), vec!["b".to_string()]);

    let saved = store.last_saved().expect("persisted");
    assert!(!saved.contains("a"));
}

#[test]
fn test_report_only_run_notifies_once_and_stops() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live("line1\nerr found\nline3")]);
    capture.script("b", vec![live("all good")]);
    let strategy = PatternStrategy::new(
        PatternSet::new(vec!["err".to_string()], MatchMode::Literal),
        100,
    );
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let config = LoopConfig {
        auto_type: None,
        ..LoopConfig::default()
    };
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, config);

    let outcome = monitor
        .run(registry_of(&["a", "b"]), &not_cancelled())
        .expect("loop finishes");

    assert_eq!(
        outcome.reason,
        TerminationReason::Detected {
            sessions: vec!["a".to_string()]
        }
    );
    assert_eq!(outcome.iterations, 1);

    let check = outcome
        .registry
        .get("a")
        .and_then(|session| session.last_check())
        .expect("check recorded");
    assert_eq!(check.status, CheckStatus::Stopped);
    assert_eq!(check.log, "Pattern 'err' matched: err found");
    assert!(outcome.registry.get("b").expect("b").checks.is_empty());

    let payloads = sink.payloads();
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];
    assert_eq!(payload.meta.loop_iteration, 1);
    assert_eq!(payload.stats.total_sessions, 2);
    assert_eq!(payload.events.len(), 1);
    assert_eq!(payload.events[0].agent.name, "a");
    assert_eq!(payload.events[0].event_type, EventType::Stopped);
    assert!(payload.validate().is_ok());
}

#[test]
fn test_notification_failure_does_not_fail_the_loop() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live(PROMPT)]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::failing();
    let store = MemoryPersistence::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, LoopConfig::default());

    let outcome = monitor
        .run(registry_of(&["a"]), &not_cancelled())
        .expect("loop finishes");
    assert!(matches!(outcome.reason, TerminationReason::Detected { .. }));
    assert_eq!(sink.payloads().len(), 1);
}

#[test]
fn test_send_keys_failure_leaves_budget_unchanged() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live(PROMPT)]);
    capture.fail_sends();
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, auto_type_config(false));
    let mut state = LoopState::new(registry_of(&["a"]), monitor.config());

    assert_eq!(monitor.step(&mut state).expect("step 1"), None);
    assert_eq!(monitor.step(&mut state).expect("step 2"), None);
    assert_eq!(state.controller.count("a"), 0);
    assert!(sink.payloads().is_empty());
}

#[test]
fn test_retain_policy_confirms_across_a_miss() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live(PROMPT), live("busy"), live(PROMPT)]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let config = LoopConfig {
        pending_policy: PendingPolicy::Retain,
        ..auto_type_config(true)
    };
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, config);
    let mut state = LoopState::new(registry_of(&["a"]), monitor.config());

    for _ in 0..3 {
        monitor.step(&mut state).expect("step");
    }
    assert_eq!(capture.sent().len(), 1);
}

#[test]
fn test_reset_on_miss_requires_fresh_consecutive_matches() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live(PROMPT), live("busy"), live(PROMPT)]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let config = LoopConfig {
        pending_policy: PendingPolicy::ResetOnMiss,
        ..auto_type_config(true)
    };
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, config);
    let mut state = LoopState::new(registry_of(&["a"]), monitor.config());

    for _ in 0..3 {
        monitor.step(&mut state).expect("step");
    }
    assert!(capture.sent().is_empty());
    assert!(state.tracker.is_pending("a"));

    monitor.step(&mut state).expect("step 4");
    assert_eq!(capture.sent().len(), 1);
}

fn classification_strategy(classifier: &FakeClassifier) -> ClassificationStrategy {
    ClassificationStrategy::new(Box::new(classifier.clone()), 100)
}

#[test]
fn test_manager_fast_mode_stops_on_first_dead_session() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live("cargo test running")]);
    capture.script("b", vec![dead()]);
    let classifier = FakeClassifier::new();
    classifier.push(Ok(Classification::new(CheckStatus::Working, "Running tests")));
    let strategy = classification_strategy(&classifier);
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, LoopConfig::default());

    let mut registry = registry_of(&["a", "b"]);
    registry
        .get_mut("b")
        .expect("b")
        .add_check(CheckStatus::Working, "Task finished, all done");

    let outcome = monitor.run(registry, &not_cancelled()).expect("loop finishes");

    assert_eq!(
        outcome.reason,
        TerminationReason::SessionsStopped {
            sessions: vec!["b".to_string()]
        }
    );
    assert!(!outcome.registry.contains("b"));
    let check = outcome
        .registry
        .get("a")
        .and_then(|session| session.last_check())
        .expect("a checked");
    assert_eq!(check.status, CheckStatus::Working);
    assert_eq!(check.log, "Running tests");
    assert_eq!(classifier.seen(), vec!["cargo test running".to_string()]);

    let payloads = sink.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].stats.total_sessions, 2);
    assert_eq!(payloads[0].stats.stopped_sessions, 1);
    assert_eq!(payloads[0].events[0].agent.name, "b");
    assert_eq!(payloads[0].events[0].event_type, EventType::Completed);
}

#[test]
fn test_manager_confirm_mode_reprobes_dead_session() {
    let capture = FakeCapture::new();
    capture.script("a", vec![dead(), dead()]);
    let classifier = FakeClassifier::new();
    let strategy = classification_strategy(&classifier);
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let config = LoopConfig {
        confirm: true,
        ..LoopConfig::default()
    };
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, config);
    let mut state = LoopState::new(registry_of(&["a"]), monitor.config());

    assert_eq!(monitor.step(&mut state).expect("step 1"), None);
    assert!(state.registry.contains("a"));
    assert!(state.tracker.is_pending("a"));
    assert!(sink.payloads().is_empty());

    assert_eq!(
        monitor.step(&mut state).expect("step 2"),
        Some(TerminationReason::SessionsStopped {
            sessions: vec!["a".to_string()]
        })
    );
    assert!(!state.registry.contains("a"));
    assert_eq!(sink.payloads().len(), 1);
}

#[test]
fn test_manager_confirm_mode_clears_pending_when_session_returns() {
    let capture = FakeCapture::new();
    capture.script("a", vec![dead(), live("back again"), dead()]);
    let classifier = FakeClassifier::new();
    let strategy = classification_strategy(&classifier);
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let config = LoopConfig {
        confirm: true,
        ..LoopConfig::default()
    };
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, config);
    let mut state = LoopState::new(registry_of(&["a"]), monitor.config());

    monitor.step(&mut state).expect("step 1");
    monitor.step(&mut state).expect("step 2");
    assert!(!state.tracker.is_pending("a"));
    assert_eq!(
        state.registry.get("a").expect("a").checks.len(),
        1,
        "live observation records a check"
    );

    assert_eq!(monitor.step(&mut state).expect("step 3"), None);
    assert!(state.tracker.is_pending("a"));
}

#[test]
fn test_manager_records_classifier_failures_as_error_checks() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live("output")]);
    let classifier = FakeClassifier::new();
    classifier.push(Err(ClassifyError::Http {
        status: 503,
        body: "unavailable".to_string(),
    }));
    let strategy = classification_strategy(&classifier);
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, LoopConfig::default());
    let mut state = LoopState::new(registry_of(&["a"]), monitor.config());

    assert_eq!(monitor.step(&mut state).expect("step"), None);
    let check = state
        .registry
        .get("a")
        .and_then(|session| session.last_check())
        .expect("check");
    assert_eq!(check.status, CheckStatus::Error);
    assert!(check.log.starts_with("Analysis failed: backend returned HTTP 503"));
}

#[test]
fn test_interrupt_during_sleep_flushes_registry() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live("busy")]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let cancel = Arc::new(AtomicBool::new(false));
    let sleeper = NoSleep::cancelling_after(3, Arc::clone(&cancel));
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, auto_type_config(false))
        .with_sleeper(&sleeper);

    let err = monitor.run(registry_of(&["a"]), &cancel).unwrap_err();

    assert!(matches!(err, MonitorError::Interrupted));
    assert_eq!(sleeper.slices(), 3);
    // One save for the iteration, one for the flush on interrupt.
    assert_eq!(store.save_count(), 2);
    assert!(store.last_saved().expect("saved").contains("a"));
}

#[test]
fn test_cancel_before_first_iteration_still_flushes() {
    let capture = FakeCapture::new();
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, LoopConfig::default());

    let err = monitor
        .run(registry_of(&["a"]), &AtomicBool::new(true))
        .unwrap_err();
    assert!(matches!(err, MonitorError::Interrupted));
    assert_eq!(store.save_count(), 1);
}

#[test]
fn test_persistence_failure_fails_the_loop() {
    let capture = FakeCapture::new();
    capture.script("a", vec![live("busy")]);
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::failing();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, LoopConfig::default());

    let err = monitor
        .run(registry_of(&["a"]), &not_cancelled())
        .unwrap_err();
    assert!(matches!(err, MonitorError::Failed(SwarmError::Io { .. })));
}

struct BrokenStrategy;

impl DetectionStrategy for BrokenStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pattern
    }

    fn detect(&self, _capture: &dyn PaneCapture, session: &str) -> Result<DetectionResult> {
        Err(SwarmError::Detection {
            session: session.to_string(),
            details: "detector crashed".to_string(),
        })
    }
}

#[test]
fn test_strategy_error_fails_after_flush() {
    let capture = FakeCapture::new();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let monitor = MonitorLoop::new(&BrokenStrategy, &capture, &sink, &store, LoopConfig::default());

    let err = monitor
        .run(registry_of(&["a"]), &not_cancelled())
        .unwrap_err();
    assert!(matches!(err, MonitorError::Failed(SwarmError::Detection { .. })));
    assert_eq!(store.save_count(), 1);
}

#[test]
fn test_empty_registry_terminates_immediately() {
    let capture = FakeCapture::new();
    let strategy = prompt_strategy();
    let sink = RecordingSink::new();
    let store = MemoryPersistence::new();
    let monitor = MonitorLoop::new(&strategy, &capture, &sink, &store, LoopConfig::default());

    let outcome = monitor
        .run(registry_of(&[]), &not_cancelled())
        .expect("loop finishes");
    assert_eq!(outcome.reason, TerminationReason::NoSessions);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(store.save_count(), 1);
}
