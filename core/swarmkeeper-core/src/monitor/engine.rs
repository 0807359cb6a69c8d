use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::confirm::{Confirmation, ConfirmationTracker, PendingPolicy};
use super::intervention::{InterventionController, DEFAULT_MAX_INTERVENTIONS};
use crate::detect::{DetectionResult, DetectionStrategy, StrategyKind};
use crate::error::{MonitorError, Result};
use crate::notify::{build_payload, NotificationSink, SessionSnapshot};
use crate::registry::{RegistryPersistence, SessionRegistry};
use crate::tmux::PaneCapture;
use crate::types::CheckStatus;

/// Longest uninterrupted sleep; cancellation is checked between slices.
pub const SLEEP_SLICE_MS: u64 = 200;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub interval: Duration,
    /// Keys typed into a session after a confirmed match. `None` means
    /// report-only: notify once and stop.
    pub auto_type: Option<String>,
    pub auto_type_max: u32,
    pub confirm: bool,
    pub pending_policy: PendingPolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            auto_type: None,
            auto_type_max: DEFAULT_MAX_INTERVENTIONS,
            confirm: false,
            pending_policy: PendingPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The session hit the auto-type ceiling.
    BudgetExhausted { session: String },
    /// Report-only run saw confirmed matches.
    Detected { sessions: Vec<String> },
    /// Sessions confirmed gone in manager mode.
    SessionsStopped { sessions: Vec<String> },
    NoSessions,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::BudgetExhausted { session } => {
                write!(f, "auto-type max reached for {}", session)
            }
            TerminationReason::Detected { sessions } => {
                write!(f, "pattern(s) detected in: {}", sessions.join(", "))
            }
            TerminationReason::SessionsStopped { sessions } => {
                write!(f, "stopped session(s): {}", sessions.join(", "))
            }
            TerminationReason::NoSessions => write!(f, "no sessions remaining"),
        }
    }
}

#[derive(Debug)]
pub struct LoopOutcome {
    pub reason: TerminationReason,
    pub iterations: u64,
    pub registry: SessionRegistry,
}

/// Everything the loop mutates between iterations.
#[derive(Debug)]
pub struct LoopState {
    pub registry: SessionRegistry,
    pub tracker: ConfirmationTracker,
    pub controller: InterventionController,
    pub iteration: u64,
}

impl LoopState {
    pub fn new(registry: SessionRegistry, config: &LoopConfig) -> Self {
        Self {
            registry,
            tracker: ConfirmationTracker::new(config.confirm, config.pending_policy),
            controller: InterventionController::new(config.auto_type_max),
            iteration: 0,
        }
    }
}

pub struct MonitorLoop<'a> {
    strategy: &'a dyn DetectionStrategy,
    capture: &'a dyn PaneCapture,
    sink: &'a dyn NotificationSink,
    persistence: &'a dyn RegistryPersistence,
    sleeper: &'a dyn Sleeper,
    config: LoopConfig,
}

impl<'a> MonitorLoop<'a> {
    pub fn new(
        strategy: &'a dyn DetectionStrategy,
        capture: &'a dyn PaneCapture,
        sink: &'a dyn NotificationSink,
        persistence: &'a dyn RegistryPersistence,
        config: LoopConfig,
    ) -> Self {
        Self {
            strategy,
            capture,
            sink,
            persistence,
            sleeper: &ThreadSleeper,
            config,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Runs until a termination condition, cancellation, or an internal fault.
    /// The registry is persisted on every exit path.
    pub fn run(
        &self,
        registry: SessionRegistry,
        cancel: &AtomicBool,
    ) -> std::result::Result<LoopOutcome, MonitorError> {
        let mut state = LoopState::new(registry, &self.config);

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(self.interrupted(&state));
            }

            match self.step(&mut state) {
                Ok(Some(reason)) => {
                    if let Err(err) = self.flush(&state) {
                        return Err(MonitorError::Failed(err));
                    }
                    info!(iterations = state.iteration, reason = %reason, "Monitoring loop finished");
                    return Ok(LoopOutcome {
                        reason,
                        iterations: state.iteration,
                        registry: state.registry,
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    error!(error = %err, "Error during loop execution");
                    if let Err(flush_err) = self.flush(&state) {
                        error!(error = %flush_err, "Registry could not be saved after failure");
                    }
                    return Err(MonitorError::Failed(err));
                }
            }

            info!(
                seconds = self.config.interval.as_secs(),
                "Waiting before next check"
            );
            if self.sleep_interruptible(cancel) {
                return Err(self.interrupted(&state));
            }
        }
    }

    /// One polling pass over every tracked session.
    ///
    /// Returns `Some(reason)` when the loop should stop. The registry is
    /// persisted before returning on every non-error path.
    pub fn step(&self, state: &mut LoopState) -> Result<Option<TerminationReason>> {
        state.iteration += 1;
        if state.registry.is_empty() {
            return Ok(Some(TerminationReason::NoSessions));
        }

        info!(
            iteration = state.iteration,
            sessions = state.registry.len(),
            "Checking sessions"
        );
        let started = Instant::now();
        let mut results = Vec::with_capacity(state.registry.len());
        for name in state.registry.names() {
            results.push(self.strategy.detect(self.capture, &name)?);
        }
        let check_duration_ms = u64::try_from(started.elapsed().as_millis()).ok();

        let termination = match self.strategy.kind() {
            StrategyKind::Pattern => self.apply_pattern_results(state, results, check_duration_ms),
            StrategyKind::Classification => {
                self.apply_classification_results(state, results, check_duration_ms)
            }
        };

        self.persistence.persist(&state.registry)?;

        if termination.is_none() && state.registry.is_empty() {
            info!("No sessions remaining");
            return Ok(Some(TerminationReason::NoSessions));
        }
        Ok(termination)
    }

    fn apply_pattern_results(
        &self,
        state: &mut LoopState,
        results: Vec<DetectionResult>,
        check_duration_ms: Option<u64>,
    ) -> Option<TerminationReason> {
        let mut matched_sessions = Vec::new();
        let mut dead_sessions = Vec::new();
        let mut termination = None;

        for result in results {
            let name = result.session.clone();

            if !result.is_alive {
                warn!(session = %name, "Session is dead");
                dead_sessions.push(name);
                continue;
            }

            // Once the loop is ending, later results only matter for liveness.
            if termination.is_some() {
                continue;
            }

            if !result.matched {
                state.tracker.miss(&name);
                continue;
            }

            info!(
                session = %name,
                pattern = result.matched_pattern.as_deref().unwrap_or("unknown"),
                excerpt = result.matched_text.as_deref().unwrap_or(""),
                "Pattern matched"
            );

            let confirmed = match state.tracker.observe(result) {
                Confirmation::Pending => {
                    info!(session = %name, "Waiting for confirmation on next check");
                    continue;
                }
                Confirmation::Confirmed(confirmed) => confirmed,
            };

            if let Some(session) = state.registry.get_mut(&name) {
                session.add_check(CheckStatus::Stopped, &describe_match(&confirmed));
            }
            matched_sessions.push(name.clone());

            if let Some(keys) = &self.config.auto_type {
                if !state.controller.should_intervene(&name) {
                    warn!(
                        session = %name,
                        max = state.controller.max(),
                        "Auto-type max reached, stopping loop"
                    );
                    termination = Some(TerminationReason::BudgetExhausted { session: name });
                    continue;
                }

                if self.capture.send_keys(&name, keys) {
                    let count = state.controller.record_intervention(&name);
                    info!(
                        session = %name,
                        keys = ?keys,
                        count,
                        max = state.controller.max(),
                        "Auto-typed into session"
                    );
                } else {
                    error!(session = %name, "Failed to send keys");
                }
            }
        }

        for name in &dead_sessions {
            if state.registry.remove(name).is_some() {
                info!(session = %name, "Removed dead session from registry");
            }
            state.tracker.forget(name);
        }

        if termination.is_some() {
            return termination;
        }

        if !matched_sessions.is_empty() && self.config.auto_type.is_none() {
            let liveness = HashMap::new();
            self.notify(
                &state.registry,
                &liveness,
                &matched_sessions,
                state.iteration,
                check_duration_ms,
            );
            return Some(TerminationReason::Detected {
                sessions: matched_sessions,
            });
        }

        None
    }

    fn apply_classification_results(
        &self,
        state: &mut LoopState,
        results: Vec<DetectionResult>,
        check_duration_ms: Option<u64>,
    ) -> Option<TerminationReason> {
        let mut liveness = HashMap::new();
        let mut stopped_sessions = Vec::new();

        for result in results {
            let name = result.session.clone();
            liveness.insert(name.clone(), result.is_alive);

            if result.is_alive {
                state.tracker.forget(&name);
                if let (Some(classification), Some(session)) =
                    (&result.classification, state.registry.get_mut(&name))
                {
                    let check = session.add_check(classification.status, &classification.description);
                    info!(session = %name, status = %check.status, log = %check.log, "Session checked");
                }
                continue;
            }

            match state.tracker.observe(result) {
                Confirmation::Pending => {
                    info!(session = %name, "Session not found, checking again to confirm");
                }
                Confirmation::Confirmed(_) => {
                    warn!(session = %name, "Session is dead");
                    stopped_sessions.push(name);
                }
            }
        }

        if stopped_sessions.is_empty() {
            debug!("All sessions are active");
            return None;
        }

        self.notify(
            &state.registry,
            &liveness,
            &stopped_sessions,
            state.iteration,
            check_duration_ms,
        );
        for name in &stopped_sessions {
            if state.registry.remove(name).is_some() {
                info!(session = %name, "Removed dead session from registry");
            }
        }
        Some(TerminationReason::SessionsStopped {
            sessions: stopped_sessions,
        })
    }

    fn notify(
        &self,
        registry: &SessionRegistry,
        liveness: &HashMap<String, bool>,
        event_sessions: &[String],
        iteration: u64,
        check_duration_ms: Option<u64>,
    ) {
        let snapshots: Vec<SessionSnapshot<'_>> = registry
            .iter()
            .map(|(name, session)| SessionSnapshot {
                name,
                session,
                is_alive: liveness.get(name).copied().unwrap_or(true),
            })
            .collect();
        let payload = build_payload(&snapshots, event_sessions, iteration, check_duration_ms);
        if let Err(err) = self.sink.send(&payload) {
            warn!(error = %err, "Notification delivery failed");
        }
    }

    fn flush(&self, state: &LoopState) -> Result<()> {
        self.persistence.persist(&state.registry)?;
        info!(sessions = state.registry.len(), "Registry saved before exit");
        Ok(())
    }

    fn interrupted(&self, state: &LoopState) -> MonitorError {
        info!("Interrupted by user");
        if let Err(err) = self.flush(state) {
            error!(error = %err, "Registry could not be saved after interrupt");
        }
        MonitorError::Interrupted
    }

    /// Sleeps for the interval in slices. Returns true if cancelled.
    fn sleep_interruptible(&self, cancel: &AtomicBool) -> bool {
        let slice = Duration::from_millis(SLEEP_SLICE_MS);
        let mut remaining = self.config.interval;
        while !remaining.is_zero() {
            if cancel.load(Ordering::SeqCst) {
                return true;
            }
            let chunk = remaining.min(slice);
            self.sleeper.sleep(chunk);
            remaining -= chunk;
        }
        cancel.load(Ordering::SeqCst)
    }
}

fn describe_match(result: &DetectionResult) -> String {
    format!(
        "Pattern '{}' matched: {}",
        result.matched_pattern.as_deref().unwrap_or("unknown"),
        result.matched_text.as_deref().unwrap_or("").trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSleeper {
        slices: Mutex<Vec<Duration>>,
        cancel_after: Option<(usize, &'static AtomicBool)>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            let mut slices = self.slices.lock().expect("lock");
            slices.push(duration);
            if let Some((after, flag)) = self.cancel_after {
                if slices.len() >= after {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    struct NoStrategy;

    impl DetectionStrategy for NoStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Pattern
        }

        fn detect(&self, _capture: &dyn PaneCapture, session: &str) -> Result<DetectionResult> {
            Ok(DetectionResult::unmatched(session, 0))
        }
    }

    struct NoPanes;

    impl PaneCapture for NoPanes {
        fn exists(&self, _session: &str) -> bool {
            true
        }
        fn capture(&self, _session: &str, _max_lines: usize) -> String {
            String::new()
        }
        fn send_keys(&self, _session: &str, _keys: &str) -> bool {
            true
        }
    }

    struct NoSink;

    impl NotificationSink for NoSink {
        fn send(&self, _payload: &swarmkeeper_protocol::NotificationPayload) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    struct NoPersistence;

    impl RegistryPersistence for NoPersistence {
        fn persist(&self, _registry: &SessionRegistry) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sleep_is_sliced() {
        let sleeper = RecordingSleeper {
            slices: Mutex::new(Vec::new()),
            cancel_after: None,
        };
        let config = LoopConfig {
            interval: Duration::from_millis(450),
            ..LoopConfig::default()
        };
        let monitor = MonitorLoop::new(&NoStrategy, &NoPanes, &NoSink, &NoPersistence, config)
            .with_sleeper(&sleeper);

        assert!(!monitor.sleep_interruptible(&AtomicBool::new(false)));
        assert_eq!(
            *sleeper.slices.lock().expect("lock"),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(200),
                Duration::from_millis(50)
            ]
        );
    }

    #[test]
    fn cancellation_interrupts_sleep() {
        static CANCEL: AtomicBool = AtomicBool::new(false);
        let sleeper = RecordingSleeper {
            slices: Mutex::new(Vec::new()),
            cancel_after: Some((2, &CANCEL)),
        };
        let config = LoopConfig {
            interval: Duration::from_secs(60),
            ..LoopConfig::default()
        };
        let monitor = MonitorLoop::new(&NoStrategy, &NoPanes, &NoSink, &NoPersistence, config)
            .with_sleeper(&sleeper);

        assert!(monitor.sleep_interruptible(&CANCEL));
        assert_eq!(sleeper.slices.lock().expect("lock").len(), 2);
    }

    #[test]
    fn empty_registry_terminates_on_first_step() {
        let monitor = MonitorLoop::new(
            &NoStrategy,
            &NoPanes,
            &NoSink,
            &NoPersistence,
            LoopConfig::default(),
        );
        let mut state = LoopState::new(SessionRegistry::new(), monitor.config());
        assert_eq!(
            monitor.step(&mut state).expect("step"),
            Some(TerminationReason::NoSessions)
        );
        assert_eq!(state.iteration, 1);
    }

    #[test]
    fn match_description_names_pattern_and_excerpt() {
        let result = DetectionResult {
            matched: true,
            matched_pattern: Some("Continue?".to_string()),
            matched_text: Some("  Continue? [y/n] ".to_string()),
            ..DetectionResult::unmatched("a", 1)
        };
        assert_eq!(describe_match(&result), "Pattern 'Continue?' matched: Continue? [y/n]");
    }

    #[test]
    fn termination_reasons_render() {
        assert_eq!(
            TerminationReason::Detected {
                sessions: vec!["a".to_string(), "b".to_string()]
            }
            .to_string(),
            "pattern(s) detected in: a, b"
        );
        assert_eq!(TerminationReason::NoSessions.to_string(), "no sessions remaining");
    }
}
