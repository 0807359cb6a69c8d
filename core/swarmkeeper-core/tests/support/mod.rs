//! Scripted fakes for driving the monitoring loop without tmux or a network.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use swarmkeeper_core::protocol::NotificationPayload;
use swarmkeeper_core::{
    Classification, ClassifyError, Classifier, NotificationSink, PaneCapture, RegistryPersistence,
    Result, Session, SessionRegistry, Sleeper, SwarmError,
};

#[derive(Debug, Clone)]
pub struct Frame {
    pub alive: bool,
    pub text: String,
}

pub fn live(text: &str) -> Frame {
    Frame {
        alive: true,
        text: text.to_string(),
    }
}

pub fn dead() -> Frame {
    Frame {
        alive: false,
        text: String::new(),
    }
}

#[derive(Default)]
struct PaneScript {
    frames: VecDeque<Frame>,
    current: Option<Frame>,
}

/// Each `exists` call advances the session to its next scripted frame; the
/// last frame repeats once the script runs out.
#[derive(Clone, Default)]
pub struct FakeCapture {
    panes: Arc<Mutex<HashMap<String, PaneScript>>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    send_fails: Arc<AtomicBool>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, session: &str, frames: Vec<Frame>) {
        let mut panes = self.panes.lock().unwrap();
        panes.insert(
            session.to_string(),
            PaneScript {
                frames: frames.into(),
                current: None,
            },
        );
    }

    pub fn fail_sends(&self) {
        self.send_fails.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl PaneCapture for FakeCapture {
    fn exists(&self, session: &str) -> bool {
        let mut panes = self.panes.lock().unwrap();
        let Some(pane) = panes.get_mut(session) else {
            return false;
        };
        if let Some(next) = pane.frames.pop_front() {
            pane.current = Some(next);
        }
        pane.current.as_ref().map(|frame| frame.alive).unwrap_or(false)
    }

    fn capture(&self, session: &str, _max_lines: usize) -> String {
        let panes = self.panes.lock().unwrap();
        panes
            .get(session)
            .and_then(|pane| pane.current.as_ref())
            .map(|frame| frame.text.clone())
            .unwrap_or_default()
    }

    fn send_keys(&self, session: &str, keys: &str) -> bool {
        if self.send_fails.load(Ordering::SeqCst) {
            return false;
        }
        self.sent
            .lock()
            .unwrap()
            .push((session.to_string(), keys.to_string()));
        true
    }
}

/// Answers from a script, then keeps reporting `working`.
#[derive(Clone, Default)]
pub struct FakeClassifier {
    answers: Arc<Mutex<VecDeque<std::result::Result<Classification, ClassifyError>>>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl FakeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, answer: std::result::Result<Classification, ClassifyError>) {
        self.answers.lock().unwrap().push_back(answer);
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Classifier for FakeClassifier {
    fn classify(&self, text: &str) -> std::result::Result<Classification, ClassifyError> {
        self.seen.lock().unwrap().push(text.to_string());
        self.answers.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(Classification::new(
                swarmkeeper_core::CheckStatus::Working,
                "Still working",
            ))
        })
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    payloads: Arc<Mutex<Vec<NotificationPayload>>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn payloads(&self) -> Vec<NotificationPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn send(&self, payload: &NotificationPayload) -> std::result::Result<(), String> {
        self.payloads.lock().unwrap().push(payload.clone());
        if self.fail {
            Err("handler exited with 1".to_string())
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryPersistence {
    saves: Arc<Mutex<Vec<SessionRegistry>>>,
    fail: bool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    pub fn last_saved(&self) -> Option<SessionRegistry> {
        self.saves.lock().unwrap().last().cloned()
    }
}

impl RegistryPersistence for MemoryPersistence {
    fn persist(&self, registry: &SessionRegistry) -> Result<()> {
        if self.fail {
            return Err(SwarmError::Io {
                context: "Failed to write sessions.json".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.saves.lock().unwrap().push(registry.clone());
        Ok(())
    }
}

/// Never sleeps. Optionally raises the cancel flag after `cancel_after` slices.
#[derive(Clone, Default)]
pub struct NoSleep {
    slept: Arc<Mutex<Vec<Duration>>>,
    cancel: Option<(usize, Arc<AtomicBool>)>,
}

impl NoSleep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(slices: usize, flag: Arc<AtomicBool>) -> Self {
        Self {
            cancel: Some((slices, flag)),
            ..Self::default()
        }
    }

    pub fn slices(&self) -> usize {
        self.slept.lock().unwrap().len()
    }
}

impl Sleeper for NoSleep {
    fn sleep(&self, duration: Duration) {
        let mut slept = self.slept.lock().unwrap();
        slept.push(duration);
        if let Some((after, flag)) = &self.cancel {
            if slept.len() >= *after {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }
}

pub fn registry_of(names: &[&str]) -> SessionRegistry {
    let mut registry = SessionRegistry::new();
    for name in names {
        registry.insert(*name, Session::new(Some("claude".to_string())));
    }
    registry
}
