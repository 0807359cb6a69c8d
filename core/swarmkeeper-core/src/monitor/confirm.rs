//! Two-step confirmation of detections.
//!
//! With confirmation on, a session has to qualify on two observations before
//! the loop acts. The first qualifying observation parks the result as
//! pending; the next one confirms it and hands back the *current* result.

use std::collections::HashMap;

use crate::detect::DetectionResult;

/// What happens to a pending entry when an iteration does not qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingPolicy {
    /// Keep the pending entry; a later qualifying observation still confirms.
    #[default]
    Retain,
    /// Drop the pending entry; two fresh consecutive observations are needed.
    ResetOnMiss,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// Act now with this result.
    Confirmed(DetectionResult),
    /// First sighting, wait for the next iteration.
    Pending,
}

#[derive(Debug, Default)]
pub struct ConfirmationTracker {
    enabled: bool,
    policy: PendingPolicy,
    pending: HashMap<String, DetectionResult>,
}

impl ConfirmationTracker {
    pub fn new(enabled: bool, policy: PendingPolicy) -> Self {
        Self {
            enabled,
            policy,
            pending: HashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_pending(&self, session: &str) -> bool {
        self.pending.contains_key(session)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Records a qualifying observation.
    pub fn observe(&mut self, result: DetectionResult) -> Confirmation {
        if !self.enabled {
            return Confirmation::Confirmed(result);
        }
        if self.pending.remove(&result.session).is_some() {
            return Confirmation::Confirmed(result);
        }
        self.pending.insert(result.session.clone(), result);
        Confirmation::Pending
    }

    /// Records an iteration where the session did not qualify.
    pub fn miss(&mut self, session: &str) {
        if self.policy == PendingPolicy::ResetOnMiss {
            self.pending.remove(session);
        }
    }

    /// Clears the session regardless of policy.
    pub fn forget(&mut self, session: &str) {
        self.pending.remove(session);
    }
}
