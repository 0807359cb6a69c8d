//! Per-session budget for automated keystroke injection.

use std::collections::HashMap;

pub const DEFAULT_MAX_INTERVENTIONS: u32 = 2;

#[derive(Debug)]
pub struct InterventionController {
    max: u32,
    counts: HashMap<String, u32>,
}

impl Default for InterventionController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INTERVENTIONS)
    }
}

impl InterventionController {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            counts: HashMap::new(),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn count(&self, session: &str) -> u32 {
        self.counts.get(session).copied().unwrap_or(0)
    }

    /// False once the session has used its whole budget.
    pub fn should_intervene(&self, session: &str) -> bool {
        self.count(session) < self.max
    }

    /// Counts a successfully delivered intervention and returns the new total.
    pub fn record_intervention(&mut self, session: &str) -> u32 {
        let count = self.counts.entry(session.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }
}
