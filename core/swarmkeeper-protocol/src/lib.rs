//! Notification payload types shared by swarmkeeper and external handlers.
//!
//! Custom notification handlers receive a [`NotificationPayload`] as JSON on
//! stdin. This crate pins that schema so handler authors written in Rust can
//! deserialize the same types the loop serializes.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_EVENT_LOG_CHARS: usize = 50;
pub const MAX_LISTED_EVENTS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Completed,
    Error,
    Idle,
    Stopped,
    Stuck,
}

impl EventType {
    /// Picks an event type from the free-text log of the session's last check.
    pub fn from_log(last_log: &str) -> Self {
        let log = last_log.to_lowercase();
        let has_any = |needles: &[&str]| needles.iter().any(|needle| log.contains(needle));

        if has_any(&["error", "exception", "failed"]) {
            EventType::Error
        } else if has_any(&["complete", "finished", "done"]) {
            EventType::Completed
        } else if has_any(&["stuck", "frozen"]) {
            EventType::Stuck
        } else if has_any(&["idle", "waiting"]) {
            EventType::Idle
        } else {
            EventType::Stopped
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Completed => "completed",
            EventType::Error => "error",
            EventType::Idle => "idle",
            EventType::Stopped => "stopped",
            EventType::Stuck => "stuck",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            EventType::Completed => "Completed",
            EventType::Error => "Error",
            EventType::Idle => "Idle",
            EventType::Stopped => "Stopped",
            EventType::Stuck => "Stuck",
        }
    }

    pub fn message_for(&self, session_name: &str) -> String {
        match self {
            EventType::Error => format!("Session '{}' stopped with error", session_name),
            EventType::Completed => format!("Session '{}' completed successfully", session_name),
            EventType::Stuck => format!("Session '{}' appears to be stuck", session_name),
            EventType::Idle => format!("Session '{}' went idle", session_name),
            EventType::Stopped => format!("Session '{}' has stopped", session_name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    pub status: String,
    pub is_alive: bool,
    #[serde(default)]
    pub last_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentInfo {
    pub name: String,
    pub status: String,
    pub last_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventInfo {
    pub event_type: EventType,
    pub agent: AgentInfo,
    pub message: String,
}

impl EventInfo {
    pub fn new(name: &str, status: &str, last_log: &str) -> Self {
        let event_type = EventType::from_log(last_log);
        Self {
            event_type,
            agent: AgentInfo {
                name: name.to_string(),
                status: status.to_string(),
                last_log: last_log.to_string(),
            },
            message: event_type.message_for(name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub stopped_sessions: usize,
    pub sessions: Vec<SessionInfo>,
}

impl Stats {
    pub fn from_sessions(sessions: Vec<SessionInfo>) -> Self {
        let total_sessions = sessions.len();
        let active_sessions = sessions.iter().filter(|s| s.is_alive).count();
        Self {
            total_sessions,
            active_sessions,
            stopped_sessions: total_sessions - active_sessions,
            sessions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Meta {
    pub timestamp: String,
    pub loop_iteration: u64,
    #[serde(default)]
    pub check_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPayload {
    pub stats: Stats,
    pub events: Vec<EventInfo>,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadError {
    pub code: String,
    pub message: String,
}

impl PayloadError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PayloadError {}

impl NotificationPayload {
    pub fn validate(&self) -> Result<(), PayloadError> {
        if DateTime::parse_from_rfc3339(&self.meta.timestamp).is_err() {
            return Err(PayloadError::new(
                "invalid_timestamp",
                "meta.timestamp must be RFC3339",
            ));
        }

        let stats = &self.stats;
        if stats.total_sessions != stats.sessions.len() {
            return Err(PayloadError::new(
                "inconsistent_stats",
                "total_sessions must equal the number of listed sessions",
            ));
        }
        if stats.active_sessions + stats.stopped_sessions != stats.total_sessions {
            return Err(PayloadError::new(
                "inconsistent_stats",
                "active_sessions + stopped_sessions must equal total_sessions",
            ));
        }

        if let Some(event) = self
            .events
            .iter()
            .find(|event| event.agent.name.trim().is_empty())
        {
            return Err(PayloadError::new(
                "missing_field",
                format!("event '{}' has no agent name", event.message),
            ));
        }

        Ok(())
    }

    /// Title and body for OS-native notification popups.
    pub fn summary(&self) -> (String, String) {
        let title = match self.events.as_slice() {
            [event] => format!("{}: {}", event.event_type.title(), event.agent.name),
            events => {
                let mut counts = std::collections::BTreeMap::new();
                for event in events {
                    *counts.entry(event.event_type.as_str()).or_insert(0usize) += 1;
                }
                let parts = counts
                    .iter()
                    .map(|(event_type, count)| format!("{} {}", count, event_type))
                    .collect::<Vec<_>>();
                format!("SwarmKeeper: {}", parts.join(", "))
            }
        };

        let mut lines = self
            .events
            .iter()
            .take(MAX_LISTED_EVENTS)
            .map(|event| {
                let log: String = event.agent.last_log.chars().take(MAX_EVENT_LOG_CHARS).collect();
                format!("• {}: {}", event.agent.name, log)
            })
            .collect::<Vec<_>>();
        if self.events.len() > MAX_LISTED_EVENTS {
            lines.push(format!(
                "• ... and {} more",
                self.events.len() - MAX_LISTED_EVENTS
            ));
        }
        lines.push(String::new());
        lines.push(format!(
            "{} of {} sessions active",
            self.stats.active_sessions, self.stats.total_sessions
        ));

        (title, lines.join("\n"))
    }
}

pub fn parse_payload(value: Value) -> Result<NotificationPayload, PayloadError> {
    let payload: NotificationPayload = serde_json::from_value(value).map_err(|err| {
        PayloadError::new(
            "invalid_payload",
            format!("notification payload is invalid JSON: {}", err),
        )
    })?;
    payload.validate()?;
    Ok(payload)
}
