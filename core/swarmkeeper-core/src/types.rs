//! Persisted session records.
//!
//! A [`Session`] is one tracked tmux session; its [`Check`] history is
//! append-only and ordered oldest first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest log line stored on a check.
pub const MAX_LOG_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Working,
    Stopped,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Working => "working",
            CheckStatus::Stopped => "stopped",
            CheckStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub time: DateTime<Utc>,
    pub status: CheckStatus,
    pub log: String,
}

impl Check {
    pub fn new(status: CheckStatus, log: &str) -> Self {
        Self::at(Utc::now(), status, log)
    }

    pub fn at(time: DateTime<Utc>, status: CheckStatus, log: &str) -> Self {
        Check {
            time,
            status,
            log: truncate_chars(log, MAX_LOG_CHARS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl Session {
    pub fn new(command: Option<String>) -> Self {
        Session {
            created: Utc::now(),
            command: command.filter(|c| !c.trim().is_empty()),
            checks: Vec::new(),
        }
    }

    pub fn add_check(&mut self, status: CheckStatus, log: &str) -> &Check {
        self.checks.push(Check::new(status, log));
        &self.checks[self.checks.len() - 1]
    }

    pub fn last_check(&self) -> Option<&Check> {
        self.checks.last()
    }

    /// Status and log of the last check, or `("unknown", "")` before any check.
    pub fn last_status_and_log(&self) -> (&str, &str) {
        match self.last_check() {
            Some(check) => (check.status.as_str(), check.log.as_str()),
            None => ("unknown", ""),
        }
    }
}

/// Truncates on a character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_log_is_bounded() {
        let check = Check::new(CheckStatus::Working, &"é".repeat(150));
        assert_eq!(check.log.chars().count(), MAX_LOG_CHARS);
    }

    #[test]
    fn empty_command_is_stored_as_none() {
        assert_eq!(Session::new(Some("  ".to_string())).command, None);
        assert_eq!(
            Session::new(Some("claude".to_string())).command.as_deref(),
            Some("claude")
        );
    }

    #[test]
    fn last_status_defaults_to_unknown() {
        let mut session = Session::new(None);
        assert_eq!(session.last_status_and_log(), ("unknown", ""));

        session.add_check(CheckStatus::Stopped, "Waiting for input");
        assert_eq!(session.last_status_and_log(), ("stopped", "Waiting for input"));
    }

    #[test]
    fn check_status_serializes_lowercase() {
        let json = serde_json::to_string(&CheckStatus::Error).unwrap();
        assert_eq!(json, "\"error\"");
    }
}
