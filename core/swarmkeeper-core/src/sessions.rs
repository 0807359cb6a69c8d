//! Session lifecycle and one-shot checks.
//!
//! These are the non-looping operations behind the CLI: registering and
//! killing sessions, listing them, and running a single manager or pattern
//! pass. Callers own loading and saving the registry.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::info;

use crate::detect::{DetectionResult, DetectionStrategy};
use crate::error::{Result, SwarmError};
use crate::registry::SessionRegistry;
use crate::tmux::{PaneCapture, TmuxCapture};
use crate::types::{Check, CheckStatus, Session};

static RE_SESSION_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// tmux reserves `.` and `:` for target syntax.
pub fn validate_session_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SwarmError::InvalidSessionName(
            "Session name cannot be empty".to_string(),
        ));
    }
    if name.contains('.') || name.contains(':') {
        return Err(SwarmError::InvalidSessionName(
            "Session name cannot contain '.' or ':'".to_string(),
        ));
    }
    if !RE_SESSION_NAME.is_match(name) {
        return Err(SwarmError::InvalidSessionName(
            "Session name can only contain letters, numbers, hyphens, and underscores".to_string(),
        ));
    }
    Ok(())
}

/// Builds a registry entry for a new session after checking the name is free
/// both in the registry and in tmux.
pub fn create_entry(
    registry: &SessionRegistry,
    capture: &dyn PaneCapture,
    name: &str,
    command: Option<&str>,
) -> Result<Session> {
    validate_session_name(name)?;
    if registry.contains(name) {
        return Err(SwarmError::SessionExists(name.to_string()));
    }
    if capture.exists(name) {
        return Err(SwarmError::TmuxSessionExists(name.to_string()));
    }
    Ok(Session::new(command.map(str::to_string)))
}

/// Creates the tmux session and registers it.
pub fn start_session(
    registry: &mut SessionRegistry,
    tmux: &TmuxCapture,
    name: &str,
    command: Option<&str>,
    cwd: &Path,
) -> Result<()> {
    let session = create_entry(registry, tmux, name, command)?;
    tmux.create(name, command, cwd)?;
    registry.insert(name, session);
    info!(session = %name, command = command.unwrap_or(""), "Started session");
    Ok(())
}

/// Kills the tmux session and drops it from the registry.
pub fn stop_session(registry: &mut SessionRegistry, tmux: &TmuxCapture, name: &str) -> Result<()> {
    if !registry.contains(name) {
        return Err(SwarmError::SessionNotFound(name.to_string()));
    }
    tmux.kill(name)?;
    registry.remove(name);
    info!(session = %name, "Stopped session");
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionListing {
    pub name: String,
    pub command: Option<String>,
    pub is_alive: bool,
    pub last_check: Option<Check>,
}

pub fn list_sessions(registry: &SessionRegistry, capture: &dyn PaneCapture) -> Vec<SessionListing> {
    registry
        .iter()
        .map(|(name, session)| SessionListing {
            name: name.to_string(),
            command: session.command.clone(),
            is_alive: capture.exists(name),
            last_check: session.last_check().cloned(),
        })
        .collect()
}

/// Captured output of every tracked session that is still running.
pub fn dump_sessions(
    registry: &SessionRegistry,
    capture: &dyn PaneCapture,
    lines: usize,
) -> Vec<(String, String)> {
    registry
        .iter()
        .filter(|(name, _)| capture.exists(name))
        .map(|(name, _)| (name.to_string(), capture.capture(name, lines)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub name: String,
    pub status: CheckStatus,
    pub log: String,
    pub is_alive: bool,
}

/// One classification pass: live sessions get a check, dead ones are removed.
pub fn run_manager_once(
    registry: &mut SessionRegistry,
    strategy: &dyn DetectionStrategy,
    capture: &dyn PaneCapture,
) -> Result<Vec<SessionReport>> {
    let mut reports = Vec::with_capacity(registry.len());
    for name in registry.names() {
        let result = strategy.detect(capture, &name)?;
        let (status, log) = match &result.classification {
            Some(classification) => (classification.status, classification.description.clone()),
            None => (CheckStatus::Error, "No classification produced".to_string()),
        };

        if result.is_alive {
            if let Some(session) = registry.get_mut(&name) {
                session.add_check(status, &log);
            }
        } else {
            info!(session = %name, "Session is dead, removing from registry");
            registry.remove(&name);
        }

        reports.push(SessionReport {
            name,
            status,
            log,
            is_alive: result.is_alive,
        });
    }
    Ok(reports)
}

/// One pattern pass over every tracked session. The registry is not changed.
pub fn run_pattern_once(
    registry: &SessionRegistry,
    strategy: &dyn DetectionStrategy,
    capture: &dyn PaneCapture,
) -> Result<Vec<DetectionResult>> {
    registry
        .names()
        .iter()
        .map(|name| strategy.detect(capture, name))
        .collect()
}
