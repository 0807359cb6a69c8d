//! Notification payload assembly and delivery.
//!
//! One [`NotificationPayload`] is built per notification-worthy iteration and
//! handed to a [`NotificationSink`]. Delivery failures are reported back as a
//! message and logged by the caller; they never stop the loop.

use chrono::Utc;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use swarmkeeper_protocol::{EventInfo, Meta, NotificationPayload, SessionInfo, Stats};

use crate::process::run_with_timeout;
use crate::types::Session;

pub const HANDLER_TIMEOUT_SECS: u64 = 30;
const OS_NOTIFY_TIMEOUT_SECS: u64 = 10;

/// A session as seen by this iteration's probe.
#[derive(Debug, Clone, Copy)]
pub struct SessionSnapshot<'a> {
    pub name: &'a str,
    pub session: &'a Session,
    pub is_alive: bool,
}

/// Builds the payload. `event_sessions` names the sessions that triggered
/// this notification; names without a snapshot are skipped.
pub fn build_payload(
    snapshots: &[SessionSnapshot<'_>],
    event_sessions: &[String],
    loop_iteration: u64,
    check_duration_ms: Option<u64>,
) -> NotificationPayload {
    let sessions = snapshots
        .iter()
        .map(|snapshot| {
            let (status, last_log) = snapshot.session.last_status_and_log();
            SessionInfo {
                name: snapshot.name.to_string(),
                status: status.to_string(),
                is_alive: snapshot.is_alive,
                last_log: last_log.to_string(),
            }
        })
        .collect();

    let events = event_sessions
        .iter()
        .filter_map(|name| snapshots.iter().find(|snapshot| snapshot.name == name.as_str()))
        .map(|snapshot| {
            let (status, last_log) = snapshot.session.last_status_and_log();
            EventInfo::new(snapshot.name, status, last_log)
        })
        .collect();

    NotificationPayload {
        stats: Stats::from_sessions(sessions),
        events,
        meta: Meta {
            timestamp: Utc::now().to_rfc3339(),
            loop_iteration,
            check_duration_ms,
        },
    }
}

pub trait NotificationSink {
    fn send(&self, payload: &NotificationPayload) -> Result<(), String>;
}

/// Delivery channel chosen from the `notify_handler` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notifier {
    Disabled,
    OsNative,
    Handler(String),
}

impl Notifier {
    /// `None` picks the OS notifier, an empty string disables notifications,
    /// anything else is a shell command.
    pub fn from_handler(handler: Option<&str>) -> Self {
        match handler {
            None => Notifier::OsNative,
            Some("") => Notifier::Disabled,
            Some(command) => Notifier::Handler(command.to_string()),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Notifier::Disabled)
    }
}

impl NotificationSink for Notifier {
    fn send(&self, payload: &NotificationPayload) -> Result<(), String> {
        match self {
            Notifier::Disabled => Ok(()),
            Notifier::OsNative => {
                notify_os(payload);
                Ok(())
            }
            Notifier::Handler(command) => run_handler(command, payload),
        }
    }
}

fn run_handler(command: &str, payload: &NotificationPayload) -> Result<(), String> {
    let body = serde_json::to_vec_pretty(payload).map_err(|err| err.to_string())?;
    let output = run_with_timeout(
        Command::new("sh").args(["-c", command]),
        Some(body.as_slice()),
        Duration::from_secs(HANDLER_TIMEOUT_SECS),
    )
    .map_err(|err| format!("handler '{}' {}", command, err))?;

    if output.success() {
        debug!(handler = %command, "Notification handler succeeded");
        Ok(())
    } else {
        Err(format!(
            "handler '{}' exited with {}: {}",
            command,
            output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            output.stderr.trim()
        ))
    }
}

/// Desktop popup. Falls back to stderr with a bell when no tool is available.
fn notify_os(payload: &NotificationPayload) {
    let (title, body) = payload.summary();
    let mut command = os_notify_command(&title, &body);
    match run_with_timeout(&mut command, None, Duration::from_secs(OS_NOTIFY_TIMEOUT_SECS)) {
        Ok(output) if output.success() => {
            debug!(title = %title, "OS notification shown");
        }
        Ok(output) => {
            warn!(stderr = %output.stderr.trim(), "OS notification tool failed");
            print_fallback(&title, &body);
        }
        Err(err) => {
            info!(error = %err, "OS notification tool unavailable, printing to stderr");
            print_fallback(&title, &body);
        }
    }
}

#[cfg(target_os = "macos")]
fn os_notify_command(title: &str, body: &str) -> Command {
    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        applescript_escape(body),
        applescript_escape(title)
    );
    let mut command = Command::new("osascript");
    command.args(["-e", &script]);
    command
}

#[cfg(not(target_os = "macos"))]
fn os_notify_command(title: &str, body: &str) -> Command {
    let mut command = Command::new("notify-send");
    command.args(["--app-name=SwarmKeeper", title, body]);
    command
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn print_fallback(title: &str, body: &str) {
    eprintln!("\x07\n{}\n{}", title, body);
}
