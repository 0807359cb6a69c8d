//! tmux adapter.
//!
//! The monitoring loop only sees the [`PaneCapture`] trait; [`TmuxCapture`]
//! shells out to the `tmux` binary with a fixed ceiling per invocation.

use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, SwarmError};
use crate::keys::{parse_key_sequence, KeyToken};
use crate::process::{run_with_timeout, CommandOutput};

pub const TMUX_TIMEOUT_SECS: u64 = 10;

/// Per-session terminal access used by the detectors and the loop.
pub trait PaneCapture {
    fn exists(&self, session: &str) -> bool;

    /// Last `max_lines` lines of output. Returns an error marker string
    /// instead of failing when the pane cannot be read.
    fn capture(&self, session: &str, max_lines: usize) -> String;

    fn send_keys(&self, session: &str, keys: &str) -> bool;
}

pub fn capture_error_marker(details: &str) -> String {
    format!("[Error capturing session: {}]", details.trim())
}

#[derive(Debug, Clone)]
pub struct TmuxCapture {
    binary: String,
    timeout: Duration,
}

impl Default for TmuxCapture {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
            timeout: Duration::from_secs(TMUX_TIMEOUT_SECS),
        }
    }
}

impl TmuxCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    /// Fails with [`SwarmError::TmuxNotFound`] when tmux cannot be executed.
    pub fn ensure_available(&self) -> Result<()> {
        match self.run(&["-V"]) {
            Ok(output) if output.success() => Ok(()),
            _ => Err(SwarmError::TmuxNotFound),
        }
    }

    pub fn create(&self, session: &str, command: Option<&str>, cwd: &Path) -> Result<()> {
        let cwd = cwd.to_string_lossy();
        let mut args = vec!["new-session", "-d", "-s", session, "-c", cwd.as_ref()];
        if let Some(command) = command.filter(|c| !c.trim().is_empty()) {
            args.push(command);
        }
        self.run_checked(&args)
    }

    pub fn kill(&self, session: &str) -> Result<()> {
        self.run_checked(&["kill-session", "-t", session])
    }

    /// Names of all live tmux sessions.
    pub fn list(&self) -> Vec<String> {
        match self.run(&["list-sessions", "-F", "#{session_name}"]) {
            Ok(output) if output.success() => parse_session_names(&output.stdout),
            Ok(_) => Vec::new(),
            Err(err) => {
                debug!(error = %err, "tmux list-sessions failed");
                Vec::new()
            }
        }
    }

    fn run(&self, args: &[&str]) -> std::result::Result<CommandOutput, String> {
        let mut command = Command::new(&self.binary);
        command.args(args);
        run_with_timeout(&mut command, None, self.timeout).map_err(|err| err.to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<()> {
        let command = format!("tmux {}", args.join(" "));
        match self.run(args) {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(SwarmError::CommandFailed {
                command,
                details: output.stderr.trim().to_string(),
            }),
            Err(details) => Err(SwarmError::CommandFailed { command, details }),
        }
    }

    fn send_token(&self, session: &str, token: &KeyToken) -> std::result::Result<(), String> {
        let args = match token {
            KeyToken::Literal(text) => vec!["send-keys", "-t", session, "-l", text.as_str()],
            KeyToken::Key(name) => vec!["send-keys", "-t", session, name.as_str()],
        };
        match self.run(&args) {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(output.stderr.trim().to_string()),
            Err(err) => Err(err),
        }
    }
}

impl PaneCapture for TmuxCapture {
    fn exists(&self, session: &str) -> bool {
        matches!(self.run(&["has-session", "-t", session]), Ok(output) if output.success())
    }

    fn capture(&self, session: &str, max_lines: usize) -> String {
        let start = format!("-{}", max_lines);
        match self.run(&["capture-pane", "-t", session, "-p", "-S", &start]) {
            Ok(output) if output.success() => output.stdout,
            Ok(output) => capture_error_marker(&output.stderr),
            Err(err) => capture_error_marker(&err),
        }
    }

    fn send_keys(&self, session: &str, keys: &str) -> bool {
        let tokens = parse_key_sequence(keys);
        if tokens.is_empty() {
            return false;
        }
        for token in &tokens {
            if let Err(err) = self.send_token(session, token) {
                warn!(session = %session, token = ?token, error = %err, "tmux send-keys failed");
                return false;
            }
        }
        true
    }
}

fn parse_session_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.split(':').next().unwrap_or_default().trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Number of non-blank lines in captured output.
pub fn count_lines(text: &str) -> usize {
    text.lines().filter(|line| !line.trim().is_empty()).count()
}
