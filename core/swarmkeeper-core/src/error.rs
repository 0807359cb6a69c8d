//! Error types for swarmkeeper-core operations.
//!
//! Adapter failures that only degrade a single session (capture errors,
//! classifier hiccups, notification delivery) are reported as plain messages
//! or [`ClassifyError`] and never surface as [`SwarmError`]. `SwarmError` is
//! reserved for failures the caller has to act on.

use std::path::PathBuf;

/// All errors that can occur in swarmkeeper-core operations.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error(
        "Classifier API key not configured. Set classifier.api_key in {path} or export SWARMKEEPER_API_KEY"
    )]
    MissingCredentials { path: PathBuf },

    #[error("Classifier client could not be built: {0}")]
    ClassifierSetup(String),

    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid session name: {0}")]
    InvalidSessionName(String),

    #[error("Session name '{0}' already exists in registry")]
    SessionExists(String),

    #[error("Session name '{0}' already exists in tmux")]
    TmuxSessionExists(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Command Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("tmux not found. Please install tmux.")]
    TmuxNotFound,

    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Detection failed for {session}: {details}")]
    Detection { session: String, details: String },
}

/// Convenience type alias for Results using SwarmError.
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Recoverable failure while asking the classification backend.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("unparseable response: {0}")]
    Parse(String),

    #[error("empty response")]
    Empty,

    #[error("status '{0}' is not one of working|stopped")]
    InvalidStatus(String),
}

/// How a monitoring loop run ended when it did not terminate normally.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Interrupted by user")]
    Interrupted,

    #[error("Error during loop execution: {0}")]
    Failed(#[from] SwarmError),
}
