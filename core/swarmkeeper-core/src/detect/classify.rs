//! Output classification through an OpenAI-compatible chat completions API.
//!
//! The backend is asked for a JSON object `{"status": "working|stopped",
//! "log": "..."}`. Anything else is a [`ClassifyError`]; the caller turns that
//! into an `error` check instead of aborting the loop.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::{self, ClassifierConfig};
use crate::error::{ClassifyError, Result, SwarmError};
use crate::types::{truncate_chars, CheckStatus, MAX_LOG_CHARS};

pub const CLASSIFY_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a Meta Manager that analyzes tmux session output.
Determine if the agent is working or stopped, and describe what it was doing.
Return JSON with: {\"status\": \"working|stopped\", \"log\": \"brief description\"}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: CheckStatus,
    pub description: String,
}

impl Classification {
    pub fn new(status: CheckStatus, description: &str) -> Self {
        Self {
            status,
            description: truncate_chars(description, MAX_LOG_CHARS),
        }
    }

    /// The degraded result recorded when the backend could not answer.
    pub fn failed(err: &ClassifyError) -> Self {
        Self::new(CheckStatus::Error, &format!("Analysis failed: {}", err))
    }
}

pub trait Classifier {
    fn classify(&self, text: &str) -> std::result::Result<Classification, ClassifyError>;
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    status: String,
    #[serde(default)]
    log: String,
}

/// Parses the model's JSON answer into a [`Classification`].
pub fn parse_analysis(content: &str) -> std::result::Result<Classification, ClassifyError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ClassifyError::Empty);
    }
    let raw: RawAnalysis =
        serde_json::from_str(trimmed).map_err(|err| ClassifyError::Parse(err.to_string()))?;
    let status = match raw.status.trim() {
        "working" => CheckStatus::Working,
        "stopped" => CheckStatus::Stopped,
        other => return Err(ClassifyError::InvalidStatus(other.to_string())),
    };
    Ok(Classification::new(status, &raw.log))
}

fn parse_completion(body: &Value) -> std::result::Result<Classification, ClassifyError> {
    let content = body
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .ok_or(ClassifyError::Empty)?;
    parse_analysis(content)
}

/// Blocking client for the classification backend.
pub struct OpenAiClassifier {
    http_client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl std::fmt::Debug for OpenAiClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClassifier")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClassifier {
    /// Builds the client. A missing API key is a configuration error.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let api_key = match config.resolved_api_key() {
            Some(key) => key,
            None => {
                return Err(SwarmError::MissingCredentials {
                    path: config::config_path().unwrap_or_default(),
                })
            }
        };

        let http_client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(CLASSIFY_TIMEOUT_SECS))
            .user_agent(concat!("swarmkeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SwarmError::ClassifierSetup(err.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt: config::load_prompt_override()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }

    fn request_body(&self, text: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": text},
            ],
        })
    }
}

impl Classifier for OpenAiClassifier {
    fn classify(&self, text: &str) -> std::result::Result<Classification, ClassifyError> {
        debug!(model = %self.model, chars = text.len(), "Sending classification request");
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(text))
            .send()
            .map_err(|err| ClassifyError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| ClassifyError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(ClassifyError::Http {
                status: status.as_u16(),
                body: truncate_chars(&body, 200),
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|err| ClassifyError::Parse(err.to_string()))?;
        parse_completion(&value)
    }
}
