//! Configuration loading and path resolution.
//!
//! Everything lives under `~/.swarmkeeper` (or `$SWARMKEEPER_HOME`):
//! - `config.toml`: classifier backend and loop defaults
//! - `sessions.json`: the session registry
//! - `prompt.md`: optional system prompt override for the classifier
//! - `logs/`: rolling log files written by the CLI

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, SwarmError};

pub const HOME_ENV: &str = "SWARMKEEPER_HOME";
pub const API_KEY_ENV: &str = "SWARMKEEPER_API_KEY";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const CONFIG_FILE: &str = "config.toml";
const SESSIONS_FILE: &str = "sessions.json";
const PROMPT_FILE: &str = "prompt.md";
const LOG_DIR: &str = "logs";

/// Returns the swarmkeeper data directory.
pub fn swarmkeeper_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".swarmkeeper"))
        .ok_or(SwarmError::HomeDirNotFound)
}

pub fn config_path() -> Result<PathBuf> {
    swarmkeeper_dir().map(|dir| dir.join(CONFIG_FILE))
}

pub fn sessions_path() -> Result<PathBuf> {
    swarmkeeper_dir().map(|dir| dir.join(SESSIONS_FILE))
}

pub fn prompt_path() -> Result<PathBuf> {
    swarmkeeper_dir().map(|dir| dir.join(PROMPT_FILE))
}

pub fn log_dir() -> Result<PathBuf> {
    swarmkeeper_dir().map(|dir| dir.join(LOG_DIR))
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClassifierConfig {
    #[serde(default = "default_api_base", alias = "apiBase")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, alias = "apiKey")]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key: String::new(),
            temperature: default_temperature(),
        }
    }
}

impl ClassifierConfig {
    /// The configured key, falling back to the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        let configured = self.api_key.trim();
        if !configured.is_empty() {
            return Some(configured.to_string());
        }
        [API_KEY_ENV, OPENAI_API_KEY_ENV]
            .iter()
            .filter_map(|name| env::var(name).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoopDefaults {
    #[serde(default = "default_pattern_interval")]
    pub pattern_interval_secs: u64,
    #[serde(default = "default_manager_interval")]
    pub manager_interval_secs: u64,
    #[serde(default = "default_capture_lines")]
    pub capture_lines: usize,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "default_auto_type_max")]
    pub auto_type_max: u32,
}

impl Default for LoopDefaults {
    fn default() -> Self {
        Self {
            pattern_interval_secs: default_pattern_interval(),
            manager_interval_secs: default_manager_interval(),
            capture_lines: default_capture_lines(),
            fuzzy_threshold: default_fuzzy_threshold(),
            auto_type_max: default_auto_type_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct SwarmConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default, rename = "loop")]
    pub loop_defaults: LoopDefaults,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_pattern_interval() -> u64 {
    60
}

fn default_manager_interval() -> u64 {
    180
}

fn default_capture_lines() -> usize {
    100
}

fn default_fuzzy_threshold() -> f64 {
    80.0
}

fn default_auto_type_max() -> u32 {
    2
}

/// Loads `config.toml`, returning defaults when the file does not exist.
pub fn load_config(path: Option<PathBuf>) -> Result<SwarmConfig> {
    let config_path = match path {
        Some(path) => path,
        None => config_path()?,
    };

    if !config_path.exists() {
        return Ok(SwarmConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| SwarmError::Io {
        context: format!("Failed to read config {}", config_path.display()),
        source: err,
    })?;
    parse_config(&config_path, &content)
}

fn parse_config(path: &Path, content: &str) -> Result<SwarmConfig> {
    toml::from_str::<SwarmConfig>(content).map_err(|err| SwarmError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

/// Loads the classifier system prompt override, if one exists.
pub fn load_prompt_override() -> Option<String> {
    let path = prompt_path().ok()?;
    fs_err::read_to_string(path)
        .ok()
        .filter(|prompt| !prompt.trim().is_empty())
}
