//! File-backed session registry.
//!
//! The registry lives at `~/.swarmkeeper/sessions.json` as a JSON object keyed
//! by session name:
//!
//! ```json
//! {
//!   "agent-01": {
//!     "created": "2026-01-28T00:00:00Z",
//!     "command": "claude",
//!     "checks": [{"time": "...", "status": "working", "log": "Editing main.rs"}]
//!   }
//! }
//! ```
//!
//! Key order is insertion order and is preserved across load/save, so the
//! monitoring loop always polls sessions in the order they were started.
//!
//! # Defensive Design
//!
//! - Missing or empty file: empty registry
//! - Corrupt JSON: empty registry, logged as a warning
//!
//! # Atomic Writes
//!
//! Saves write a temp file in the same directory and rename it over the old
//! file, so a crash mid-save leaves the previous registry intact.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, SwarmError};
use crate::types::Session;

/// Session name → record, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRegistry {
    entries: Vec<(String, Session)>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Session> {
        self.position(name).map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Session> {
        self.position(name).map(move |idx| &mut self.entries[idx].1)
    }

    /// Inserts or replaces a session. A replaced session keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, session: Session) -> Option<Session> {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, session)),
            None => {
                self.entries.push((name, session));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Session> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    /// Session names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Session)> {
        self.entries
            .iter()
            .map(|(name, session)| (name.as_str(), session))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == name)
    }
}

impl Serialize for SessionRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, session) in &self.entries {
            map.serialize_entry(name, session)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SessionRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RegistryVisitor;

        impl<'de> Visitor<'de> for RegistryVisitor {
            type Value = SessionRegistry;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of session name to session record")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut registry = SessionRegistry::new();
                while let Some((name, session)) = access.next_entry::<String, Session>()? {
                    registry.insert(name, session);
                }
                Ok(registry)
            }
        }

        deserializer.deserialize_map(RegistryVisitor)
    }
}

/// Where the loop writes the registry after every iteration.
pub trait RegistryPersistence {
    fn persist(&self, registry: &SessionRegistry) -> Result<()>;
}

/// JSON file store for the registry.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    file_path: PathBuf,
}

impl RegistryStore {
    pub fn new(file_path: &Path) -> Self {
        RegistryStore {
            file_path: file_path.to_path_buf(),
        }
    }

    /// Store at the default `sessions.json` location.
    pub fn open_default() -> Result<Self> {
        crate::config::sessions_path().map(|path| Self::new(&path))
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn load(&self) -> SessionRegistry {
        let content = match fs_err::read_to_string(&self.file_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return SessionRegistry::new();
            }
            Err(err) => {
                warn!(error = %err, "Failed to read session registry; starting empty");
                return SessionRegistry::new();
            }
        };

        if content.trim().is_empty() {
            debug!(path = %self.file_path.display(), "Empty session registry file");
            return SessionRegistry::new();
        }

        match serde_json::from_str::<SessionRegistry>(&content) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(
                    error = %err,
                    path = %self.file_path.display(),
                    "Corrupt session registry; starting empty"
                );
                SessionRegistry::new()
            }
        }
    }

    pub fn save(&self, registry: &SessionRegistry) -> Result<()> {
        let content = serde_json::to_string_pretty(registry).map_err(|source| SwarmError::Json {
            context: "Failed to serialize session registry".to_string(),
            source,
        })?;

        let parent_dir = match self.file_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs_err::create_dir_all(&parent_dir).map_err(|source| SwarmError::Io {
            context: "Failed to create registry directory".to_string(),
            source,
        })?;

        let io_err = |context: &str| {
            let context = context.to_string();
            move |source: std::io::Error| SwarmError::Io { context, source }
        };
        let mut temp_file =
            NamedTempFile::new_in(&parent_dir).map_err(io_err("Failed to create temp registry file"))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(io_err("Failed to write temp registry file"))?;
        temp_file
            .flush()
            .map_err(io_err("Failed to flush temp registry file"))?;
        temp_file
            .persist(&self.file_path)
            .map_err(|err| SwarmError::Io {
                context: format!("Failed to replace {}", self.file_path.display()),
                source: err.error,
            })?;

        Ok(())
    }
}

impl RegistryPersistence for RegistryStore {
    fn persist(&self, registry: &SessionRegistry) -> Result<()> {
        self.save(registry)
    }
}
