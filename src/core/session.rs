use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::core::config::path_display;
use crate::core::message::Message;

/// Name of the session that always exists and can never be deleted.
///
/// Kept verbatim across releases so existing `sessions.json` transcripts
/// keep their protected default session.
pub const DEFAULT_SESSION_NAME: &str = "默认会话";

fn default_session_name() -> String {
    DEFAULT_SESSION_NAME.to_string()
}

/// All named session transcripts plus the current-session pointer.
///
/// Serializes as the `sessions.json` shape: a top-level object whose keys
/// are session names and whose values are message arrays. The current
/// pointer is deliberately not persisted; every startup resumes on the
/// default session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRegistry {
    #[serde(flatten)]
    sessions: HashMap<String, Vec<Message>>,
    #[serde(skip, default = "default_session_name")]
    current: String,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            sessions: HashMap::new(),
            current: default_session_name(),
        };
        registry.ensure_default();
        registry
    }

    /// Reinstate the default session if it is missing. Invariant: the
    /// default session exists in every registry state.
    pub fn ensure_default(&mut self) {
        self.sessions
            .entry(default_session_name())
            .or_insert_with(Vec::new);
        if !self.sessions.contains_key(&self.current) {
            self.current = default_session_name();
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// The pointer must always reference an existing session; callers
    /// validate the name first.
    pub(crate) fn set_current(&mut self, name: &str) {
        debug_assert!(self.sessions.contains_key(name));
        self.current = name.to_string();
    }

    pub(crate) fn reset_current_to_default(&mut self) {
        self.current = default_session_name();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Vec<Message>> {
        self.sessions.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vec<Message>> {
        self.sessions.get_mut(name)
    }

    pub(crate) fn insert_empty(&mut self, name: &str) {
        self.sessions.insert(name.to_string(), Vec::new());
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Vec<Message>> {
        self.sessions.remove(name)
    }

    /// Session names sorted for stable display, default session first.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sessions.keys().map(String::as_str).collect();
        names.sort_unstable_by(|a, b| {
            let a_default = *a == DEFAULT_SESSION_NAME;
            let b_default = *b == DEFAULT_SESSION_NAME;
            b_default.cmp(&a_default).then_with(|| a.cmp(b))
        });
        names
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Errors that can occur when loading the session transcripts from disk.
#[derive(Debug)]
pub enum SessionStoreError {
    /// Failed to read the session file from disk.
    Read {
        /// Path to the session file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the session file as valid JSON.
    Parse {
        /// Path to the session file with invalid JSON.
        path: PathBuf,
        /// The JSON deserialization error.
        source: serde_json::Error,
    },
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStoreError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read sessions at {}: {}",
                    path_display(path),
                    source
                )
            }
            SessionStoreError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse sessions at {}: {}",
                    path_display(path),
                    source
                )
            }
        }
    }
}

impl StdError for SessionStoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SessionStoreError::Read { source, .. } => Some(source),
            SessionStoreError::Parse { source, .. } => Some(source),
        }
    }
}

impl SessionRegistry {
    pub fn load_from_path(sessions_path: &Path) -> Result<SessionRegistry, SessionStoreError> {
        if sessions_path.exists() {
            let contents =
                fs::read_to_string(sessions_path).map_err(|source| SessionStoreError::Read {
                    path: sessions_path.to_path_buf(),
                    source,
                })?;
            let mut registry: SessionRegistry =
                serde_json::from_str(&contents).map_err(|source| SessionStoreError::Parse {
                    path: sessions_path.to_path_buf(),
                    source,
                })?;
            registry.ensure_default();
            Ok(registry)
        } else {
            Ok(SessionRegistry::new())
        }
    }

    /// Load the registry, falling back to an empty one seeded with the
    /// default session when the file is unreadable or malformed.
    pub fn load_or_default(sessions_path: &Path) -> SessionRegistry {
        match Self::load_from_path(sessions_path) {
            Ok(registry) => registry,
            Err(e) => {
                warn!("{e}; starting with an empty session registry");
                SessionRegistry::new()
            }
        }
    }

    pub fn save_to_path(&self, sessions_path: &Path) -> Result<(), Box<dyn StdError>> {
        let parent = sessions_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(sessions_path)
            .map_err(|err| -> Box<dyn StdError> { Box::new(err) })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;
    use tempfile::TempDir;

    #[test]
    fn new_registry_contains_only_the_default_session() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(DEFAULT_SESSION_NAME));
        assert_eq!(registry.current(), DEFAULT_SESSION_NAME);
    }

    #[test]
    fn load_missing_file_seeds_default_session() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("sessions.json");

        let registry = SessionRegistry::load_from_path(&path).expect("Failed to load sessions");

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(DEFAULT_SESSION_NAME), Some(&Vec::new()));
        assert_eq!(registry.current(), DEFAULT_SESSION_NAME);
    }

    #[test]
    fn registry_round_trips_through_disk() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("sessions.json");

        let mut registry = SessionRegistry::new();
        registry.insert_empty("work");
        registry
            .get_mut("work")
            .expect("session exists")
            .push(Message::user("hello"));
        registry
            .get_mut("work")
            .expect("session exists")
            .push(Message::assistant("hi there"));

        registry.save_to_path(&path).expect("Failed to save sessions");
        let loaded = SessionRegistry::load_from_path(&path).expect("Failed to load sessions");

        assert_eq!(loaded, registry);
        let messages = loaded.get("work").expect("session exists");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "hi there");
    }

    #[test]
    fn file_shape_is_a_map_of_name_to_message_array() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("sessions.json");
        fs::write(
            &path,
            r#"{"notes": [{"role": "user", "content": "remember", "timestamp": "2024-05-01 10:00:00"}]}"#,
        )
        .expect("Failed to write sessions");

        let registry = SessionRegistry::load_from_path(&path).expect("Failed to load sessions");

        // The default session is seeded alongside whatever the file holds.
        assert!(registry.contains("notes"));
        assert!(registry.contains(DEFAULT_SESSION_NAME));
        assert_eq!(
            registry.get("notes").expect("session exists")[0].content,
            "remember"
        );
    }

    #[test]
    fn current_pointer_is_not_persisted() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("sessions.json");

        let mut registry = SessionRegistry::new();
        registry.insert_empty("scratch");
        registry.set_current("scratch");
        registry.save_to_path(&path).expect("Failed to save sessions");

        let contents = fs::read_to_string(&path).expect("Failed to read sessions");
        assert!(!contents.contains("current"));

        let reloaded = SessionRegistry::load_from_path(&path).expect("Failed to load sessions");
        assert_eq!(reloaded.current(), DEFAULT_SESSION_NAME);
    }

    #[test]
    fn malformed_file_falls_back_to_empty_registry() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("sessions.json");
        fs::write(&path, "[1, 2, 3]").expect("Failed to write sessions");

        assert!(SessionRegistry::load_from_path(&path).is_err());

        let registry = SessionRegistry::load_or_default(&path);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(DEFAULT_SESSION_NAME));
    }

    #[test]
    fn names_list_default_first_then_sorted() {
        let mut registry = SessionRegistry::new();
        registry.insert_empty("zeta");
        registry.insert_empty("alpha");

        assert_eq!(registry.names(), vec![DEFAULT_SESSION_NAME, "alpha", "zeta"]);
    }
}
