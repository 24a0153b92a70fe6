use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use tracing::warn;

use crate::api::completion::CompletionGateway;
use crate::core::config::{path_display, Config};
use crate::core::message::Message;
use crate::core::session::{SessionRegistry, DEFAULT_SESSION_NAME};

/// Config keys accepted by [`ConversationEngine::update_config`].
pub const CONFIG_KEYS: [&str; 7] = [
    "api_key",
    "model",
    "temperature",
    "max_tokens",
    "top_p",
    "frequency_penalty",
    "presence_penalty",
];

/// Errors surfaced to the shell by engine operations.
///
/// None of these are fatal: the shell prints the message and the engine
/// state is left unchanged. Network and API failures never appear here —
/// the gateway converts those into transcript entries.
#[derive(Debug)]
pub enum EngineError {
    SessionNotFound(String),
    ProtectedSession,
    IndexOutOfRange { session: String, index: usize },
    InvalidValue { key: String, value: String },
    UnknownConfigKey(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::SessionNotFound(name) => {
                write!(f, "Session '{name}' does not exist")
            }
            EngineError::ProtectedSession => {
                write!(f, "The default session cannot be deleted")
            }
            EngineError::IndexOutOfRange { session, index } => {
                write!(
                    f,
                    "Message index {index} is out of range in session '{session}'"
                )
            }
            EngineError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{value}' for {key}; previous value kept")
            }
            EngineError::UnknownConfigKey(key) => {
                write!(f, "Unknown config key: {key}")
            }
        }
    }
}

impl StdError for EngineError {}

/// Result of a create-session request under the documented
/// create-only-if-absent policy: a duplicate name is a no-op, and the
/// shell decides how loudly to surface that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(String),
    Exists(String),
}

impl CreateOutcome {
    pub fn name(&self) -> &str {
        match self {
            CreateOutcome::Created(name) | CreateOutcome::Exists(name) => name,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Owns the session registry and config snapshot, and orchestrates every
/// user-visible operation, including the completion exchange.
///
/// All mutation is serialized by the single calling shell thread; every
/// mutating operation persists before returning. Persistence failures
/// are logged and the in-memory state stays authoritative.
pub struct ConversationEngine {
    registry: SessionRegistry,
    config: Config,
    gateway: CompletionGateway,
    config_path: PathBuf,
    sessions_path: PathBuf,
}

impl ConversationEngine {
    pub fn new(config_path: PathBuf, sessions_path: PathBuf) -> Self {
        Self::with_gateway(CompletionGateway::new(), config_path, sessions_path)
    }

    pub fn with_gateway(
        gateway: CompletionGateway,
        config_path: PathBuf,
        sessions_path: PathBuf,
    ) -> Self {
        let config = Config::load_or_default(&config_path);
        let registry = SessionRegistry::load_or_default(&sessions_path);
        Self {
            registry,
            config,
            gateway,
            config_path,
            sessions_path,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current_session(&self) -> &str {
        self.registry.current()
    }

    pub fn session_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// Create a session, synthesizing a timestamped name when none is
    /// given. Creating an existing name is a no-op; on success the new
    /// session becomes current.
    pub fn create_session(&mut self, name: Option<&str>) -> CreateOutcome {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("session_{}", Utc::now().timestamp()),
        };

        if self.registry.contains(&name) {
            return CreateOutcome::Exists(name);
        }

        self.registry.insert_empty(&name);
        self.registry.set_current(&name);
        self.persist_sessions();
        CreateOutcome::Created(name)
    }

    pub fn delete_session(&mut self, name: &str) -> Result<(), EngineError> {
        if name == DEFAULT_SESSION_NAME {
            return Err(EngineError::ProtectedSession);
        }
        if self.registry.remove(name).is_none() {
            return Err(EngineError::SessionNotFound(name.to_string()));
        }
        if self.registry.current() == name {
            self.registry.reset_current_to_default();
        }
        self.persist_sessions();
        Ok(())
    }

    /// Switch the current-session pointer. Not persisted: restart always
    /// resumes on the default session.
    pub fn switch_session(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.registry.contains(name) {
            return Err(EngineError::SessionNotFound(name.to_string()));
        }
        self.registry.set_current(name);
        Ok(())
    }

    pub fn messages(&self, name: &str) -> Result<&[Message], EngineError> {
        self.registry
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| EngineError::SessionNotFound(name.to_string()))
    }

    pub fn current_messages(&self) -> &[Message] {
        self.registry
            .get(self.registry.current())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append a user message to the current session and run the
    /// completion exchange to completion before returning.
    ///
    /// The session always grows by exactly two entries: the user message
    /// and whatever the gateway produced (reply or error notice). Both
    /// appends are persisted.
    pub async fn send_message(&mut self, text: &str) -> Message {
        let current = self.registry.current().to_string();

        if let Some(messages) = self.registry.get_mut(&current) {
            messages.push(Message::user(text));
        }
        self.persist_sessions();

        let history = self
            .registry
            .get(&current)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let reply = self.gateway.complete(history, &self.config).await;

        if let Some(messages) = self.registry.get_mut(&current) {
            messages.push(reply.clone());
        }
        self.persist_sessions();
        reply
    }

    /// Replace a message's content in place, refreshing its timestamp.
    pub fn edit_message(
        &mut self,
        session: &str,
        index: usize,
        new_content: &str,
    ) -> Result<(), EngineError> {
        let messages = self
            .registry
            .get_mut(session)
            .ok_or_else(|| EngineError::SessionNotFound(session.to_string()))?;

        match messages.get_mut(index) {
            Some(message) => message.set_content(new_content),
            None => {
                return Err(EngineError::IndexOutOfRange {
                    session: session.to_string(),
                    index,
                })
            }
        }

        self.persist_sessions();
        Ok(())
    }

    /// Remove a message, shifting subsequent indices down.
    pub fn delete_message(&mut self, session: &str, index: usize) -> Result<Message, EngineError> {
        let messages = self
            .registry
            .get_mut(session)
            .ok_or_else(|| EngineError::SessionNotFound(session.to_string()))?;

        if index >= messages.len() {
            return Err(EngineError::IndexOutOfRange {
                session: session.to_string(),
                index,
            });
        }

        let removed = messages.remove(index);
        self.persist_sessions();
        Ok(removed)
    }

    /// Update one config field from raw user input.
    ///
    /// `temperature` and `top_p` parse as floats; `max_tokens`,
    /// `frequency_penalty`, and `presence_penalty` as integers. Invalid
    /// input is rejected and the prior value retained. The whole config
    /// is persisted on success.
    pub fn update_config(&mut self, key: &str, raw: &str) -> Result<(), EngineError> {
        match key {
            "api_key" => self.config.api_key = raw.to_string(),
            "model" => self.config.model = raw.to_string(),
            "temperature" => self.config.temperature = Self::parse_value(key, raw)?,
            "top_p" => self.config.top_p = Self::parse_value(key, raw)?,
            "max_tokens" => self.config.max_tokens = Self::parse_value(key, raw)?,
            "frequency_penalty" => self.config.frequency_penalty = Self::parse_value(key, raw)?,
            "presence_penalty" => self.config.presence_penalty = Self::parse_value(key, raw)?,
            _ => return Err(EngineError::UnknownConfigKey(key.to_string())),
        }
        self.persist_config();
        Ok(())
    }

    fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, EngineError> {
        raw.trim().parse().map_err(|_| EngineError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
    }

    fn persist_sessions(&self) {
        if let Err(e) = self.registry.save_to_path(&self.sessions_path) {
            warn!(
                "Failed to persist sessions to {}: {e}",
                path_display(&self.sessions_path)
            );
        }
    }

    fn persist_config(&self) {
        if let Err(e) = self.config.save_to_path(&self.config_path) {
            warn!(
                "Failed to persist config to {}: {e}",
                path_display(&self.config_path)
            );
        }
    }
}
