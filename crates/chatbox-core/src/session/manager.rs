//! Session manager — in-memory conversation state with write-through JSON
//! persistence.
//!
//! Owns the full session list, the current-session pointer, and the active
//! `ApiConfig`. Every mutating operation rewrites the affected document
//! before returning, so a restart never observes state older than the last
//! completed mutation.
//!
//! The current session is tracked by id and resolved by lookup on every
//! access, so deleting a session can never leave a dangling reference.
//! Mutating operations take `&mut self`; a multithreaded host wraps the
//! manager in a mutex.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{self, ApiConfig};
use crate::types::{Message, Role, Session, DEFAULT_TITLE};
use crate::utils;

use super::store::{SessionStore, StoreError};

/// Maximum characters of the first user message used for a session title.
const TITLE_MAX_CHARS: usize = 30;

// ─────────────────────────────────────────────
// SessionManager
// ─────────────────────────────────────────────

pub struct SessionManager {
    store: SessionStore,
    /// All sessions, newest-created first.
    sessions: Vec<Session>,
    /// Id of the session the conversation is bound to, if any.
    current_id: Option<String>,
    config: ApiConfig,
}

impl SessionManager {
    /// Create a manager rooted at `data_dir` (default `~/.chatbox/`).
    ///
    /// Sessions and config load independently; a corrupt or unreadable
    /// document falls back to empty/defaults with a logged diagnostic.
    /// Initialization itself only fails if the data directory cannot be
    /// created.
    pub fn new(data_dir: Option<PathBuf>) -> std::io::Result<Self> {
        let store = SessionStore::new(data_dir)?;

        let sessions = store.load_sessions().unwrap_or_else(|e| {
            warn!("failed to load sessions, starting empty: {}", e);
            Vec::new()
        });
        let config = store.load_config().unwrap_or_else(|e| {
            warn!("failed to load config, using defaults: {}", e);
            ApiConfig::default()
        });
        let config = config::apply_env_overrides(config);

        // The most recently updated session resumes as current.
        let current_id = most_recent_id(&sessions);

        Ok(SessionManager {
            store,
            sessions,
            current_id,
            config,
        })
    }

    // ── Session management ──

    /// Create a new empty session, make it current, and persist.
    pub fn create_session(&mut self) -> Result<Session, StoreError> {
        let session = Session::new();
        self.current_id = Some(session.id.clone());
        self.sessions.insert(0, session.clone());
        self.store.save_sessions(&self.sessions)?;
        Ok(session)
    }

    /// The session the conversation is bound to, if any.
    pub fn current_session(&self) -> Option<&Session> {
        let id = self.current_id.as_deref()?;
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Point the conversation at another session. Unknown ids are ignored.
    pub fn set_current(&mut self, id: &str) {
        if self.sessions.iter().any(|s| s.id == id) {
            self.current_id = Some(id.to_string());
        }
    }

    /// All sessions, most recently updated first. Ties keep their relative
    /// creation order.
    pub fn list_sessions(&self) -> Vec<Session> {
        let mut sessions = self.sessions.clone();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Remove a session and persist.
    ///
    /// If it was current, the most recently updated remaining session takes
    /// its place, or none remains current.
    pub fn delete_session(&mut self, id: &str) -> Result<(), StoreError> {
        self.sessions.retain(|s| s.id != id);
        if self.current_id.as_deref() == Some(id) {
            self.current_id = most_recent_id(&self.sessions);
        }
        self.store.save_sessions(&self.sessions)
    }

    // ── Message management ──

    /// Append a message to the current session, creating one first if none
    /// exists, then persist.
    ///
    /// The first user message of a placeholder-titled session also names it.
    pub fn add_message(
        &mut self,
        role: Role,
        content: impl Into<String>,
    ) -> Result<Message, StoreError> {
        if self.current_session().is_none() {
            let session = Session::new();
            self.current_id = Some(session.id.clone());
            self.sessions.insert(0, session);
        }

        let message = Message::new(role, content);
        if let Some(session) = self.current_session_mut() {
            session.messages.push(message.clone());
            session.touch();
            if role == Role::User && session.title == DEFAULT_TITLE {
                session.title = utils::derive_title(&message.content, TITLE_MAX_CHARS);
            }
        }

        self.store.save_sessions(&self.sessions)?;
        Ok(message)
    }

    /// Replace the content of the current session's last message (used to
    /// finalize a streamed assistant reply), then persist.
    ///
    /// No-op without a current session or without messages.
    pub fn replace_last_message_content(
        &mut self,
        content: impl Into<String>,
    ) -> Result<(), StoreError> {
        let Some(session) = self.current_session_mut() else {
            return Ok(());
        };
        let Some(last) = session.messages.last_mut() else {
            return Ok(());
        };

        last.content = content.into();
        session.touch();
        self.store.save_sessions(&self.sessions)
    }

    /// Empty the current session and reset its title to the placeholder,
    /// then persist. The session itself (and its id) survive.
    pub fn clear_current_session(&mut self) -> Result<(), StoreError> {
        let Some(session) = self.current_session_mut() else {
            return Ok(());
        };

        session.messages.clear();
        session.title = DEFAULT_TITLE.to_string();
        session.touch();
        self.store.save_sessions(&self.sessions)
    }

    // ── Configuration ──

    /// The active configuration.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Replace the active configuration and persist it immediately.
    pub fn set_config(&mut self, config: ApiConfig) -> Result<(), StoreError> {
        self.config = config;
        self.store.save_config(&self.config)
    }

    // ── Export / Import ──

    /// Serialize all sessions plus a key-less config view to pretty JSON.
    pub fn export_snapshot(&self) -> Result<String, StoreError> {
        let snapshot = Snapshot {
            sessions: self
                .sessions
                .iter()
                .map(|s| SnapshotSession {
                    id: s.id.clone(),
                    title: s.title.clone(),
                    messages: s
                        .messages
                        .iter()
                        .map(|m| SnapshotMessage {
                            role: m.role,
                            content: m.content.clone(),
                            timestamp: m.timestamp,
                        })
                        .collect(),
                })
                .collect(),
            config: SnapshotConfig {
                endpoint: self.config.endpoint.clone(),
                model: self.config.model.clone(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            },
        };

        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Replace the whole session list with the snapshot's sessions, then
    /// persist.
    ///
    /// Malformed input fails before any state changes. The config is left
    /// untouched. On success the first imported session becomes current.
    pub fn import_snapshot(&mut self, text: &str) -> Result<(), StoreError> {
        let snapshot: Snapshot = serde_json::from_str(text)?;

        let now = utils::now_millis();
        let sessions: Vec<Session> = snapshot
            .sessions
            .into_iter()
            .map(|s| Session {
                id: s.id,
                title: s.title,
                messages: s
                    .messages
                    .into_iter()
                    .map(|m| Message {
                        id: uuid::Uuid::new_v4().to_string(),
                        role: m.role,
                        content: m.content,
                        timestamp: m.timestamp,
                    })
                    .collect(),
                updated_at: now,
            })
            .collect();

        self.current_id = sessions.first().map(|s| s.id.clone());
        self.sessions = sessions;
        self.store.save_sessions(&self.sessions)
    }

    // ── Internal ──

    fn current_session_mut(&mut self) -> Option<&mut Session> {
        let id = self.current_id.clone()?;
        self.sessions.iter_mut().find(|s| s.id == id)
    }
}

/// Id of the most recently updated session; the earliest-listed wins ties,
/// matching the ordering of [`SessionManager::list_sessions`].
fn most_recent_id(sessions: &[Session]) -> Option<String> {
    let mut best: Option<&Session> = None;
    for session in sessions {
        if best.map_or(true, |b| session.updated_at > b.updated_at) {
            best = Some(session);
        }
    }
    best.map(|s| s.id.clone())
}

// ─────────────────────────────────────────────
// Snapshot format (export/import)
// ─────────────────────────────────────────────

/// Message record inside a snapshot: no id, it is regenerated on import.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMessage {
    role: Role,
    content: String,
    timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotSession {
    id: String,
    title: String,
    messages: Vec<SnapshotMessage>,
}

/// Reduced config view: the secret key is deliberately omitted.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotConfig {
    endpoint: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    sessions: Vec<SnapshotSession>,
    config: SnapshotConfig,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
