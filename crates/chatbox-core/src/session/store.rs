//! Durable storage for sessions and configuration.
//!
//! Two independent pretty-printed JSON documents under the data directory:
//! - `sessions.json` — array of sessions with full message records
//! - `config.json`   — the active `ApiConfig`
//!
//! A failure loading one never affects the other. Every save rewrites the
//! whole document, so a reader after a completed mutation always sees that
//! mutation.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::types::Session;

/// Errors from reading or writing the on-disk documents.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads and writes the two store documents.
pub struct SessionStore {
    sessions_path: PathBuf,
    config_path: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `data_dir`.
    ///
    /// `data_dir` defaults to `~/.chatbox/` if `None`.
    /// The directory is created if it doesn't exist.
    pub fn new(data_dir: Option<PathBuf>) -> std::io::Result<Self> {
        let dir = data_dir.unwrap_or_else(crate::utils::get_data_path);
        std::fs::create_dir_all(&dir)?;

        Ok(SessionStore {
            sessions_path: dir.join("sessions.json"),
            config_path: dir.join("config.json"),
        })
    }

    /// Load all sessions. A missing file is a fresh install, not an error.
    pub fn load_sessions(&self) -> Result<Vec<Session>, StoreError> {
        if !self.sessions_path.exists() {
            info!("no sessions file at {}, starting empty", self.sessions_path.display());
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.sessions_path)?;
        let sessions: Vec<Session> = serde_json::from_str(&content)?;
        debug!(count = sessions.len(), "loaded sessions from disk");
        Ok(sessions)
    }

    /// Persist all sessions (full rewrite).
    pub fn save_sessions(&self, sessions: &[Session]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(sessions)?;
        std::fs::write(&self.sessions_path, json)?;
        debug!(
            count = sessions.len(),
            path = %self.sessions_path.display(),
            "saved sessions"
        );
        Ok(())
    }

    /// Load the config. A missing file yields the defaults.
    pub fn load_config(&self) -> Result<ApiConfig, StoreError> {
        if !self.config_path.exists() {
            info!("no config file at {}, using defaults", self.config_path.display());
            return Ok(ApiConfig::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let config: ApiConfig = serde_json::from_str(&content)?;
        debug!("loaded config from disk");
        Ok(config)
    }

    /// Persist the config.
    pub fn save_config(&self, config: &ApiConfig) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.config_path, json)?;
        debug!(path = %self.config_path.display(), "saved config");
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
