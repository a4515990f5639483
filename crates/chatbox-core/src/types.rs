//! Core types for Chatbox — the conversation data model and the
//! OpenAI-compatible wire format.
//!
//! Domain types ([`Message`], [`Session`]) carry ids and timestamps and are
//! what the session manager persists. Wire types ([`ChatCompletionRequest`]
//! and friends) are the subset that actually crosses the network: requests
//! project messages down to `{role, content}`, so ids and timestamps never
//! leave the process.

use serde::{Deserialize, Serialize};

use crate::utils;

// ─────────────────────────────────────────────
// Roles & Messages
// ─────────────────────────────────────────────

/// Who authored a message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A single chat message inside a session.
///
/// Immutable once created, except for the content replacement the session
/// manager performs when finalizing a streamed assistant reply.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Unix milliseconds at creation time.
    pub timestamp: i64,
}

impl Message {
    /// Create a message with a fresh id and the current wall-clock time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: utils::now_millis(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::new(Role::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::new(Role::System, content)
    }
}

// ─────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────

/// Title given to sessions before the first user message names them.
pub const DEFAULT_TITLE: &str = "New Chat";

/// One conversation: an ordered message log plus display metadata.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    /// Unix milliseconds of the last mutation. Never decreases.
    pub updated_at: i64,
}

impl Session {
    /// Create a new empty session with the placeholder title.
    pub fn new() -> Self {
        Session {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            updated_at: utils::now_millis(),
        }
    }

    /// Bump `updated_at`, keeping it monotonic even if the clock steps back.
    pub fn touch(&mut self) {
        self.updated_at = self.updated_at.max(utils::now_millis());
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

// ─────────────────────────────────────────────
// Wire format (OpenAI-compatible chat completions)
// ─────────────────────────────────────────────

/// A message as it appears on the wire: role and content only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RequestMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for RequestMessage {
    fn from(msg: &Message) -> Self {
        RequestMessage {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// Request body for a chat completions call.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Non-streaming response body. Only the fields Chatbox reads.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

/// A single choice in a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ResponseMessage,
}

/// The assistant message within a chat completion choice.
#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

/// One parsed SSE payload from a streaming response.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    pub choices: Vec<StreamChoice>,
}

/// A single choice in a streamed chunk.
#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
}

/// Incremental content carried by a streamed chunk.
#[derive(Debug, Default, Deserialize)]
pub struct StreamDelta {
    pub content: Option<String>,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
