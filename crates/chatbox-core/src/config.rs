//! API configuration — schema, provider presets, and environment overrides.
//!
//! Exactly one `ApiConfig` is active at a time. It is threaded explicitly
//! through the session manager and chat client constructors rather than held
//! in a process-wide global, and it is consulted per request.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! `#[serde(rename_all = "camelCase")]` handles the conversion.

use serde::{Deserialize, Serialize};

/// Connection and sampling settings for a chat completions endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    /// Full chat completions URL.
    pub endpoint: String,
    /// Bearer token. Persisted locally, never included in exports.
    pub api_key: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Prepended to the history as a system message when non-empty.
    pub system_prompt: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            system_prompt: String::new(),
        }
    }
}

impl ApiConfig {
    /// Whether requests can be made with this config.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Ready-made endpoint/model pairs for common providers.
    ///
    /// The key and remaining fields keep their defaults.
    pub fn preset(name: &str) -> Option<ApiConfig> {
        let (endpoint, model) = match name {
            "openai" => ("https://api.openai.com/v1/chat/completions", "gpt-3.5-turbo"),
            "anthropic" => ("https://api.anthropic.com/v1/messages", "claude-3-sonnet"),
            "google" => (
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent",
                "gemini-pro",
            ),
            "local" => ("http://localhost:11434/api/chat", "llama3"),
            _ => return None,
        };

        Some(ApiConfig {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            ..Default::default()
        })
    }

    /// Names accepted by [`ApiConfig::preset`].
    pub fn preset_names() -> &'static [&'static str] {
        &["openai", "anthropic", "google", "local"]
    }
}

/// Apply `CHATBOX_*` environment variable overrides on top of a loaded config.
///
/// Supported overrides:
/// - `CHATBOX_ENDPOINT` → `endpoint`
/// - `CHATBOX_API_KEY` → `api_key`
/// - `CHATBOX_MODEL` → `model`
/// - `CHATBOX_TEMPERATURE` → `temperature`
/// - `CHATBOX_MAX_TOKENS` → `max_tokens`
/// - `CHATBOX_SYSTEM_PROMPT` → `system_prompt`
pub fn apply_env_overrides(mut config: ApiConfig) -> ApiConfig {
    if let Ok(val) = std::env::var("CHATBOX_ENDPOINT") {
        config.endpoint = val;
    }
    if let Ok(val) = std::env::var("CHATBOX_API_KEY") {
        config.api_key = val;
    }
    if let Ok(val) = std::env::var("CHATBOX_MODEL") {
        config.model = val;
    }
    if let Ok(val) = std::env::var("CHATBOX_TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.temperature = t;
        }
    }
    if let Ok(val) = std::env::var("CHATBOX_MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("CHATBOX_SYSTEM_PROMPT") {
        config.system_prompt = val;
    }
    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
