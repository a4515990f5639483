//! Utility helpers — data paths, timestamps, title derivation.

use std::path::PathBuf;

/// Get the Chatbox data directory (e.g. `~/.chatbox/`).
pub fn get_data_path() -> PathBuf {
    let home = dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".chatbox")
}

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Derive a session title from message content: the first `max_chars`
/// characters, with `"..."` appended when the content is longer.
/// Unicode-safe.
pub fn derive_title(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let head: String = content.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
