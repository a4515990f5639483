//! Shared CLI helpers — banner and formatted printing.

use colored::Colorize;

use chatbox_core::config::ApiConfig;
use chatbox_core::session::SessionManager;

/// Print the banner shown at REPL start.
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "💬 Chatbox".cyan().bold(), version.dimmed());
    println!(
        "{}",
        "Type a message, \"/help\" for commands, or \"exit\" to quit.".dimmed()
    );
    println!();
}

/// Print all sessions, most recently updated first, marking the current one.
pub fn print_sessions(manager: &SessionManager) {
    let sessions = manager.list_sessions();
    if sessions.is_empty() {
        println!("{}", "No conversations yet.".dimmed());
        return;
    }

    let current_id = manager.current_session().map(|s| s.id.clone());
    for (index, session) in sessions.iter().enumerate() {
        let marker = if Some(&session.id) == current_id.as_ref() {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:>3}. {}  {}",
            marker,
            index + 1,
            session.title.bold(),
            format!(
                "({} messages, {})",
                session.messages.len(),
                format_timestamp(session.updated_at)
            )
            .dimmed()
        );
    }
}

/// Print the active configuration with the key masked.
pub fn print_config(config: &ApiConfig) {
    println!("endpoint:      {}", config.endpoint);
    println!("model:         {}", config.model);
    println!("temperature:   {}", config.temperature);
    println!("max tokens:    {}", config.max_tokens);
    println!("api key:       {}", mask_key(&config.api_key));
    println!(
        "system prompt: {}",
        if config.system_prompt.is_empty() {
            "(none)".to_string()
        } else {
            config.system_prompt.clone()
        }
    );
}

/// Render a millisecond timestamp as local `YYYY-MM-DD HH:MM`.
pub fn format_timestamp(millis: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(utc) => utc
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => "?".to_string(),
    }
}

/// Show just enough of a key to recognize it.
pub fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return "(not set)".to_string();
    }
    let head: String = key.chars().take(6).collect();
    format!("{head}…")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
