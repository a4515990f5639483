//! Interactive conversation REPL.
//!
//! Reads prompts with `rustyline`, streams the assistant reply chunk by
//! chunk, and finalizes the session log once the reply completes or fails.
//! Ctrl-C during a reply aborts the request; the turn is kept with an error
//! note instead of being lost.

use std::io::Write;

use anyhow::Result;
use colored::Colorize;
use rustyline::DefaultEditor;
use tracing::debug;

use chatbox_client::{ChatClient, ChatSink};
use chatbox_core::session::SessionManager;
use chatbox_core::types::Role;

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Prints deltas to the terminal as they arrive.
struct TerminalSink;

impl ChatSink for TerminalSink {
    fn on_chunk(&self, delta: &str) {
        print!("{delta}");
        let _ = std::io::stdout().flush();
    }

    fn on_complete(&self, _full_text: &str) {
        println!();
    }

    fn on_error(&self, _message: &str) {
        println!();
    }
}

/// Run the interactive REPL loop.
pub async fn run(manager: &mut SessionManager) -> Result<()> {
    helpers::print_banner();
    if !manager.config().is_configured() {
        println!(
            "{}",
            "No API key configured. Set one with: chatbox config --api-key <KEY>".yellow()
        );
        println!();
    }

    let mut editor = DefaultEditor::new()?;

    loop {
        // Read input
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if EXIT_COMMANDS.contains(&trimmed.to_lowercase().as_str()) {
            println!("\nGoodbye! 👋");
            break;
        }

        let _ = editor.add_history_entry(&input);

        if let Some(command) = trimmed.strip_prefix('/') {
            if let Err(e) = handle_command(manager, command) {
                eprintln!("{}", format!("error: {e}").red());
            }
            continue;
        }

        send_prompt(manager, trimmed).await?;
    }

    Ok(())
}

/// One conversation turn: append the user message, stream the reply into a
/// placeholder, and finalize it with the authoritative full text.
async fn send_prompt(manager: &mut SessionManager, prompt: &str) -> Result<()> {
    manager.add_message(Role::User, prompt)?;
    let history = manager
        .current_session()
        .map(|s| s.messages.clone())
        .unwrap_or_default();

    // Placeholder the streamed reply replaces (or an error note overwrites).
    manager.add_message(Role::Assistant, "")?;

    let client = ChatClient::new(manager.config().clone());
    debug!(prompt_chars = prompt.len(), "sending prompt");

    print!("{} ", "AI:".cyan().bold());
    let _ = std::io::stdout().flush();

    let send = client.send(&history, true, Some(&TerminalSink));
    tokio::pin!(send);

    let result = tokio::select! {
        result = &mut send => result,
        _ = tokio::signal::ctrl_c() => {
            client.abort();
            send.await
        }
    };

    match result {
        Ok(full_text) => {
            manager.replace_last_message_content(full_text)?;
        }
        Err(e) => {
            println!("{}", format!("error: {e}").red());
            manager.replace_last_message_content(format!("[error] {e}"))?;
        }
    }

    Ok(())
}

/// Dispatch a `/command` line.
fn handle_command(manager: &mut SessionManager, command: &str) -> Result<()> {
    let mut parts = command.split_whitespace();

    match parts.next() {
        Some("new") => {
            manager.create_session()?;
            println!("Started a new conversation.");
        }
        Some("sessions") => helpers::print_sessions(manager),
        Some("switch") => match parse_index(parts.next(), manager) {
            Some(id) => {
                manager.set_current(&id);
                println!("Switched.");
            }
            None => println!("Usage: /switch <number from /sessions>"),
        },
        Some("delete") => match parse_index(parts.next(), manager) {
            Some(id) => {
                manager.delete_session(&id)?;
                println!("Deleted.");
            }
            None => println!("Usage: /delete <number from /sessions>"),
        },
        Some("clear") => {
            manager.clear_current_session()?;
            println!("Conversation cleared.");
        }
        Some("config") => helpers::print_config(manager.config()),
        Some("export") => match parts.next() {
            Some(file) => {
                std::fs::write(file, manager.export_snapshot()?)?;
                println!("Exported to {file}");
            }
            None => println!("Usage: /export <file>"),
        },
        Some("import") => match parts.next() {
            Some(file) => {
                let text = std::fs::read_to_string(file)?;
                manager.import_snapshot(&text)?;
                println!("Imported {} session(s)", manager.list_sessions().len());
            }
            None => println!("Usage: /import <file>"),
        },
        _ => print_help(),
    }

    Ok(())
}

/// Resolve a 1-based index from `/sessions` into a session id.
fn parse_index(arg: Option<&str>, manager: &SessionManager) -> Option<String> {
    let index: usize = arg?.parse().ok()?;
    let sessions = manager.list_sessions();
    sessions.get(index.checked_sub(1)?).map(|s| s.id.clone())
}

fn print_help() {
    println!("Commands:");
    println!("  /new              start a new conversation");
    println!("  /sessions         list conversations");
    println!("  /switch <n>       switch to conversation n");
    println!("  /delete <n>       delete conversation n");
    println!("  /clear            clear the current conversation");
    println!("  /config           show the API configuration");
    println!("  /export <file>    export all conversations");
    println!("  /import <file>    import conversations from a file");
    println!("  exit              quit");
}
