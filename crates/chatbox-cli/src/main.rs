//! Chatbox CLI — entry point.
//!
//! # Commands
//!
//! - `chatbox` / `chatbox chat` — interactive conversation REPL
//! - `chatbox sessions` — list stored conversations
//! - `chatbox config` — show or update the API configuration
//! - `chatbox export [FILE]` / `chatbox import FILE` — snapshot transfer

mod helpers;
mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use chatbox_core::config::ApiConfig;
use chatbox_core::session::SessionManager;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// 💬 Chatbox — streaming chat for OpenAI-compatible endpoints
#[derive(Parser)]
#[command(name = "chatbox", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive conversation REPL (default)
    Chat,

    /// List stored sessions, most recently updated first
    Sessions,

    /// Show or update the API configuration
    Config {
        /// Apply a provider preset (openai, anthropic, google, local)
        #[arg(long)]
        preset: Option<String>,

        /// Chat completions URL
        #[arg(long)]
        endpoint: Option<String>,

        /// Bearer token for the endpoint
        #[arg(long)]
        api_key: Option<String>,

        /// Model identifier
        #[arg(long)]
        model: Option<String>,

        /// System prompt prepended to every conversation
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// Write a snapshot of all sessions (API key excluded) to FILE or stdout
    Export {
        /// Output file; omit to print to stdout
        file: Option<PathBuf>,
    },

    /// Replace all sessions with the snapshot in FILE
    Import {
        /// Snapshot file produced by `chatbox export`
        file: PathBuf,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs);

    let mut manager = SessionManager::new(None).context("failed to open data directory")?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => repl::run(&mut manager).await,
        Commands::Sessions => {
            helpers::print_sessions(&manager);
            Ok(())
        }
        Commands::Config {
            preset,
            endpoint,
            api_key,
            model,
            system_prompt,
        } => run_config(&mut manager, preset, endpoint, api_key, model, system_prompt),
        Commands::Export { file } => run_export(&manager, file),
        Commands::Import { file } => run_import(&mut manager, &file),
    }
}

// ─────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────

fn run_config(
    manager: &mut SessionManager,
    preset: Option<String>,
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
) -> Result<()> {
    let changing = preset.is_some()
        || endpoint.is_some()
        || api_key.is_some()
        || model.is_some()
        || system_prompt.is_some();

    if !changing {
        helpers::print_config(manager.config());
        return Ok(());
    }

    let mut config = match preset {
        Some(name) => ApiConfig::preset(&name).with_context(|| {
            format!(
                "unknown preset '{}' (available: {})",
                name,
                ApiConfig::preset_names().join(", ")
            )
        })?,
        None => manager.config().clone(),
    };

    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if let Some(api_key) = api_key {
        config.api_key = api_key;
    }
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(system_prompt) = system_prompt {
        config.system_prompt = system_prompt;
    }

    manager.set_config(config).context("failed to save config")?;
    helpers::print_config(manager.config());
    Ok(())
}

fn run_export(manager: &SessionManager, file: Option<PathBuf>) -> Result<()> {
    let snapshot = manager.export_snapshot().context("export failed")?;

    match file {
        Some(path) => {
            std::fs::write(&path, snapshot)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
        None => println!("{snapshot}"),
    }
    Ok(())
}

fn run_import(manager: &mut SessionManager, file: &std::path::Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    manager
        .import_snapshot(&text)
        .context("snapshot rejected, existing sessions left untouched")?;

    println!("Imported {} session(s)", manager.list_sessions().len());
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("chatbox=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
