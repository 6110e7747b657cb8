//! otel-hooks - hook entry point for AI coding assistants
//!
//! The host tool runs `otel-hooks hook` on lifecycle events and pipes the
//! event payload as JSON on stdin. The exit code tells the host whether the
//! data reached the configured backend.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/otel-hooks/config.toml (~/.config/otel-hooks/config.toml)
//! - State and logs: $XDG_STATE_HOME/otel-hooks/ (~/.local/state/otel-hooks/)

use std::io::Read;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use otel_hooks_core::state::StatePaths;
use otel_hooks_core::{Config, HookRunner, Payload, StateStore};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "otel-hooks")]
#[command(about = "Send AI coding assistant hook events to observability backends")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one hook payload read from stdin
    Hook {
        /// Provider to emit to (overrides config)
        #[arg(long)]
        provider: Option<String>,

        /// Source tool hint, used when the payload does not name one
        #[arg(long)]
        tool: Option<String>,
    },

    /// Inspect or clean up session state
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

#[derive(Subcommand)]
enum StateCommand {
    /// List tracked sessions
    List,

    /// Remove sessions not updated recently
    Prune {
        /// Age threshold in days (default: state.retention_days)
        #[arg(long)]
        older_than_days: Option<u32>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (mut config, config_error) = match Config::load_files() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    let invalid_env = config.apply_env_overrides(|key| std::env::var(key).ok());

    // A hook must not fail because its log file is unwritable
    let _log_guard = otel_hooks_core::logging::init(&config).ok();
    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Failed to load configuration; using defaults");
    }
    for invalid in &invalid_env {
        tracing::warn!("{}", invalid);
    }

    match args.command {
        Command::Hook { provider, tool } => run_hook(config, provider, tool),
        Command::State { command } => match run_state(&config, command) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn run_hook(mut config: Config, provider: Option<String>, tool: Option<String>) -> ExitCode {
    if let Some(provider) = provider.filter(|p| !p.is_empty()) {
        config.provider = Some(provider);
    }

    let mut payload = read_payload();
    apply_tool_hint(&mut payload, tool);

    let outcome = HookRunner::new(config).run(&payload);
    tracing::debug!(?outcome, "Hook finished");
    ExitCode::from(outcome.exit_code())
}

/// Set `source_tool` from the `--tool` flag unless the payload already names one.
fn apply_tool_hint(payload: &mut Payload, tool: Option<String>) {
    if let Some(tool) = tool.filter(|t| !t.is_empty()) {
        payload
            .entry("source_tool")
            .or_insert_with(|| Value::String(tool));
    }
}

/// Read the JSON payload from stdin; anything unreadable becomes an empty object.
fn read_payload() -> Payload {
    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        tracing::debug!(error = %e, "Failed to read hook payload from stdin");
        return Payload::new();
    }
    if input.trim().is_empty() {
        return Payload::new();
    }
    match serde_json::from_str::<Value>(&input) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            tracing::debug!("Hook payload is not a JSON object");
            Payload::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse hook payload");
            Payload::new()
        }
    }
}

/// First 16 characters of a state key, for the listing column
fn short_key(key: &str) -> String {
    key.chars().take(16).collect()
}

fn run_state(config: &Config, command: StateCommand) -> Result<()> {
    let paths = StatePaths::new(config.state_dir());

    match command {
        StateCommand::List => {
            let store = StateStore::new(paths);
            let states = store.load();
            if states.is_empty() {
                println!("No session state in {}", store.paths().state_file.display());
                return Ok(());
            }
            println!(
                "{:<16} {:>12} {:>6}  {}",
                "KEY", "OFFSET", "TURNS", "UPDATED"
            );
            for (key, entry) in states.iter() {
                println!(
                    "{:<16} {:>12} {:>6}  {}",
                    short_key(key),
                    entry.offset,
                    entry.turn_count,
                    entry.updated.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        StateCommand::Prune { older_than_days } => {
            let days = older_than_days.unwrap_or(config.state.retention_days);
            // Pruning is explicit here; do not let save apply the retention window again
            let store = StateStore::new(paths)
                .with_lock_timeout(std::time::Duration::from_millis(config.state.lock_timeout_ms));

            let _lock = store.lock();
            let mut states = store.load();
            let removed = states.prune(Utc::now() - Duration::days(i64::from(days)));
            if removed > 0 {
                store.save(&mut states).with_context(|| {
                    format!(
                        "failed to write {}",
                        store.paths().state_file.display()
                    )
                })?;
            }
            println!(
                "Pruned {} session(s) older than {} day(s); {} remaining",
                removed,
                days,
                states.len()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_key_respects_char_boundaries() {
        assert_eq!(short_key("abc"), "abc");
        assert_eq!(short_key("0123456789abcdef0123"), "0123456789abcdef");
        // 18 bytes; byte 16 is inside the sixth character
        assert_eq!(short_key("日本語日本語"), "日本語日本語");
        assert_eq!(short_key(&"é".repeat(20)), "é".repeat(16));
    }

    #[test]
    fn test_tool_hint_fills_missing_source_tool() {
        let mut payload = Payload::new();
        apply_tool_hint(&mut payload, Some("kiro".into()));
        assert_eq!(payload["source_tool"], "kiro");
    }

    #[test]
    fn test_tool_hint_keeps_payload_source_tool() {
        let mut payload = Payload::new();
        payload.insert("source_tool".into(), Value::String("copilot".into()));
        apply_tool_hint(&mut payload, Some("kiro".into()));
        assert_eq!(payload["source_tool"], "copilot");
    }

    #[test]
    fn test_empty_tool_hint_is_ignored() {
        let mut payload = Payload::new();
        apply_tool_hint(&mut payload, Some(String::new()));
        apply_tool_hint(&mut payload, None);
        assert!(payload.is_empty());
    }
}
