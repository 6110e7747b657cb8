//! # otel-hooks-core
//!
//! Core library for otel-hooks - turns AI coding assistant hook events into
//! traces and metrics for observability backends.
//!
//! This library provides:
//! - Normalization of per-tool hook payloads into canonical events
//! - Incremental, crash-safe reading of append-only JSONL transcripts
//! - Turn assembly and provider-agnostic turn payloads
//! - Session cursor state with atomic writes and an advisory lock
//! - Langfuse, OTLP and Datadog providers
//! - File attribution records for AI-authored changes
//! - Configuration management and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use otel_hooks_core::{Config, HookRunner};
//!
//! let config = Config::load().expect("failed to load config");
//! let payload = serde_json::json!({
//!     "session_id": "abc",
//!     "transcript_path": "~/.claude/projects/p/abc.jsonl",
//! });
//!
//! let outcome = HookRunner::new(config).run(payload.as_object().unwrap());
//! std::process::exit(i32::from(outcome.exit_code()));
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use hook::{AdapterRegistry, EventKind, HookEvent, MetricEvent, Payload, SourceTool};
pub use pipeline::{HookOutcome, HookRunner};
pub use providers::{Provider, ProviderFactory, ProviderKind, ProviderRegistry};
pub use state::{state_key, SessionState, StateStore};

// Public modules
pub mod attribution;
pub mod config;
pub mod error;
pub mod hook;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod providers;
pub mod state;
pub mod transcript;
