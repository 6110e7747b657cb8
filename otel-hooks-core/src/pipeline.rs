//! Hook orchestrator
//!
//! One [`HookRunner::run`] call handles one lifecycle event end to end:
//!
//! ```text
//! payload -> event -> metric path:  emit_metric -> flush
//!                  -> trace path:   lock -> load -> read -> turns -> emit*
//!                                   -> commit (or roll back) -> attribution
//!                                   -> flush
//! ```
//!
//! `shutdown` is always called on a constructed provider. Local failures
//! (state I/O, attribution) are logged and never change the outcome; only
//! provider errors produce a failing [`HookOutcome`].

use std::path::Path;
use std::time::Instant;

use crate::attribution::attribute_turns;
use crate::config::Config;
use crate::hook::{AdapterRegistry, EventKind, HookEvent, MetricEvent, Payload};
use crate::providers::{Provider, ProviderFactory, ProviderRegistry};
use crate::state::{state_key, StateStore};
use crate::transcript::{build_turn_payload, build_turns, decode_lines, read_new_lines};

/// Terminal state of one hook invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// No provider configured
    NoProvider,
    /// No adapter recognized the payload
    Unrecognized,
    /// Trace event without a readable transcript
    TranscriptUnavailable,
    /// The provider could not be constructed
    ProviderUnavailable,
    /// The transcript had no complete new turns
    NothingNew,
    /// All new turns were emitted and committed
    Emitted { turns: u64 },
    MetricEmitted,
    /// An emit call failed; `emitted` turns reached the provider before it
    EmitFailed { emitted: u64 },
    FlushFailed,
}

impl HookOutcome {
    /// Process exit code for the host tool
    pub fn exit_code(&self) -> u8 {
        match self {
            HookOutcome::ProviderUnavailable
            | HookOutcome::EmitFailed { .. }
            | HookOutcome::FlushFailed => 1,
            _ => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Runs the hook pipeline against a configuration
pub struct HookRunner<F = ProviderRegistry> {
    config: Config,
    adapters: AdapterRegistry,
    factory: F,
}

impl HookRunner<ProviderRegistry> {
    /// Runner with the default adapter order and bundled providers
    pub fn new(config: Config) -> Self {
        Self::with_factory(config, AdapterRegistry::default(), ProviderRegistry::default())
    }
}

impl<F: ProviderFactory> HookRunner<F> {
    pub fn with_factory(config: Config, adapters: AdapterRegistry, factory: F) -> Self {
        Self {
            config,
            adapters,
            factory,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process one hook payload.
    pub fn run(&self, payload: &Payload) -> HookOutcome {
        let start = Instant::now();

        let Some(provider_name) = self.config.provider.as_deref().filter(|p| !p.is_empty())
        else {
            tracing::debug!("No provider configured; exiting");
            return HookOutcome::NoProvider;
        };

        let Some(event) = self.adapters.parse(payload) else {
            tracing::debug!("No adapter matched the payload; exiting");
            return HookOutcome::Unrecognized;
        };

        if let EventKind::Trace { transcript_path } = &event.kind {
            match transcript_path {
                None => {
                    tracing::debug!(
                        tool = %event.source_tool,
                        "No transcript path for trace event; exiting"
                    );
                    return HookOutcome::TranscriptUnavailable;
                }
                Some(path) if !path.exists() => {
                    tracing::debug!(path = %path.display(), "Transcript file not found; exiting");
                    return HookOutcome::TranscriptUnavailable;
                }
                Some(_) => {}
            }
        }

        let Some(mut provider) = self.factory.create(provider_name, &self.config) else {
            tracing::warn!(provider = provider_name, "Failed to create provider");
            return HookOutcome::ProviderUnavailable;
        };

        let outcome = match &event.kind {
            EventKind::Metric(metric) => self.run_metric(provider.as_mut(), &event, metric),
            EventKind::Trace {
                transcript_path: Some(path),
            } => self.run_trace(provider.as_mut(), &event, path),
            EventKind::Trace {
                transcript_path: None,
            } => HookOutcome::TranscriptUnavailable,
        };

        if let Err(e) = provider.shutdown() {
            tracing::debug!(provider = provider_name, error = %e, "Provider shutdown failed");
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            HookOutcome::Emitted { turns } => tracing::info!(
                session = %event.session_id,
                provider = provider_name,
                tool = %event.source_tool,
                turns,
                duration_ms,
                "Processed turns"
            ),
            HookOutcome::MetricEmitted => tracing::info!(
                session = %event.session_id,
                provider = provider_name,
                tool = %event.source_tool,
                duration_ms,
                "Processed metric"
            ),
            HookOutcome::EmitFailed { emitted } => tracing::warn!(
                session = %event.session_id,
                provider = provider_name,
                emitted,
                duration_ms,
                "Partial failure; session cursor rolled back"
            ),
            _ => {}
        }

        outcome
    }

    fn run_metric(
        &self,
        provider: &mut dyn Provider,
        event: &HookEvent,
        metric: &MetricEvent,
    ) -> HookOutcome {
        if let Err(e) = provider.emit_metric(
            &metric.name,
            metric.value,
            &metric.attributes,
            event.source_tool,
            &event.session_id,
        ) {
            tracing::warn!(metric = %metric.name, error = %e, "emit_metric failed");
            return HookOutcome::EmitFailed { emitted: 0 };
        }

        if let Err(e) = provider.flush() {
            tracing::warn!(error = %e, "flush failed");
            return HookOutcome::FlushFailed;
        }
        HookOutcome::MetricEmitted
    }

    fn run_trace(
        &self,
        provider: &mut dyn Provider,
        event: &HookEvent,
        transcript_path: &Path,
    ) -> HookOutcome {
        let store = StateStore::from_config(&self.config);
        let key = state_key(&event.session_id, transcript_path);

        let lock = store.lock();
        let mut states = store.load();
        let before = states.get(&key);

        let (lines, mut after) = read_new_lines(transcript_path, &before);
        let turns = build_turns(decode_lines(&lines));

        let mut emitted: u64 = 0;
        let mut emit_failed = false;
        for turn in &turns {
            let turn_num = before.turn_count + emitted + 1;
            let payload = build_turn_payload(turn, self.config.max_chars);
            if let Err(e) = provider.emit_turn(
                &event.session_id,
                turn_num,
                &payload,
                Some(transcript_path),
                event.source_tool,
            ) {
                tracing::warn!(turn = turn_num, error = %e, "emit_turn failed");
                emit_failed = true;
                break;
            }
            emitted += 1;
        }

        if emit_failed {
            // Re-read the same bytes next time
            after = before.clone();
        } else {
            after.turn_count += emitted;
        }

        if after != before {
            states.put(&key, &after);
            if let Err(e) = store.save(&mut states) {
                tracing::warn!(error = %e, "Failed to save session state");
            }
        }
        drop(lock);

        if turns.is_empty() {
            return HookOutcome::NothingNew;
        }

        if self.config.attribution.enabled && !emit_failed {
            self.emit_attribution(provider, event, &turns);
        }

        if let Err(e) = provider.flush() {
            tracing::warn!(error = %e, "flush failed");
            return HookOutcome::FlushFailed;
        }

        if emit_failed {
            HookOutcome::EmitFailed { emitted }
        } else {
            HookOutcome::Emitted { turns: emitted }
        }
    }

    fn emit_attribution(
        &self,
        provider: &mut dyn Provider,
        event: &HookEvent,
        turns: &[crate::transcript::Turn],
    ) {
        let Some(record) = attribute_turns(turns, event.source_tool, event.cwd.as_deref()) else {
            tracing::debug!("No attributable file changes");
            return;
        };
        tracing::debug!(files = record.files.len(), "Emitting attribution");
        if let Err(e) = provider.emit_attribution(&event.session_id, &record, event.source_tool) {
            tracing::warn!(error = %e, "emit_attribution failed");
        }
    }
}
