//! Observability backends
//!
//! The pipeline talks to every backend through the [`Provider`] trait. The
//! bundled backends share one implementation, [`BufferedProvider`]: emit
//! calls turn into span trees kept in memory, and `flush` hands the whole
//! buffer to a backend-specific [`SpanExporter`] in a single request.
//!
//! Providers are constructed through a [`ProviderFactory`]. The default
//! factory, [`ProviderRegistry`], knows the bundled [`ProviderKind`]s; tests
//! pass their own factory to record calls instead.

pub mod datadog;
pub mod exporter;
pub mod langfuse;
pub mod otlp;
pub mod span;

pub use datadog::DatadogExporter;
pub use exporter::HttpExporter;
pub use langfuse::LangfuseExporter;
pub use otlp::OtlpExporter;
pub use span::{AttributeValue, SpanRecord, SpanRole};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::attribution::AttributionRecord;
use crate::config::Config;
use crate::error::Result;
use crate::hook::SourceTool;
use crate::transcript::TurnPayload;

/// Emission contract between the pipeline and a backend.
///
/// Calls are synchronous. An `Err` from `emit_turn` aborts the batch and
/// rolls the session cursor back; `flush` must deliver everything emitted
/// so far.
pub trait Provider {
    fn name(&self) -> &str;

    fn emit_turn(
        &mut self,
        session_id: &str,
        turn_num: u64,
        payload: &TurnPayload,
        transcript_path: Option<&Path>,
        source_tool: SourceTool,
    ) -> Result<()>;

    fn emit_metric(
        &mut self,
        name: &str,
        value: f64,
        attributes: &BTreeMap<String, String>,
        source_tool: SourceTool,
        session_id: &str,
    ) -> Result<()>;

    fn emit_attribution(
        &mut self,
        session_id: &str,
        record: &AttributionRecord,
        source_tool: SourceTool,
    ) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Release resources. Called exactly once, after everything else.
    fn shutdown(&mut self) -> Result<()>;
}

/// Backend-specific half of a [`BufferedProvider`]
pub trait SpanExporter {
    fn name(&self) -> &'static str;

    /// Add backend-specific attributes to one emitted span tree.
    fn decorate(&self, _spans: &mut [SpanRecord]) {}

    /// Deliver a batch of spans.
    fn export(&mut self, spans: &[SpanRecord]) -> Result<()>;
}

/// A provider that buffers span trees until flush
pub struct BufferedProvider<E> {
    exporter: E,
    buffer: Vec<SpanRecord>,
}

impl<E: SpanExporter> BufferedProvider<E> {
    pub fn new(exporter: E) -> Self {
        Self {
            exporter,
            buffer: Vec::new(),
        }
    }

    /// Spans emitted since the last flush
    pub fn pending(&self) -> &[SpanRecord] {
        &self.buffer
    }

    fn push(&mut self, mut spans: Vec<SpanRecord>) {
        self.exporter.decorate(&mut spans);
        self.buffer.extend(spans);
    }
}

impl<E: SpanExporter> Provider for BufferedProvider<E> {
    fn name(&self) -> &str {
        self.exporter.name()
    }

    fn emit_turn(
        &mut self,
        session_id: &str,
        turn_num: u64,
        payload: &TurnPayload,
        transcript_path: Option<&Path>,
        source_tool: SourceTool,
    ) -> Result<()> {
        self.push(span::turn_spans(
            session_id,
            turn_num,
            payload,
            transcript_path,
            source_tool,
        ));
        Ok(())
    }

    fn emit_metric(
        &mut self,
        name: &str,
        value: f64,
        attributes: &BTreeMap<String, String>,
        source_tool: SourceTool,
        session_id: &str,
    ) -> Result<()> {
        self.push(vec![span::metric_span(
            name,
            value,
            attributes,
            source_tool,
            session_id,
        )]);
        Ok(())
    }

    fn emit_attribution(
        &mut self,
        session_id: &str,
        record: &AttributionRecord,
        source_tool: SourceTool,
    ) -> Result<()> {
        self.push(span::attribution_spans(session_id, record, source_tool));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let spans = std::mem::take(&mut self.buffer);
        tracing::debug!(
            provider = self.exporter.name(),
            spans = spans.len(),
            "Exporting spans"
        );
        self.exporter.export(&spans)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.flush()
    }
}

pub type OtlpProvider = BufferedProvider<OtlpExporter>;
pub type LangfuseProvider = BufferedProvider<LangfuseExporter>;
pub type DatadogProvider = BufferedProvider<DatadogExporter>;

/// Bundled backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Langfuse,
    Otlp,
    Datadog,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Langfuse,
        ProviderKind::Otlp,
        ProviderKind::Datadog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Langfuse => "langfuse",
            ProviderKind::Otlp => "otlp",
            ProviderKind::Datadog => "datadog",
        }
    }

    /// Build this backend from `config`.
    ///
    /// `Ok(None)` means required settings (credentials, endpoint) are missing.
    pub fn build(&self, config: &Config) -> Result<Option<Box<dyn Provider>>> {
        let provider: Option<Box<dyn Provider>> = match self {
            ProviderKind::Langfuse => LangfuseExporter::from_config(&config.langfuse)?
                .map(|e| Box::new(BufferedProvider::new(e)) as Box<dyn Provider>),
            ProviderKind::Otlp => OtlpExporter::from_config(&config.otlp)?
                .map(|e| Box::new(BufferedProvider::new(e)) as Box<dyn Provider>),
            ProviderKind::Datadog => Some(Box::new(BufferedProvider::new(
                DatadogExporter::from_config(&config.datadog)?,
            )) as Box<dyn Provider>),
        };
        Ok(provider)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown provider: {}", s))
    }
}

/// Creates the provider named in the configuration.
pub trait ProviderFactory {
    /// `None` when the provider is unknown or cannot be constructed.
    fn create(&self, name: &str, config: &Config) -> Option<Box<dyn Provider>>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&str, &Config) -> Option<Box<dyn Provider>>,
{
    fn create(&self, name: &str, config: &Config) -> Option<Box<dyn Provider>> {
        self(name, config)
    }
}

/// Factory for the bundled backends.
///
/// Built once at process start and handed to the pipeline.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    kinds: Vec<ProviderKind>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            kinds: ProviderKind::ALL.to_vec(),
        }
    }
}

impl ProviderRegistry {
    /// Registry restricted to `kinds`
    pub fn with_kinds(kinds: Vec<ProviderKind>) -> Self {
        Self { kinds }
    }

    pub fn kinds(&self) -> &[ProviderKind] {
        &self.kinds
    }
}

impl ProviderFactory for ProviderRegistry {
    fn create(&self, name: &str, config: &Config) -> Option<Box<dyn Provider>> {
        let kind = match name.parse::<ProviderKind>() {
            Ok(kind) if self.kinds.contains(&kind) => kind,
            _ => {
                tracing::warn!(provider = name, "Unknown provider");
                return None;
            }
        };

        match kind.build(config) {
            Ok(Some(provider)) => Some(provider),
            Ok(None) => {
                tracing::warn!(
                    provider = name,
                    "Provider is missing required configuration"
                );
                None
            }
            Err(e) => {
                tracing::warn!(provider = name, error = %e, "Failed to create provider");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingExporter {
        batches: Vec<usize>,
    }

    impl SpanExporter for CountingExporter {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn export(&mut self, spans: &[SpanRecord]) -> Result<()> {
            self.batches.push(spans.len());
            Ok(())
        }
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("OTLP".parse::<ProviderKind>(), Ok(ProviderKind::Otlp));
        assert_eq!(" langfuse ".parse::<ProviderKind>(), Ok(ProviderKind::Langfuse));
        assert!("nope".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_registry_requires_configuration() {
        let registry = ProviderRegistry::default();
        let config = Config::default();
        assert!(registry.create("otlp", &config).is_none());
        assert!(registry.create("langfuse", &config).is_none());
        assert!(registry.create("unknown", &config).is_none());
        // Datadog only needs the local agent defaults
        assert_eq!(
            registry.create("datadog", &config).map(|p| p.name().to_string()),
            Some("datadog".to_string())
        );
    }

    #[test]
    fn test_registry_restricted_kinds() {
        let registry = ProviderRegistry::with_kinds(vec![ProviderKind::Otlp]);
        assert!(registry.create("datadog", &Config::default()).is_none());
    }

    #[test]
    fn test_buffered_provider_flushes_once() {
        let mut provider = BufferedProvider::new(CountingExporter { batches: vec![] });
        provider
            .emit_metric(
                "tool_started",
                1.0,
                &BTreeMap::new(),
                SourceTool::Kiro,
                "",
            )
            .unwrap();
        provider
            .emit_metric("tool_completed", 1.0, &BTreeMap::new(), SourceTool::Kiro, "")
            .unwrap();
        assert_eq!(provider.pending().len(), 2);

        provider.flush().unwrap();
        provider.flush().unwrap();
        provider.shutdown().unwrap();
        assert!(provider.pending().is_empty());
        assert_eq!(provider.exporter.batches, vec![2]);
    }

    #[test]
    fn test_closure_factory() {
        let factory = |name: &str, _config: &Config| -> Option<Box<dyn Provider>> {
            (name == "counting").then(|| {
                Box::new(BufferedProvider::new(CountingExporter { batches: vec![] }))
                    as Box<dyn Provider>
            })
        };
        assert!(factory.create("counting", &Config::default()).is_some());
        assert!(factory.create("other", &Config::default()).is_none());
    }
}
