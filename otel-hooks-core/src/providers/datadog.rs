//! Datadog Agent exporter
//!
//! Sends spans to the local agent's v0.3 trace intake
//! (`PUT http://<host>:<port>/v0.3/traces`) as a JSON array of traces, each
//! an array of spans sharing a 64-bit trace id.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;

use super::exporter::HttpExporter;
use super::span::{SpanRecord, SpanRole};
use super::SpanExporter;
use crate::config::DatadogConfig;
use crate::error::Result;

#[derive(Debug, Serialize, PartialEq)]
pub struct DatadogSpan {
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_id: u64,
    pub name: String,
    pub resource: String,
    pub service: String,
    #[serde(rename = "type")]
    pub span_type: String,
    /// Unix nanoseconds
    pub start: i64,
    pub duration: i64,
    pub meta: BTreeMap<String, String>,
}

pub struct DatadogExporter {
    http: HttpExporter,
    url: String,
    service: String,
    env: Option<String>,
}

impl DatadogExporter {
    pub fn from_config(config: &DatadogConfig) -> Result<Self> {
        Ok(Self {
            http: HttpExporter::new(Duration::from_secs(config.timeout_secs), HeaderMap::new())?,
            url: format!(
                "http://{}:{}/v0.3/traces",
                config.agent_host, config.agent_port
            ),
            service: config.service.clone(),
            env: config.env.clone().filter(|e| !e.is_empty()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Group spans into traces in the agent's v0.3 layout.
    pub fn encode(&self, spans: &[SpanRecord]) -> Vec<Vec<DatadogSpan>> {
        let mut traces: Vec<Vec<DatadogSpan>> = Vec::new();
        for span in spans {
            let dd = self.convert(span);
            match traces
                .iter_mut()
                .find(|t| t.first().is_some_and(|s| s.trace_id == dd.trace_id))
            {
                Some(trace) => trace.push(dd),
                None => traces.push(vec![dd]),
            }
        }
        traces
    }

    fn convert(&self, span: &SpanRecord) -> DatadogSpan {
        let (name, span_type) = match span.role {
            SpanRole::Turn => ("ai_session.turn", "llm"),
            SpanRole::Generation => ("ai_session.generation", "llm"),
            SpanRole::Tool => ("ai_session.tool", "tool"),
            SpanRole::Metric => ("ai_session.metric", "custom"),
            SpanRole::Attribution => ("ai_session.attribution", "custom"),
            SpanRole::File => ("ai_session.file_attribution", "custom"),
        };

        let mut meta: BTreeMap<String, String> = span
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_tag_string()))
            .collect();
        if let Some(env) = &self.env {
            meta.insert("env".to_string(), env.clone());
        }

        let start = span.start.timestamp_nanos_opt().unwrap_or_default();
        let end = span.end.timestamp_nanos_opt().unwrap_or(start);

        DatadogSpan {
            trace_id: id64(&span.trace_id[..8]),
            span_id: id64(&span.span_id),
            parent_id: span.parent_span_id.map(|p| id64(&p)).unwrap_or(0),
            name: name.to_string(),
            resource: span.name.clone(),
            service: self.service.clone(),
            span_type: span_type.to_string(),
            start,
            duration: (end - start).max(0),
            meta,
        }
    }
}

/// Positive 63-bit id from the first eight bytes of `bytes`
fn id64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    (u64::from_be_bytes(buf) >> 1).max(1)
}

impl SpanExporter for DatadogExporter {
    fn name(&self) -> &'static str {
        "datadog"
    }

    fn export(&mut self, spans: &[SpanRecord]) -> Result<()> {
        let traces = self.encode(spans);
        self.http.send_json(Method::PUT, &self.url, &traces)
    }
}
