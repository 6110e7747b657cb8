//! Langfuse exporter
//!
//! Langfuse ingests OTLP traces at `<base_url>/api/public/otel/v1/traces`
//! with HTTP Basic auth. Spans are the generic span tree plus the
//! `langfuse.*` attributes that drive sessions, trace names, tags and
//! observation types in the Langfuse UI.

use std::time::Duration;

use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::json;

use super::exporter::HttpExporter;
use super::otlp::encode_spans;
use super::span::{SpanRecord, SpanRole, SYSTEM_NAME};
use super::SpanExporter;
use crate::config::LangfuseConfig;
use crate::error::{Error, Result};

const OTEL_PATH: &str = "/api/public/otel/v1/traces";

/// Session id used for metric traces that carry none
const METRICS_SESSION: &str = "metrics";

pub struct LangfuseExporter {
    http: HttpExporter,
    url: String,
}

impl LangfuseExporter {
    /// Returns `Ok(None)` unless both API keys are configured.
    pub fn from_config(config: &LangfuseConfig) -> Result<Option<Self>> {
        if !config.is_ready() {
            return Ok(None);
        }
        let public_key = config.public_key.as_deref().unwrap_or_default();
        let secret_key = config.secret_key.as_deref().unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&basic_auth(public_key, secret_key))
                .map_err(|e| Error::Config(format!("invalid langfuse credentials: {}", e)))?,
        );

        Ok(Some(Self {
            http: HttpExporter::new(Duration::from_secs(config.timeout_secs), headers)?,
            url: format!("{}{}", config.base_url.trim_end_matches('/'), OTEL_PATH),
        }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn basic_auth(public_key: &str, secret_key: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", public_key, secret_key));
    format!("Basic {}", token)
}

fn message(role: &str, content: &str) -> String {
    json!({"role": role, "content": content}).to_string()
}

impl SpanExporter for LangfuseExporter {
    fn name(&self) -> &'static str {
        "langfuse"
    }

    fn decorate(&self, spans: &mut [SpanRecord]) {
        let Some(root) = spans.iter().find(|s| s.is_root()) else {
            return;
        };
        let trace_name = root.name.clone();
        let session_id = root
            .str_attribute("session.id")
            .filter(|s| !s.is_empty())
            .unwrap_or(METRICS_SESSION)
            .to_string();

        let mut tags = vec![SYSTEM_NAME.to_string()];
        match root.role {
            SpanRole::Metric => tags.push("metric".to_string()),
            SpanRole::Attribution => tags.push("attribution".to_string()),
            _ => {}
        }
        if let Some(tool) = root.str_attribute("source_tool") {
            tags.push(tool.to_string());
        }

        for span in spans.iter_mut() {
            span.set("langfuse.session.id", session_id.as_str());
            span.set("langfuse.trace.name", trace_name.as_str());

            let prompt = span.str_attribute("gen_ai.prompt").map(str::to_string);
            let completion = span.str_attribute("gen_ai.completion").map(str::to_string);

            let observation_type = match span.role {
                SpanRole::Generation => "generation",
                SpanRole::Tool => "tool",
                _ => "span",
            };
            span.set("langfuse.observation.type", observation_type);

            match span.role {
                SpanRole::Turn | SpanRole::Generation => {
                    if let Some(prompt) = &prompt {
                        span.set("langfuse.observation.input", message("user", prompt));
                    }
                    if let Some(completion) = &completion {
                        span.set(
                            "langfuse.observation.output",
                            message("assistant", completion),
                        );
                    }
                    if span.role == SpanRole::Generation {
                        if let Some(model) = span.str_attribute("gen_ai.request.model") {
                            let model = model.to_string();
                            span.set("langfuse.observation.model.name", model);
                        }
                    }
                }
                SpanRole::Tool => {
                    for (from, to) in [
                        ("tool.input", "langfuse.observation.input"),
                        ("tool.output", "langfuse.observation.output"),
                    ] {
                        if let Some(v) = span.str_attribute(from) {
                            let v = v.to_string();
                            span.set(to, v);
                        }
                    }
                }
                SpanRole::Metric => {
                    if let Some(value) = span.attribute("metric.value") {
                        let input = json!({"value": value.to_tag_string()}).to_string();
                        span.set("langfuse.observation.input", input);
                    }
                }
                SpanRole::Attribution | SpanRole::File => {}
            }

            if span.is_root() {
                span.set("langfuse.trace.tags", tags.clone());
                if let Some(prompt) = &prompt {
                    span.set("langfuse.trace.input", message("user", prompt));
                }
                if let Some(completion) = &completion {
                    span.set("langfuse.trace.output", message("assistant", completion));
                }
            }
        }
    }

    fn export(&mut self, spans: &[SpanRecord]) -> Result<()> {
        let request = encode_spans(spans, SYSTEM_NAME);
        self.http.send_json(Method::POST, &self.url, &request)
    }
}
