//! OTLP/HTTP JSON exporter
//!
//! Encodes buffered spans as an `ExportTraceServiceRequest` in the OTLP JSON
//! mapping (hex ids, 64-bit integers as strings) and POSTs it to
//! `<endpoint>/v1/traces`.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;

use super::exporter::{header_map, HttpExporter};
use super::span::{AttributeValue, SpanRecord, SYSTEM_NAME};
use super::SpanExporter;
use crate::config::OtlpConfig;
use crate::error::{Error, Result};

const TRACES_PATH: &str = "/v1/traces";
/// OTLP `SPAN_KIND_INTERNAL`
const SPAN_KIND_INTERNAL: u8 = 1;

// ============================================
// OTLP JSON wire types
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceRequest {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Serialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
pub struct ScopeSpans {
    pub scope: Scope,
    pub spans: Vec<OtlpSpan>,
}

#[derive(Debug, Serialize)]
pub struct Scope {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpan {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub kind: u8,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Serialize)]
pub enum AnyValue {
    #[serde(rename = "stringValue")]
    String(String),
    /// int64 is a JSON string in the OTLP mapping
    #[serde(rename = "intValue")]
    Int(String),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "boolValue")]
    Bool(bool),
    #[serde(rename = "arrayValue")]
    Array(ArrayValue),
}

#[derive(Debug, Serialize)]
pub struct ArrayValue {
    pub values: Vec<AnyValue>,
}

impl From<&AttributeValue> for AnyValue {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::String(s) => AnyValue::String(s.clone()),
            AttributeValue::Int(i) => AnyValue::Int(i.to_string()),
            AttributeValue::Float(f) => AnyValue::Double(*f),
            AttributeValue::Bool(b) => AnyValue::Bool(*b),
            AttributeValue::StringArray(items) => AnyValue::Array(ArrayValue {
                values: items.iter().cloned().map(AnyValue::String).collect(),
            }),
        }
    }
}

fn unix_nanos(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.timestamp_nanos_opt().unwrap_or_default().max(0).to_string()
}

/// Encode `spans` as a single-resource OTLP trace export request.
pub fn encode_spans(spans: &[SpanRecord], service_name: &str) -> ExportTraceRequest {
    let spans = spans
        .iter()
        .map(|span| OtlpSpan {
            trace_id: span.trace_id_hex(),
            span_id: span.span_id_hex(),
            parent_span_id: span.parent_span_id.map(hex::encode),
            name: span.name.clone(),
            kind: SPAN_KIND_INTERNAL,
            start_time_unix_nano: unix_nanos(&span.start),
            end_time_unix_nano: unix_nanos(&span.end),
            attributes: span
                .attributes
                .iter()
                .map(|(key, value)| KeyValue {
                    key: key.clone(),
                    value: value.into(),
                })
                .collect(),
        })
        .collect();

    ExportTraceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Resource {
                attributes: vec![KeyValue {
                    key: "service.name".to_string(),
                    value: AnyValue::String(service_name.to_string()),
                }],
            },
            scope_spans: vec![ScopeSpans {
                scope: Scope {
                    name: SYSTEM_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                spans,
            }],
        }],
    }
}

/// Append `/v1/traces` unless the endpoint already names the traces path.
pub fn traces_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with(TRACES_PATH) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, TRACES_PATH)
    }
}

/// POSTs spans to an OTLP/HTTP collector
pub struct OtlpExporter {
    http: HttpExporter,
    url: String,
}

impl OtlpExporter {
    /// Returns `Ok(None)` when no endpoint is configured.
    pub fn from_config(config: &OtlpConfig) -> Result<Option<Self>> {
        let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) else {
            return Ok(None);
        };
        Self::with_headers(
            endpoint,
            header_map(config.header_pairs())?,
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    pub fn with_headers(endpoint: &str, headers: HeaderMap, timeout: Duration) -> Result<Self> {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::Config(format!(
                "OTLP endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }
        Ok(Self {
            http: HttpExporter::new(timeout, headers)?,
            url: traces_url(endpoint),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SpanExporter for OtlpExporter {
    fn name(&self) -> &'static str {
        "otlp"
    }

    fn export(&mut self, spans: &[SpanRecord]) -> Result<()> {
        let request = encode_spans(spans, SYSTEM_NAME);
        self.http.send_json(Method::POST, &self.url, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::span::SpanRole;

    #[test]
    fn test_traces_url() {
        assert_eq!(
            traces_url("http://localhost:4318"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            traces_url("http://localhost:4318/"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            traces_url("https://otel.example.com/v1/traces"),
            "https://otel.example.com/v1/traces"
        );
    }

    #[test]
    fn test_encode_spans_json_mapping() {
        let root = SpanRecord::root("claude - Turn 1", SpanRole::Turn)
            .with("session.id", "s1")
            .with("turn.number", 1u64)
            .with("gen_ai.prompt.truncated", false);
        let child = SpanRecord::child_of(&root, "Assistant Response", SpanRole::Generation);

        let value =
            serde_json::to_value(encode_spans(&[root.clone(), child], "otel-hooks")).unwrap();
        let rs = &value["resourceSpans"][0];
        assert_eq!(
            rs["resource"]["attributes"][0],
            serde_json::json!({"key": "service.name", "value": {"stringValue": "otel-hooks"}})
        );

        let spans = &rs["scopeSpans"][0]["spans"];
        assert_eq!(spans[0]["traceId"], root.trace_id_hex());
        assert!(spans[0].get("parentSpanId").is_none());
        assert_eq!(spans[1]["parentSpanId"], root.span_id_hex());
        assert_eq!(spans[0]["kind"], 1);
        assert!(spans[0]["startTimeUnixNano"].is_string());

        let attrs = spans[0]["attributes"].as_array().unwrap();
        let turn = attrs.iter().find(|a| a["key"] == "turn.number").unwrap();
        assert_eq!(turn["value"], serde_json::json!({"intValue": "1"}));
        let flag = attrs
            .iter()
            .find(|a| a["key"] == "gen_ai.prompt.truncated")
            .unwrap();
        assert_eq!(flag["value"], serde_json::json!({"boolValue": false}));
    }

    #[test]
    fn test_missing_endpoint_is_not_configured() {
        assert!(OtlpExporter::from_config(&OtlpConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_non_http_endpoint_is_rejected() {
        let config = OtlpConfig {
            endpoint: Some("localhost:4318".into()),
            ..Default::default()
        };
        assert!(OtlpExporter::from_config(&config).is_err());
    }

    #[test]
    fn test_configured_exporter_url() {
        let config = OtlpConfig {
            endpoint: Some("http://collector:4318".into()),
            headers: Some("x-api-key=abc".into()),
            ..Default::default()
        };
        let exporter = OtlpExporter::from_config(&config).unwrap().unwrap();
        assert_eq!(exporter.url(), "http://collector:4318/v1/traces");
    }
}
