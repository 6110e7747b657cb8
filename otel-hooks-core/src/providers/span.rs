//! Backend-neutral span model
//!
//! Providers first describe every emit call as a small tree of
//! [`SpanRecord`]s carrying generic `gen_ai.*` / `tool.*` attributes, then
//! encode that tree into their backend's wire format on flush.

use crate::attribution::AttributionRecord;
use crate::hook::SourceTool;
use crate::transcript::{TruncationMeta, TurnPayload};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// Value of `gen_ai.system` on every span
pub const SYSTEM_NAME: &str = "otel-hooks";

/// A typed span attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    StringArray(Vec<String>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Flatten to a string for backends that only take string tags
    pub fn to_tag_string(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Int(i) => i.to_string(),
            AttributeValue::Float(f) => f.to_string(),
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::StringArray(items) => items.join(","),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<u64> for AttributeValue {
    fn from(i: u64) -> Self {
        AttributeValue::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<usize> for AttributeValue {
    fn from(i: usize) -> Self {
        AttributeValue::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(items: Vec<String>) -> Self {
        AttributeValue::StringArray(items)
    }
}

/// What a span represents, so backends can pick their own span types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanRole {
    Turn,
    Generation,
    Tool,
    Metric,
    Attribution,
    File,
}

/// One finished span
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub parent_span_id: Option<[u8; 8]>,
    pub name: String,
    pub role: SpanRole,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl SpanRecord {
    /// Start a new trace
    pub fn root(name: impl Into<String>, role: SpanRole) -> Self {
        let now = Utc::now();
        Self {
            trace_id: *Uuid::new_v4().as_bytes(),
            span_id: new_span_id(),
            parent_span_id: None,
            name: name.into(),
            role,
            start: now,
            end: now,
            attributes: BTreeMap::new(),
        }
    }

    pub fn child_of(parent: &SpanRecord, name: impl Into<String>, role: SpanRole) -> Self {
        let now = Utc::now();
        Self {
            trace_id: parent.trace_id,
            span_id: new_span_id(),
            parent_span_id: Some(parent.span_id),
            name: name.into(),
            role,
            start: now,
            end: now,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attribute(key).and_then(AttributeValue::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    pub fn trace_id_hex(&self) -> String {
        hex::encode(self.trace_id)
    }

    pub fn span_id_hex(&self) -> String {
        hex::encode(self.span_id)
    }

    /// Mark the span finished now
    fn finish(mut self) -> Self {
        self.end = Utc::now();
        self
    }
}

fn new_span_id() -> [u8; 8] {
    let bytes = Uuid::new_v4().into_bytes();
    let mut id = [0u8; 8];
    id.copy_from_slice(&bytes[..8]);
    id
}

fn set_truncation(span: &mut SpanRecord, prefix: &str, meta: &TruncationMeta) {
    span.set(&format!("{}.truncated", prefix), meta.truncated);
    span.set(&format!("{}.orig_len", prefix), meta.orig_len);
    if let Some(sha) = &meta.sha256 {
        span.set(&format!("{}.sha256", prefix), sha.as_str());
    }
}

/// Spans for one turn: the turn root, the assistant response, one per tool call.
pub fn turn_spans(
    session_id: &str,
    turn_num: u64,
    payload: &TurnPayload,
    transcript_path: Option<&Path>,
    source_tool: SourceTool,
) -> Vec<SpanRecord> {
    let mut root = SpanRecord::root(format!("{} - Turn {}", source_tool, turn_num), SpanRole::Turn)
        .with("session.id", session_id)
        .with("gen_ai.system", SYSTEM_NAME)
        .with("gen_ai.request.model", payload.model.as_str())
        .with("gen_ai.prompt", payload.user_text.text.as_str())
        .with("gen_ai.completion", payload.assistant_text.text.as_str())
        .with("source_tool", source_tool.as_str())
        .with("turn.number", turn_num);
    if let Some(path) = transcript_path {
        root.set("transcript_path", path.display().to_string());
    }
    set_truncation(&mut root, "gen_ai.prompt", &payload.user_text.meta);
    set_truncation(&mut root, "gen_ai.completion", &payload.assistant_text.meta);

    let mut spans = Vec::with_capacity(2 + payload.tool_calls.len());

    spans.push(
        SpanRecord::child_of(&root, "Assistant Response", SpanRole::Generation)
            .with("gen_ai.request.model", payload.model.as_str())
            .with("gen_ai.prompt", payload.user_text.text.as_str())
            .with("gen_ai.completion", payload.assistant_text.text.as_str())
            .with("gen_ai.usage.tool_count", payload.tool_calls.len())
            .finish(),
    );

    for call in &payload.tool_calls {
        let mut span = SpanRecord::child_of(&root, format!("Tool: {}", call.name), SpanRole::Tool)
            .with("tool.name", call.name.as_str())
            .with("tool.id", call.id.as_str())
            .with("tool.input", call.input.to_display_string())
            .with(
                "tool.output",
                call.output
                    .as_ref()
                    .map(|o| o.text.clone())
                    .unwrap_or_default(),
            );
        if let Some(meta) = call.input.meta() {
            set_truncation(&mut span, "tool.input", meta);
        }
        if let Some(output) = &call.output {
            set_truncation(&mut span, "tool.output", &output.meta);
        }
        spans.push(span.finish());
    }

    spans.insert(0, root.finish());
    spans
}

/// A single span describing one metric observation.
pub fn metric_span(
    name: &str,
    value: f64,
    attributes: &BTreeMap<String, String>,
    source_tool: SourceTool,
    session_id: &str,
) -> SpanRecord {
    let mut span = SpanRecord::root(format!("Metric - {}", name), SpanRole::Metric)
        .with("metric.name", name)
        .with("metric.value", value)
        .with("gen_ai.system", SYSTEM_NAME)
        .with("source_tool", source_tool.as_str());
    if !session_id.is_empty() {
        span.set("session.id", session_id);
    }
    for (k, v) in attributes {
        span.set(&format!("metric.attr.{}", k), v.as_str());
    }
    span.finish()
}

/// Spans for an attribution record: a root plus one child per file.
pub fn attribution_spans(
    session_id: &str,
    record: &AttributionRecord,
    source_tool: SourceTool,
) -> Vec<SpanRecord> {
    let mut root = SpanRecord::root(
        format!("{} - Attribution", source_tool),
        SpanRole::Attribution,
    )
    .with("session.id", session_id)
    .with("gen_ai.system", SYSTEM_NAME)
    .with("source_tool", source_tool.as_str())
    .with("attribution.id", record.id.as_str())
    .with("attribution.version", record.version.as_str())
    .with("attribution.file_count", record.files.len());
    if let Some(vcs) = &record.vcs {
        root.set("vcs.type", vcs.kind.as_str());
        root.set("vcs.revision", vcs.revision.as_str());
    }

    let mut spans = vec![root.clone().finish()];
    for file in &record.files {
        let mut span = SpanRecord::child_of(&root, format!("File: {}", file.path), SpanRole::File)
            .with("session.id", session_id)
            .with("source_tool", source_tool.as_str())
            .with("file.path", file.path.as_str());

        match file.primary() {
            Some(conv) => {
                span.set("attribution.contributor", conv.contributor.kind.as_str());
                if let Some(model) = &conv.contributor.model {
                    span.set("ai.model", model.as_str());
                }
                if let (Some(first), Some(last)) = (conv.ranges.first(), conv.ranges.last()) {
                    span.set("file.lines.start", first.start_line);
                    span.set("file.lines.end", last.end_line);
                    span.set(
                        "file.lines.count",
                        conv.ranges.iter().map(|r| r.line_count()).sum::<u64>(),
                    );
                }
            }
            None => span.set("attribution.contributor", "unknown"),
        }
        spans.push(span.finish());
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::{Contributor, Conversation, FileRecord, Range};
    use crate::transcript::{build_turn_payload, build_turns, decode_lines};

    fn payload() -> TurnPayload {
        let turns = build_turns(decode_lines(&[
            r#"{"type":"user","message":{"role":"user","content":"run ls"}}"#,
            r#"{"type":"assistant","message":{"id":"a1","role":"assistant","model":"claude-x","content":[{"type":"text","text":"ok"},{"type":"tool_use","id":"tu1","name":"Bash","input":{"command":"ls"}}]}}"#,
            r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu1","content":"a.txt"}]}}"#,
        ]));
        build_turn_payload(&turns[0], 100)
    }

    #[test]
    fn test_turn_span_tree() {
        let spans = turn_spans(
            "s1",
            3,
            &payload(),
            Some(Path::new("/tmp/t.jsonl")),
            SourceTool::Claude,
        );
        assert_eq!(spans.len(), 3);

        let root = &spans[0];
        assert!(root.is_root());
        assert_eq!(root.name, "claude - Turn 3");
        assert_eq!(root.str_attribute("session.id"), Some("s1"));
        assert_eq!(root.str_attribute("gen_ai.prompt"), Some("run ls"));
        assert_eq!(root.str_attribute("transcript_path"), Some("/tmp/t.jsonl"));
        assert_eq!(root.attribute("turn.number"), Some(&AttributeValue::Int(3)));
        assert_eq!(
            root.attribute("gen_ai.prompt.truncated"),
            Some(&AttributeValue::Bool(false))
        );

        assert_eq!(spans[1].name, "Assistant Response");
        assert_eq!(spans[1].role, SpanRole::Generation);
        assert_eq!(spans[2].name, "Tool: Bash");
        assert_eq!(spans[2].str_attribute("tool.output"), Some("a.txt"));

        for child in &spans[1..] {
            assert_eq!(child.trace_id, root.trace_id);
            assert_eq!(child.parent_span_id, Some(root.span_id));
        }
    }

    #[test]
    fn test_metric_span_attributes() {
        let mut attrs = BTreeMap::new();
        attrs.insert("tool_name".to_string(), "Bash".to_string());
        let span = metric_span("tool_started", 1.0, &attrs, SourceTool::Kiro, "");

        assert_eq!(span.name, "Metric - tool_started");
        assert_eq!(span.str_attribute("metric.attr.tool_name"), Some("Bash"));
        assert_eq!(span.attribute("metric.value"), Some(&AttributeValue::Float(1.0)));
        assert!(span.attribute("session.id").is_none());
    }

    #[test]
    fn test_attribution_spans() {
        let record = AttributionRecord::new(
            vec![FileRecord {
                path: "src/lib.rs".into(),
                conversations: vec![Conversation {
                    contributor: Contributor::ai(Some("anthropic/claude-x".into())),
                    ranges: vec![Range {
                        start_line: 1,
                        end_line: 12,
                    }],
                    url: None,
                }],
            }],
            None,
        );
        let spans = attribution_spans("s1", &record, SourceTool::Claude);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "claude - Attribution");
        assert_eq!(
            spans[0].attribute("attribution.file_count"),
            Some(&AttributeValue::Int(1))
        );
        assert_eq!(spans[1].name, "File: src/lib.rs");
        assert_eq!(spans[1].str_attribute("ai.model"), Some("anthropic/claude-x"));
        assert_eq!(
            spans[1].attribute("file.lines.count"),
            Some(&AttributeValue::Int(12))
        );
    }

    #[test]
    fn test_ids_are_hex_and_non_zero() {
        let span = SpanRecord::root("x", SpanRole::Metric);
        assert_eq!(span.trace_id_hex().len(), 32);
        assert_eq!(span.span_id_hex().len(), 16);
        assert_ne!(span.span_id, [0u8; 8]);
    }
}
