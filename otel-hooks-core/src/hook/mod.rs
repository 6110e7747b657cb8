//! Hook payload normalization
//!
//! Every host tool delivers a differently shaped JSON object on stdin. This
//! module turns that object into a canonical [`HookEvent`].
//!
//! Matching is a pure function from payload shape to a [`SourceTool`]
//! variant. The [`AdapterRegistry`] holds the order in which tools are tried:
//! the most distinctive shapes come first and the generic Claude-style shape
//! (`session_id` only) comes last, so ambiguous payloads resolve to the more
//! specific tool. A `source_tool` hint naming a known tool is tried before the
//! ordered scan.

mod adapters;

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Raw hook payload as delivered on stdin.
pub type Payload = Map<String, Value>;

/// AI coding tools that can emit hook events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTool {
    Claude,
    Cursor,
    Gemini,
    Cline,
    Codex,
    Copilot,
    Kiro,
    OpenCode,
}

impl SourceTool {
    /// All known tools
    pub const ALL: [SourceTool; 8] = [
        SourceTool::Claude,
        SourceTool::Cursor,
        SourceTool::Gemini,
        SourceTool::Cline,
        SourceTool::Codex,
        SourceTool::Copilot,
        SourceTool::Kiro,
        SourceTool::OpenCode,
    ];

    /// Stable lowercase identifier used in payload hints, span names and attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTool::Claude => "claude",
            SourceTool::Cursor => "cursor",
            SourceTool::Gemini => "gemini",
            SourceTool::Cline => "cline",
            SourceTool::Codex => "codex",
            SourceTool::Copilot => "copilot",
            SourceTool::Kiro => "kiro",
            SourceTool::OpenCode => "opencode",
        }
    }

    /// models.dev provider prefix for models produced through this tool
    pub fn model_prefix(&self) -> Option<&'static str> {
        match self {
            SourceTool::Claude => Some("anthropic"),
            SourceTool::Gemini => Some("google"),
            SourceTool::Codex | SourceTool::OpenCode => Some("openai"),
            _ => None,
        }
    }

    /// Try to build an event from `payload` using this tool's adapter.
    pub fn parse(&self, payload: &Payload) -> Option<HookEvent> {
        adapters::parse(*self, payload)
    }
}

impl fmt::Display for SourceTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceTool::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown tool: {}", s))
    }
}

/// A single metric observation from a metrics-only tool.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    pub name: String,
    pub value: f64,
    pub attributes: BTreeMap<String, String>,
}

/// What the pipeline should do with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Read the transcript and emit turns. No path means nothing to read.
    Trace { transcript_path: Option<PathBuf> },
    /// Emit a single metric; metrics never touch transcripts or state.
    Metric(MetricEvent),
}

/// Canonical, tool-independent hook event.
#[derive(Debug, Clone, PartialEq)]
pub struct HookEvent {
    pub source_tool: SourceTool,
    /// Empty for metric events from tools that expose no session id
    pub session_id: String,
    /// Working directory reported by the host tool
    pub cwd: Option<PathBuf>,
    pub kind: EventKind,
}

impl HookEvent {
    /// Transcript path of a trace event
    pub fn transcript_path(&self) -> Option<&PathBuf> {
        match &self.kind {
            EventKind::Trace { transcript_path } => transcript_path.as_ref(),
            EventKind::Metric(_) => None,
        }
    }

    pub fn is_metric(&self) -> bool {
        matches!(self.kind, EventKind::Metric(_))
    }
}

/// Ordered set of payload adapters.
///
/// Built once at process start and handed to the pipeline.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    order: Vec<SourceTool>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self {
            order: vec![
                SourceTool::OpenCode,
                SourceTool::Cursor,
                SourceTool::Gemini,
                SourceTool::Cline,
                SourceTool::Codex,
                SourceTool::Copilot,
                SourceTool::Kiro,
                SourceTool::Claude,
            ],
        }
    }
}

impl AdapterRegistry {
    /// Registry with a custom match order.
    pub fn with_order(order: Vec<SourceTool>) -> Self {
        Self { order }
    }

    /// Tools in the order they are tried
    pub fn order(&self) -> &[SourceTool] {
        &self.order
    }

    /// Normalize `payload`, or `None` when no registered adapter matches.
    pub fn parse(&self, payload: &Payload) -> Option<HookEvent> {
        let hint = payload
            .get("source_tool")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<SourceTool>().ok())
            .filter(|tool| self.order.contains(tool));

        if let Some(tool) = hint {
            if let Some(event) = tool.parse(payload) {
                return Some(event);
            }
        }

        self.order
            .iter()
            .filter(|tool| Some(**tool) != hint)
            .find_map(|tool| tool.parse(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn test_claude_payload() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({
                "sessionId": "s1",
                "transcriptPath": "/tmp/claude/transcript.jsonl",
            })))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Claude);
        assert_eq!(event.session_id, "s1");
        assert!(event
            .transcript_path()
            .unwrap()
            .ends_with("transcript.jsonl"));
    }

    #[test]
    fn test_cursor_preferred_over_claude_when_ambiguous() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({
                "conversation_id": "cursor-1",
                "sessionId": "claude-1",
                "transcriptPath": "/tmp/shared.jsonl",
            })))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Cursor);
        assert_eq!(event.session_id, "cursor-1");
    }

    #[test]
    fn test_cursor_without_transcript() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({"conversation_id": "c1"})))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Cursor);
        assert!(event.transcript_path().is_none());
        assert!(!event.is_metric());
    }

    #[test]
    fn test_gemini_preferred_over_claude() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({
                "session_id": "g2",
                "timestamp": "2025-01-01T00:00:00Z",
                "transcript_path": "/tmp/gemini.jsonl",
            })))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Gemini);
        assert_eq!(event.session_id, "g2");
    }

    #[test]
    fn test_empty_transcript_path_is_absent() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({
                "session_id": "g1",
                "timestamp": "2025-01-01T00:00:00Z",
                "transcript_path": "",
            })))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Gemini);
        assert!(event.transcript_path().is_none());
    }

    #[test]
    fn test_cline_and_codex_payloads() {
        let registry = AdapterRegistry::default();

        let cline = registry
            .parse(&payload(json!({"taskId": "t1", "clineVersion": "3.36"})))
            .unwrap();
        assert_eq!(cline.source_tool, SourceTool::Cline);
        assert_eq!(cline.session_id, "t1");

        let codex = registry
            .parse(&payload(
                json!({"thread-id": "th1", "type": "agent-turn-complete"}),
            ))
            .unwrap();
        assert_eq!(codex.source_tool, SourceTool::Codex);
        assert_eq!(codex.session_id, "th1");
        assert!(codex.transcript_path().is_none());
    }

    #[test]
    fn test_copilot_metric_payload() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({
                "hook_event_name": "PreToolUse",
                "tool_name": "bash",
                "cwd": "/tmp",
            })))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Copilot);
        match event.kind {
            EventKind::Metric(metric) => {
                assert_eq!(metric.name, "tool_started");
                assert_eq!(metric.value, 1.0);
                assert_eq!(metric.attributes.get("tool_name").unwrap(), "bash");
            }
            other => panic!("expected metric, got {:?}", other),
        }
    }

    #[test]
    fn test_source_tool_hint_wins_for_ambiguous_payload() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({
                "source_tool": "kiro",
                "hook_event_name": "preToolUse",
                "tool_name": "bash",
            })))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Kiro);
    }

    #[test]
    fn test_hint_that_does_not_match_falls_back_to_order() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({
                "source_tool": "codex",
                "session_id": "s9",
            })))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Claude);
    }

    #[test]
    fn test_claude_stop_hook_is_a_trace() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({
                "session_id": "s1",
                "transcript_path": "/tmp/claude.jsonl",
                "hook_event_name": "Stop",
            })))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Claude);
        assert!(!event.is_metric());
    }

    #[test]
    fn test_kiro_prompt_metric() {
        let event = AdapterRegistry::default()
            .parse(&payload(json!({
                "hook_event_name": "userPromptSubmit",
                "prompt": "hello",
                "cwd": "/tmp",
            })))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Kiro);
        assert!(event.is_metric());
        assert!(event.transcript_path().is_none());
    }

    #[test]
    fn test_opencode_trace_and_metric() {
        let registry = AdapterRegistry::default();

        let trace = registry
            .parse(&payload(json!({
                "source_tool": "opencode",
                "session_id": "o1",
                "transcript_path": "/tmp/opencode.jsonl",
            })))
            .unwrap();
        assert_eq!(trace.source_tool, SourceTool::OpenCode);
        assert!(trace.transcript_path().is_some());

        let metric = registry
            .parse(&payload(json!({
                "source_tool": "opencode",
                "kind": "metric",
                "session_id": "o1",
                "metric_name": "tool_completed",
                "metric_value": 3,
                "metric_attributes": {"tool_name": "read", "count": 2},
            })))
            .unwrap();
        match metric.kind {
            EventKind::Metric(m) => {
                assert_eq!(m.name, "tool_completed");
                assert_eq!(m.value, 3.0);
                assert_eq!(m.attributes.get("tool_name").unwrap(), "read");
                assert_eq!(m.attributes.get("count").unwrap(), "2");
            }
            other => panic!("expected metric, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_payload() {
        assert!(AdapterRegistry::default()
            .parse(&payload(json!({"foo": "bar"})))
            .is_none());
    }

    #[test]
    fn test_registry_order_is_respected() {
        let registry = AdapterRegistry::with_order(vec![SourceTool::Claude]);
        let event = registry
            .parse(&payload(json!({"conversation_id": "c1", "session_id": "s1"})))
            .unwrap();
        assert_eq!(event.source_tool, SourceTool::Claude);
    }

    #[test]
    fn test_source_tool_from_str() {
        assert_eq!("OpenCode".parse::<SourceTool>().unwrap(), SourceTool::OpenCode);
        assert!("vim".parse::<SourceTool>().is_err());
    }
}
