//! Per-tool payload predicates and field extraction.

use super::{EventKind, HookEvent, MetricEvent, Payload, SourceTool};
use crate::paths::{expand_home, resolve};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

const COPILOT_EVENTS: [(&str, &str); 4] = [
    ("userPromptSubmitted", "prompt_submitted"),
    ("preToolUse", "tool_started"),
    ("postToolUse", "tool_completed"),
    ("sessionEnd", "session_ended"),
];

const KIRO_EVENTS: [(&str, &str); 4] = [
    ("userPromptSubmit", "prompt_submitted"),
    ("preToolUse", "tool_started"),
    ("postToolUse", "tool_completed"),
    ("stop", "session_ended"),
];

pub(super) fn parse(tool: SourceTool, payload: &Payload) -> Option<HookEvent> {
    match tool {
        SourceTool::OpenCode => opencode(payload),
        SourceTool::Cursor => {
            let session_id = non_empty_str(payload, "conversation_id")?;
            Some(trace(tool, session_id, payload))
        }
        SourceTool::Gemini => {
            payload.get("timestamp")?;
            let session_id = non_empty_str(payload, "session_id")?;
            Some(trace(tool, session_id, payload))
        }
        SourceTool::Cline => {
            let session_id = non_empty_str(payload, "taskId")?;
            Some(trace(tool, session_id, payload))
        }
        SourceTool::Codex => {
            let session_id = non_empty_str(payload, "thread-id")?;
            Some(trace(tool, session_id, payload))
        }
        SourceTool::Copilot => {
            if has_session_key(payload) || has_transcript_key(payload) {
                return None;
            }
            metric_from_hook_event(tool, payload, &COPILOT_EVENTS)
        }
        // Claude also sends `hook_event_name: "Stop"`, always with a transcript
        SourceTool::Kiro => {
            if has_transcript_key(payload) {
                return None;
            }
            metric_from_hook_event(tool, payload, &KIRO_EVENTS)
        }
        SourceTool::Claude => {
            let session_id = non_empty_str(payload, "sessionId")
                .or_else(|| non_empty_str(payload, "session_id"))
                .or_else(|| {
                    payload
                        .get("session")
                        .and_then(Value::as_object)
                        .and_then(|s| non_empty_str(s, "id"))
                })?;
            Some(trace(tool, session_id, payload))
        }
    }
}

fn opencode(payload: &Payload) -> Option<HookEvent> {
    if payload.get("source_tool").and_then(Value::as_str) != Some("opencode") {
        return None;
    }

    if payload.get("kind").and_then(Value::as_str) == Some("metric") {
        let name = non_empty_str(payload, "metric_name")?;
        let value = payload
            .get("metric_value")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);
        let attributes = payload
            .get("metric_attributes")
            .and_then(Value::as_object)
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), attribute_string(v)))
                    .collect()
            })
            .unwrap_or_default();

        return Some(HookEvent {
            source_tool: SourceTool::OpenCode,
            session_id: non_empty_str(payload, "session_id").unwrap_or_default(),
            cwd: extract_cwd(payload),
            kind: EventKind::Metric(MetricEvent {
                name,
                value,
                attributes,
            }),
        });
    }

    let session_id = non_empty_str(payload, "session_id")?;
    Some(trace(SourceTool::OpenCode, session_id, payload))
}

/// Map a `hook_event_name` from `table` to a counter metric.
///
/// The first letter of the event name is matched case-insensitively, so both
/// `PreToolUse` and `preToolUse` are accepted.
fn metric_from_hook_event(
    tool: SourceTool,
    payload: &Payload,
    table: &[(&str, &str)],
) -> Option<HookEvent> {
    let event_name = payload.get("hook_event_name").and_then(Value::as_str)?;
    let metric_name = table
        .iter()
        .find(|(hook, _)| lower_first(hook) == lower_first(event_name))
        .map(|(_, metric)| *metric)?;

    let mut attributes = BTreeMap::new();
    attributes.insert("hook_event_name".to_string(), event_name.to_string());
    for key in ["tool_name", "cwd"] {
        if let Some(v) = non_empty_str(payload, key) {
            attributes.insert(key.to_string(), v);
        }
    }

    Some(HookEvent {
        source_tool: tool,
        session_id: non_empty_str(payload, "session_id").unwrap_or_default(),
        cwd: extract_cwd(payload),
        kind: EventKind::Metric(MetricEvent {
            name: metric_name.to_string(),
            value: 1.0,
            attributes,
        }),
    })
}

fn trace(tool: SourceTool, session_id: String, payload: &Payload) -> HookEvent {
    let cwd = extract_cwd(payload);
    let transcript_path = extract_transcript_path(payload, cwd.as_ref());
    HookEvent {
        source_tool: tool,
        session_id,
        cwd,
        kind: EventKind::Trace { transcript_path },
    }
}

fn extract_transcript_path(payload: &Payload, cwd: Option<&PathBuf>) -> Option<PathBuf> {
    let raw = non_empty_str(payload, "transcriptPath")
        .or_else(|| non_empty_str(payload, "transcript_path"))
        .or_else(|| {
            payload
                .get("transcript")
                .and_then(Value::as_object)
                .and_then(|t| non_empty_str(t, "path"))
        })?;
    Some(resolve(&expand_home(&raw), cwd.map(PathBuf::as_path)))
}

fn extract_cwd(payload: &Payload) -> Option<PathBuf> {
    non_empty_str(payload, "cwd").map(|raw| expand_home(&raw))
}

fn has_session_key(payload: &Payload) -> bool {
    ["sessionId", "session_id", "session", "conversation_id"]
        .iter()
        .any(|k| payload.contains_key(*k))
}

fn has_transcript_key(payload: &Payload) -> bool {
    ["transcriptPath", "transcript_path", "transcript"]
        .iter()
        .any(|k| payload.contains_key(*k))
}

fn non_empty_str(map: &Payload, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn attribute_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_relative_transcript_resolved_against_cwd() {
        let event = parse(
            SourceTool::Claude,
            &payload(json!({
                "session_id": "s1",
                "cwd": "/nonexistent-project",
                "transcript_path": "logs/t.jsonl",
            })),
        )
        .unwrap();
        assert_eq!(
            event.transcript_path().unwrap(),
            &PathBuf::from("/nonexistent-project/logs/t.jsonl")
        );
        assert_eq!(event.cwd, Some(PathBuf::from("/nonexistent-project")));
    }

    #[test]
    fn test_nested_session_and_transcript_objects() {
        let event = parse(
            SourceTool::Claude,
            &payload(json!({
                "session": {"id": "nested"},
                "transcript": {"path": "/tmp/nested.jsonl"},
            })),
        )
        .unwrap();
        assert_eq!(event.session_id, "nested");
        assert!(event.transcript_path().unwrap().ends_with("nested.jsonl"));
    }

    #[test]
    fn test_claude_rejects_empty_session_id() {
        assert!(parse(SourceTool::Claude, &payload(json!({"session_id": ""}))).is_none());
    }

    #[test]
    fn test_copilot_ignores_payload_with_session() {
        assert!(parse(
            SourceTool::Copilot,
            &payload(json!({"hook_event_name": "PreToolUse", "session_id": "s1"})),
        )
        .is_none());
    }

    #[test]
    fn test_kiro_unknown_event_is_ignored() {
        assert!(parse(
            SourceTool::Kiro,
            &payload(json!({"hook_event_name": "somethingElse"})),
        )
        .is_none());
    }

    #[test]
    fn test_kiro_ignores_payload_with_transcript() {
        assert!(parse(
            SourceTool::Kiro,
            &payload(json!({
                "hook_event_name": "Stop",
                "session_id": "s1",
                "transcript_path": "/tmp/t.jsonl",
            })),
        )
        .is_none());
    }

    #[test]
    fn test_opencode_metric_requires_name() {
        assert!(parse(
            SourceTool::OpenCode,
            &payload(json!({"source_tool": "opencode", "kind": "metric"})),
        )
        .is_none());
    }

    #[test]
    fn test_lower_first() {
        assert_eq!(lower_first("PreToolUse"), "preToolUse");
        assert_eq!(lower_first(""), "");
    }
}
