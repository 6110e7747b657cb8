//! Provider-agnostic turn payloads
//!
//! Converts a [`Turn`] into the shape every provider emits: prompt and
//! response text truncated to a character limit, plus tool calls paired with
//! their (truncated) results. Truncation metadata records the original length
//! and a SHA-256 of the full text so the original can be matched later.

use super::turn::Turn;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Metadata describing how a text value was truncated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruncationMeta {
    pub truncated: bool,
    /// Length of the original text in characters
    pub orig_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kept_len: Option<usize>,
    /// Hex SHA-256 of the full original text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// A possibly-truncated text value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruncatedText {
    pub text: String,
    pub meta: TruncationMeta,
}

/// Keep at most `max_chars` characters of `s`.
pub fn truncate_text(s: &str, max_chars: usize) -> TruncatedText {
    let orig_len = s.chars().count();
    if orig_len <= max_chars {
        return TruncatedText {
            text: s.to_string(),
            meta: TruncationMeta {
                truncated: false,
                orig_len,
                kept_len: None,
                sha256: None,
            },
        };
    }

    let head: String = s.chars().take(max_chars).collect();
    TruncatedText {
        text: head,
        meta: TruncationMeta {
            truncated: true,
            orig_len,
            kept_len: Some(max_chars),
            sha256: Some(hex::encode(Sha256::digest(s.as_bytes()))),
        },
    }
}

/// Tool input as emitted: structured JSON, or a truncated string
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Json(Value),
    Text(TruncatedText),
}

impl ToolInput {
    /// Render for span attributes
    pub fn to_display_string(&self) -> String {
        match self {
            ToolInput::Json(v) => v.to_string(),
            ToolInput::Text(t) => t.text.clone(),
        }
    }

    pub fn meta(&self) -> Option<&TruncationMeta> {
        match self {
            ToolInput::Json(_) => None,
            ToolInput::Text(t) => Some(&t.meta),
        }
    }
}

/// A tool invocation paired with its result, if one was recorded
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: ToolInput,
    pub output: Option<TruncatedText>,
}

/// Everything a provider needs to emit one turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnPayload {
    pub user_text: TruncatedText,
    pub assistant_text: TruncatedText,
    pub model: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Project a turn into its emission payload.
///
/// The response text is taken from the last assistant message and the model
/// from the first one.
pub fn build_turn_payload(turn: &Turn, max_chars: usize) -> TurnPayload {
    let user_text = truncate_text(&turn.user.content.text(), max_chars);
    let assistant_raw = turn
        .assistants
        .last()
        .map(|m| m.content.text())
        .unwrap_or_default();
    let assistant_text = truncate_text(&assistant_raw, max_chars);

    let tool_calls = turn
        .assistants
        .iter()
        .flat_map(|m| m.content.tool_uses())
        .map(|(id, name, input)| {
            let input = match input {
                Value::String(s) => ToolInput::Text(truncate_text(s, max_chars)),
                Value::Null => ToolInput::Json(Value::Object(Default::default())),
                other => ToolInput::Json(other.clone()),
            };
            let output = (!id.is_empty())
                .then(|| turn.tool_results.get(id))
                .flatten()
                .map(|raw| {
                    let rendered = match raw {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    truncate_text(&rendered, max_chars)
                });

            ToolCall {
                id: id.to_string(),
                name: (if name.is_empty() { "unknown" } else { name }).to_string(),
                input,
                output,
            }
        })
        .collect();

    TurnPayload {
        user_text,
        assistant_text,
        model: turn.model().to_string(),
        tool_calls,
    }
}
