//! Transcript message model and JSONL decoding
//!
//! Each transcript line is a `{type, message: {id?, role, model?, content}}`
//! object. Some tools write the role/content at the top level instead of under
//! `message`; both shapes are accepted.

use serde::Deserialize;
use serde_json::Value;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One content block inside a message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
    // Images, thinking blocks and anything newer
    #[serde(other)]
    Unknown,
}

/// Message content: a bare string or a list of typed blocks
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl Content {
    /// Concatenate the text parts, newline separated, skipping empty ones.
    pub fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// `(id, name, input)` of every tool_use block, in order
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.blocks().iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }

    /// `(tool_use_id, content)` of every tool_result block, in order
    pub fn tool_results(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.blocks().iter().filter_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => Some((tool_use_id.as_str(), content)),
            _ => None,
        })
    }

    /// True when the content is a non-empty list made only of tool_result blocks
    pub fn is_only_tool_results(&self) -> bool {
        let blocks = self.blocks();
        !blocks.is_empty()
            && blocks
                .iter()
                .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }

    fn blocks(&self) -> &[ContentBlock] {
        match self {
            Content::Blocks(blocks) => blocks,
            Content::Text(_) => &[],
        }
    }
}

/// A decoded user or assistant transcript message
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptMessage {
    pub role: Role,
    /// Provider message id; streaming updates of one response share it
    pub id: Option<String>,
    pub model: Option<String>,
    pub content: Content,
}

impl TranscriptMessage {
    /// A user message that only carries tool results back to the model
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::User && self.content.is_only_tool_results()
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    message: Option<RawMessage>,
    role: Option<String>,
    content: Option<Content>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    id: Option<String>,
    role: Option<String>,
    model: Option<String>,
    content: Option<Content>,
}

impl RawRecord {
    fn into_message(self) -> Option<TranscriptMessage> {
        let role = self
            .record_type
            .as_deref()
            .and_then(Role::parse)
            .or_else(|| {
                self.message
                    .as_ref()
                    .and_then(|m| m.role.as_deref())
                    .and_then(Role::parse)
            })
            .or_else(|| self.role.as_deref().and_then(Role::parse))?;

        let (id, model, content) = match self.message {
            Some(m) => (
                m.id.filter(|id| !id.is_empty()),
                m.model.filter(|model| !model.is_empty()),
                m.content,
            ),
            None => (None, None, self.content),
        };

        Some(TranscriptMessage {
            role,
            id,
            model,
            content: content.unwrap_or_default(),
        })
    }
}

/// Decode one JSONL line. Blank, malformed and non-message lines yield `None`.
pub fn decode_line(line: &str) -> Option<TranscriptMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<RawRecord>(line) {
        Ok(record) => record.into_message(),
        Err(e) => {
            tracing::trace!(error = %e, "Skipping undecodable transcript line");
            None
        }
    }
}

/// Decode a batch of lines, silently dropping anything that is not a message.
pub fn decode_lines<S: AsRef<str>>(lines: &[S]) -> Vec<TranscriptMessage> {
    lines
        .iter()
        .filter_map(|line| decode_line(line.as_ref()))
        .collect()
}
