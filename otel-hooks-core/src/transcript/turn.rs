//! Turn assembly
//!
//! Folds the message stream into [`Turn`]s: one user prompt plus the
//! assistant messages and tool results that followed it before the next
//! prompt. Streaming transcripts write several versions of the same assistant
//! message; the latest version per message id wins while the position of its
//! first appearance is kept.

use super::message::{Role, TranscriptMessage};
use serde_json::Value;
use std::collections::HashMap;

/// One user prompt and everything the assistant did in response
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub user: TranscriptMessage,
    /// Deduplicated by message id, in first-seen order. Never empty.
    pub assistants: Vec<TranscriptMessage>,
    /// Raw tool_result content keyed by tool_use id
    pub tool_results: HashMap<String, Value>,
}

impl Turn {
    /// Model of the first assistant message, or `"unknown"`
    pub fn model(&self) -> &str {
        self.assistants
            .first()
            .and_then(|m| m.model.as_deref())
            .unwrap_or("unknown")
    }
}

#[derive(Default)]
struct TurnAssembler {
    turns: Vec<Turn>,
    current_user: Option<TranscriptMessage>,
    assistant_order: Vec<String>,
    assistant_latest: HashMap<String, TranscriptMessage>,
    tool_results: HashMap<String, Value>,
}

impl TurnAssembler {
    fn push(&mut self, msg: TranscriptMessage) {
        if msg.is_tool_result() {
            for (id, content) in msg.content.tool_results() {
                if !id.is_empty() {
                    self.tool_results.insert(id.to_string(), content.clone());
                }
            }
            return;
        }

        match msg.role {
            Role::User => {
                self.flush();
                self.current_user = Some(msg);
            }
            Role::Assistant => {
                if self.current_user.is_none() {
                    tracing::trace!("Dropping assistant message without a preceding prompt");
                    return;
                }
                let id = msg
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("noid:{}", self.assistant_order.len()));
                if !self.assistant_latest.contains_key(&id) {
                    self.assistant_order.push(id.clone());
                }
                self.assistant_latest.insert(id, msg);
            }
        }
    }

    /// Close the in-progress turn; it is kept only if it has a response.
    fn flush(&mut self) {
        let user = self.current_user.take();
        let order = std::mem::take(&mut self.assistant_order);
        let mut latest = std::mem::take(&mut self.assistant_latest);
        let tool_results = std::mem::take(&mut self.tool_results);

        let Some(user) = user else {
            return;
        };
        if latest.is_empty() {
            return;
        }

        let assistants = order.iter().filter_map(|id| latest.remove(id)).collect();
        self.turns.push(Turn {
            user,
            assistants,
            tool_results,
        });
    }

    fn finish(mut self) -> Vec<Turn> {
        self.flush();
        self.turns
    }
}

/// Assemble messages into turns, in chronological order.
pub fn build_turns<I>(messages: I) -> Vec<Turn>
where
    I: IntoIterator<Item = TranscriptMessage>,
{
    let mut assembler = TurnAssembler::default();
    for msg in messages {
        assembler.push(msg);
    }
    assembler.finish()
}
