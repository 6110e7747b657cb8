//! Transcript processing
//!
//! - [`reader`]: incremental, offset-based reading of append-only JSONL files
//! - [`message`]: decoding JSONL lines into user/assistant messages
//! - [`turn`]: folding messages into conversational turns
//! - [`payload`]: projecting turns into truncated, provider-agnostic payloads

pub mod message;
pub mod payload;
pub mod reader;
pub mod turn;

pub use message::{decode_lines, Content, ContentBlock, Role, TranscriptMessage};
pub use payload::{
    build_turn_payload, truncate_text, ToolCall, ToolInput, TruncatedText, TruncationMeta,
    TurnPayload,
};
pub use reader::read_new_lines;
pub use turn::{build_turns, Turn};
