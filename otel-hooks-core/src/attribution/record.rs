//! Versioned attribution record schema
//!
//! Serializes to the agent-trace v0.1.0 JSON layout: optional fields are
//! omitted rather than written as `null`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Schema version written into every record
pub const RECORD_VERSION: &str = "0.1.0";

/// Inclusive 1-based line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub start_line: u64,
    pub end_line: u64,
}

impl Range {
    pub fn line_count(&self) -> u64 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Who produced a range of lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contributor {
    /// "ai", "human", "mixed" or "unknown"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Contributor {
    pub fn ai(model: Option<String>) -> Self {
        Self {
            kind: "ai".to_string(),
            model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub contributor: Contributor,
    pub ranges: Vec<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Attribution for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Repository-relative path with forward slashes
    pub path: String,
    pub conversations: Vec<Conversation>,
}

impl FileRecord {
    /// First conversation, which is the only one this crate produces
    pub fn primary(&self) -> Option<&Conversation> {
        self.conversations.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VcsInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub revision: String,
}

impl VcsInfo {
    pub fn git(revision: impl Into<String>) -> Self {
        Self {
            kind: "git".to_string(),
            revision: revision.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Default for ToolInfo {
    fn default() -> Self {
        Self {
            name: "otel-hooks".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}

/// One attribution snapshot for a batch of turns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributionRecord {
    pub version: String,
    pub id: String,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub files: Vec<FileRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolInfo>,
}

impl AttributionRecord {
    pub fn new(files: Vec<FileRecord>, vcs: Option<VcsInfo>) -> Self {
        Self::at(Utc::now(), files, vcs)
    }

    pub fn at(timestamp: DateTime<Utc>, files: Vec<FileRecord>, vcs: Option<VcsInfo>) -> Self {
        Self {
            version: RECORD_VERSION.to_string(),
            id: Uuid::new_v4().to_string(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            files,
            vcs,
            tool: Some(ToolInfo::default()),
        }
    }
}
