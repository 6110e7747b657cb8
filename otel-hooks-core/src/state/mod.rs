//! Durable per-session cursor state
//!
//! Each (session, transcript) pair owns one [`SessionState`] record inside a
//! single JSON state file. The [`StateStore`] reads and atomically rewrites
//! that file; a [`StateLock`] serializes the read-modify-write cycle across
//! concurrent hook processes on a best-effort basis.

mod lock;
mod store;

pub use lock::StateLock;
pub use store::{StateEntry, StateMap, StatePaths, StateStore};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Read cursor for one transcript within one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Byte offset just past the last byte read
    pub offset: u64,
    /// Trailing partial line not yet terminated by a newline
    pub buffer: String,
    /// Number of turns emitted so far
    pub turn_count: u64,
}

/// Stable state-map key for a (session, transcript) pair.
///
/// Hex SHA-256 of `"<session_id>::<transcript_path>"`.
pub fn state_key(session_id: &str, transcript_path: &Path) -> String {
    let raw = format!("{}::{}", session_id, transcript_path.display());
    hex::encode(Sha256::digest(raw.as_bytes()))
}
