//! Incremental transcript reader
//!
//! Given a persisted `(offset, buffer)` cursor, returns only the lines that
//! were completed since the previous read. The trailing fragment after the
//! last newline is carried in the buffer until its newline arrives, so each
//! line is handed out exactly once as long as callers resume from the last
//! committed cursor.

use crate::state::SessionState;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Read lines appended to `path` since `state`.
///
/// Returns the newly completed lines and the advanced cursor. A missing or
/// unreadable file yields no lines and the cursor unchanged. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn read_new_lines(path: &Path, state: &SessionState) -> (Vec<String>, SessionState) {
    match read_from_offset(path, state.offset) {
        Ok(Some((chunk, new_offset))) => {
            let mut combined = state.buffer.clone();
            combined.push_str(&String::from_utf8_lossy(&chunk));

            let mut lines: Vec<String> = combined.split('\n').map(str::to_string).collect();
            let buffer = lines.pop().unwrap_or_default();

            let next = SessionState {
                offset: new_offset,
                buffer,
                turn_count: state.turn_count,
            };
            (lines, next)
        }
        Ok(None) => (Vec::new(), state.clone()),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Failed to read transcript");
            (Vec::new(), state.clone())
        }
    }
}

/// Bytes from `offset` to EOF plus the EOF position, or `None` if nothing new.
fn read_from_offset(path: &Path, offset: u64) -> io::Result<Option<(Vec<u8>, u64)>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    file.seek(SeekFrom::Start(offset))?;
    let mut chunk = Vec::new();
    file.read_to_end(&mut chunk)?;

    if chunk.is_empty() {
        return Ok(None);
    }
    let new_offset = offset + chunk.len() as u64;
    Ok(Some((chunk, new_offset)))
}
