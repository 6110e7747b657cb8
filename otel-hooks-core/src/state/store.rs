//! JSON state file persistence
//!
//! The state file is a single JSON object mapping [`state_key`] hashes to
//! `{offset, buffer, turn_count, updated}` records. It is rewritten in full
//! through a temp file plus rename, so readers never see a torn write.
//!
//! [`state_key`]: super::state_key

use super::{SessionState, StateLock};
use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const STATE_FILE_NAME: &str = "otel_hook_state.json";
const LOCK_FILE_NAME: &str = "otel_hook_state.lock";

/// Locations of the state and lock files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub state_file: PathBuf,
    pub lock_file: PathBuf,
}

impl StatePaths {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            state_file: state_dir.join(STATE_FILE_NAME),
            lock_file: state_dir.join(LOCK_FILE_NAME),
            state_dir,
        }
    }
}

/// One persisted session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub buffer: String,
    #[serde(default)]
    pub turn_count: u64,
    /// Last time this entry was written
    #[serde(default = "Utc::now")]
    pub updated: DateTime<Utc>,
}

impl StateEntry {
    pub fn session(&self) -> SessionState {
        SessionState {
            offset: self.offset,
            buffer: self.buffer.clone(),
            turn_count: self.turn_count,
        }
    }
}

/// In-memory view of the whole state file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMap {
    entries: BTreeMap<String, StateEntry>,
}

impl StateMap {
    /// Session state for `key`, or a fresh zero state
    pub fn get(&self, key: &str) -> SessionState {
        self.entries
            .get(key)
            .map(StateEntry::session)
            .unwrap_or_default()
    }

    /// Store `state` under `key`, stamping it with the current time.
    pub fn put(&mut self, key: &str, state: &SessionState) {
        self.put_at(key, state, Utc::now());
    }

    pub fn put_at(&mut self, key: &str, state: &SessionState, updated: DateTime<Utc>) {
        self.entries.insert(
            key.to_string(),
            StateEntry {
                offset: state.offset,
                buffer: state.buffer.clone(),
                turn_count: state.turn_count,
                updated,
            },
        );
    }

    pub fn entry(&self, key: &str) -> Option<&StateEntry> {
        self.entries.get(key)
    }

    /// Remove entries last updated before `cutoff`. Returns how many were removed.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.updated >= cutoff);
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads and writes the state file under a state directory
#[derive(Debug, Clone)]
pub struct StateStore {
    paths: StatePaths,
    /// Entries older than this are dropped on save; `None` keeps everything
    retention: Option<ChronoDuration>,
    lock_timeout: Duration,
}

impl StateStore {
    pub fn new(paths: StatePaths) -> Self {
        Self {
            paths,
            retention: None,
            lock_timeout: Duration::from_secs(2),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(StatePaths::new(config.state_dir()))
            .with_retention_days(config.state.retention_days)
            .with_lock_timeout(Duration::from_millis(config.state.lock_timeout_ms))
    }

    /// Prune entries older than `days` on every save; 0 disables pruning.
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention = (days > 0).then(|| ChronoDuration::days(i64::from(days)));
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    /// Take the advisory lock guarding a load/save cycle.
    pub fn lock(&self) -> StateLock {
        StateLock::acquire(&self.paths.lock_file, self.lock_timeout)
    }

    /// Load the state map.
    ///
    /// A missing or unparsable file yields an empty map, and individual
    /// malformed entries are dropped; corrupt state is never fatal.
    pub fn load(&self) -> StateMap {
        let path = &self.paths.state_file;
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return StateMap::default(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Failed to read state file");
                return StateMap::default();
            }
        };

        let raw: serde_json::Map<String, Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Failed to parse state file");
                return StateMap::default();
            }
        };

        let entries = raw
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value(value) {
                Ok(entry) => Some((key, entry)),
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Dropping malformed state entry");
                    None
                }
            })
            .collect();

        StateMap { entries }
    }

    /// Prune expired entries, then atomically replace the state file with `map`.
    pub fn save(&self, map: &mut StateMap) -> Result<()> {
        if let Some(retention) = self.retention {
            let pruned = map.prune(Utc::now() - retention);
            if pruned > 0 {
                tracing::debug!(pruned, "Pruned expired session state entries");
            }
        }

        let json = serde_json::to_vec_pretty(map)?;
        atomic_write(&self.paths.state_file, &json).map_err(|e| {
            Error::State(format!(
                "failed to write {}: {}",
                self.paths.state_file.display(),
                e
            ))
        })
    }
}

/// Write `data` to a sibling temp file, then rename it over `path`.
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = (|| {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
