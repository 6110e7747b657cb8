//! Best-effort advisory lock around the state file's read-modify-write cycle.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF: Duration = Duration::from_millis(25);
const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Exclusive lock on the state lock file, released on drop.
///
/// Acquisition never fails: if the lock file cannot be opened or the lock
/// is still contended when the timeout expires, the guard is returned
/// without holding anything and the caller proceeds unlocked.
#[derive(Debug)]
pub struct StateLock {
    file: Option<File>,
}

impl StateLock {
    /// Try to lock `path`, retrying with exponential backoff until `timeout`.
    pub fn acquire(path: &Path, timeout: Duration) -> Self {
        let file = match open_lock_file(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "State lock unavailable");
                return Self { file: None };
            }
        };

        let deadline = Instant::now() + timeout;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Self { file: Some(file) },
                Err(e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::debug!(
                            path = %path.display(),
                            error = %e,
                            timeout_ms = timeout.as_millis() as u64,
                            "Timed out waiting for state lock; continuing without it"
                        );
                        return Self { file: None };
                    }
                    std::thread::sleep(backoff.min(deadline - now));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// Whether the exclusive lock is actually held
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = FileExt::unlock(file);
        }
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}
