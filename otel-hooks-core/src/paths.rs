//! Path normalization shared by payload parsing, state and attribution.

use std::path::{Component, Path, PathBuf};

/// Returns a best-effort home directory path.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Expand a leading `~` or `~/` to the home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        return home_dir();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(raw),
    }
}

/// Resolve `path` to an absolute path.
///
/// Relative paths are joined onto `base` (or the process working directory
/// when `base` is `None`). Symlinks are resolved through the nearest existing
/// ancestor, so spellings of the same file agree even before it is written.
pub fn resolve(path: &Path, base: Option<&Path>) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let base = base
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));
        base.join(path)
    };

    canonicalize_existing_prefix(&joined)
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest.
///
/// Falls back to [`normalize_lexically`] when no ancestor can be resolved.
pub fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }

    let normalized = normalize_lexically(path);
    let mut missing = Vec::new();
    let mut cursor = normalized.as_path();
    loop {
        if let Ok(mut canonical) = std::fs::canonicalize(cursor) {
            for name in missing.iter().rev() {
                canonical.push(name);
            }
            return canonical;
        }
        match (cursor.parent(), cursor.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                cursor = parent;
            }
            _ => return normalized,
        }
    }
}

/// Remove `.` and resolve `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
