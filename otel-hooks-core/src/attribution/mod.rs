//! File attribution
//!
//! After a batch of turns is committed, the file writes and edits the
//! assistant performed are summarized into an [`AttributionRecord`]: one
//! [`FileRecord`] per touched file inside the repository, credited to the
//! model that touched it last.

mod extractor;
mod record;

pub use extractor::{
    detect_repo_root, extract_file_ops, git_revision, normalize_model, FileOp, FileOpKind,
};
pub use record::{
    AttributionRecord, Contributor, Conversation, FileRecord, Range, ToolInfo, VcsInfo,
    RECORD_VERSION,
};

use crate::hook::SourceTool;
use crate::paths::canonicalize_existing_prefix;
use crate::transcript::Turn;
use std::path::{Path, PathBuf};

/// Group `ops` by file into records relative to `repo_root`.
///
/// The line count comes from the most recent write of a file; edit-only
/// files fall back to the current line count on disk. Files outside
/// `repo_root`, or whose line count cannot be determined, are skipped.
/// Both sides are compared with symlinks resolved.
pub fn build_file_records(ops: &[FileOp], repo_root: &Path) -> Vec<FileRecord> {
    let repo_root = canonicalize_existing_prefix(repo_root);
    let mut grouped: Vec<(PathBuf, Vec<&FileOp>)> = Vec::new();
    for op in ops {
        let path = canonicalize_existing_prefix(&op.path);
        match grouped.iter_mut().find(|(seen, _)| *seen == path) {
            Some((_, group)) => group.push(op),
            None => grouped.push((path, vec![op])),
        }
    }

    grouped
        .into_iter()
        .filter_map(|(path, group)| {
            let Ok(relative) = path.strip_prefix(&repo_root) else {
                tracing::debug!(
                    path = %path.display(),
                    repo_root = %repo_root.display(),
                    "File outside repository root; skipping attribution"
                );
                return None;
            };

            let line_count = resolve_line_count(&path, &group)?;
            let model = group
                .last()
                .map(|op| op.model.as_str())
                .filter(|m| !m.is_empty() && *m != "unknown")
                .map(str::to_string);

            Some(FileRecord {
                path: to_posix(relative),
                conversations: vec![Conversation {
                    contributor: Contributor::ai(model),
                    ranges: vec![Range {
                        start_line: 1,
                        end_line: line_count,
                    }],
                    url: None,
                }],
            })
        })
        .collect()
}

/// Build the attribution record for `turns`, or `None` if no file in a
/// repository was touched.
///
/// `cwd` is the host tool's working directory; it anchors relative paths and
/// is the fallback for repository detection, after the process directory.
pub fn attribute_turns(
    turns: &[Turn],
    tool: SourceTool,
    cwd: Option<&Path>,
) -> Option<AttributionRecord> {
    let ops = extract_file_ops(turns, tool, cwd);
    if ops.is_empty() {
        return None;
    }

    let fallback: Option<PathBuf> = cwd
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok());
    let paths: Vec<PathBuf> = ops.iter().map(|op| op.path.clone()).collect();
    let repo_root = detect_repo_root(&paths, fallback.as_deref())?;

    let files = build_file_records(&ops, &repo_root);
    if files.is_empty() {
        return None;
    }

    let vcs = git_revision(&repo_root).map(VcsInfo::git);
    Some(AttributionRecord::new(files, vcs))
}

fn resolve_line_count(path: &Path, ops: &[&FileOp]) -> Option<u64> {
    if let Some(count) = ops
        .iter()
        .rev()
        .find(|op| op.kind == FileOpKind::Write && op.line_count.is_some())
        .and_then(|op| op.line_count)
    {
        return Some(count);
    }

    match std::fs::read(path) {
        Ok(bytes) => extractor::count_lines(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot read file for line count");
            None
        }
    }
}

fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn op(path: &Path, kind: FileOpKind, model: &str, lines: Option<u64>) -> FileOp {
        FileOp {
            path: path.to_path_buf(),
            kind,
            model: model.to_string(),
            line_count: lines,
        }
    }

    #[test]
    fn test_last_write_wins() {
        let root = Path::new("/repo");
        let file = root.join("src/main.rs");
        let records = build_file_records(
            &[
                op(&file, FileOpKind::Write, "anthropic/a", Some(10)),
                op(&file, FileOpKind::Edit, "anthropic/b", None),
                op(&file, FileOpKind::Write, "anthropic/c", Some(4)),
            ],
            root,
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "src/main.rs");
        let conv = records[0].primary().unwrap();
        assert_eq!(conv.ranges, vec![Range { start_line: 1, end_line: 4 }]);
        assert_eq!(conv.contributor.model.as_deref(), Some("anthropic/c"));
    }

    #[test]
    fn test_edit_only_reads_file_from_disk() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.md");
        std::fs::write(&file, "one\ntwo\nthree\nfour\n").unwrap();

        let records =
            build_file_records(&[op(&file, FileOpKind::Edit, "unknown", None)], dir.path());
        assert_eq!(records.len(), 1);
        let conv = records[0].primary().unwrap();
        assert_eq!(conv.ranges[0].end_line, 4);
        assert_eq!(conv.contributor.model, None);
    }

    #[test]
    fn test_edit_of_missing_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let records = build_file_records(
            &[op(&dir.path().join("gone.rs"), FileOpKind::Edit, "m", None)],
            dir.path(),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_outside_root_is_dropped() {
        let records = build_file_records(
            &[
                op(Path::new("/elsewhere/x.rs"), FileOpKind::Write, "m", Some(1)),
                op(Path::new("/repo/y.rs"), FileOpKind::Write, "m", Some(2)),
            ],
            Path::new("/repo"),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "y.rs");
    }

    #[test]
    fn test_first_seen_file_order() {
        let root = Path::new("/repo");
        let records = build_file_records(
            &[
                op(&root.join("b.rs"), FileOpKind::Write, "m", Some(1)),
                op(&root.join("a.rs"), FileOpKind::Write, "m", Some(1)),
                op(&root.join("b.rs"), FileOpKind::Write, "m", Some(2)),
            ],
            root,
        );
        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["b.rs", "a.rs"]);
    }
    #[cfg(unix)]
    #[test]
    fn test_symlinked_repo_path_is_attributed() {
        use crate::transcript::{build_turns, decode_lines};
        use std::process::Command;

        let git_ok = Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !git_ok {
            return;
        }

        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let initialized = Command::new("git")
            .arg("-C")
            .arg(&real)
            .args(["init", "-q"])
            .status()
            .unwrap()
            .success();
        assert!(initialized, "git init failed");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let target = link.join("src").join("lib.rs");
        let assistant = serde_json::json!({
            "type": "assistant",
            "message": {
                "id": "a1",
                "role": "assistant",
                "model": "claude-x",
                "content": [{
                    "type": "tool_use",
                    "id": "t1",
                    "name": "Write",
                    "input": {"file_path": target.to_string_lossy(), "content": "fn a() {}\n"},
                }],
            },
        });
        let turns = build_turns(decode_lines(&[
            r#"{"type":"user","message":{"role":"user","content":"write lib"}}"#.to_string(),
            assistant.to_string(),
        ]));

        let record = attribute_turns(&turns, SourceTool::Claude, Some(&link))
            .expect("file written through a symlinked checkout is attributed");
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].path, "src/lib.rs");
    }
}
