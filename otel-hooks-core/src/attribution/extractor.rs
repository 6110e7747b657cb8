//! File operations and repository detection for attribution.

use crate::hook::SourceTool;
use crate::paths::{expand_home, resolve};
use crate::transcript::Turn;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

/// Upper bound on any single git invocation
const GIT_TIMEOUT: Duration = Duration::from_secs(5);
const GIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tools that replace a file's full content
const WRITE_TOOLS: [&str; 2] = ["Write", "write"];
/// Tools that patch part of a file
const EDIT_TOOLS: [&str; 4] = ["Edit", "edit", "MultiEdit", "multi_edit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpKind {
    Write,
    Edit,
}

/// One AI file write or edit observed in a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOp {
    /// Absolute, normalized path
    pub path: PathBuf,
    pub kind: FileOpKind,
    /// `provider/model` form, or `"unknown"`
    pub model: String,
    /// Lines in the written content; only known for writes
    pub line_count: Option<u64>,
}

/// Prefix a raw model id with its models.dev provider, e.g. `anthropic/claude-x`.
pub fn normalize_model(model: &str, tool: SourceTool) -> String {
    if model.is_empty() || model == "unknown" {
        return model.to_string();
    }
    match tool.model_prefix() {
        Some(prefix) if !model.starts_with(&format!("{}/", prefix)) => {
            format!("{}/{}", prefix, model)
        }
        _ => model.to_string(),
    }
}

/// Scan the tool calls in `turns` for file writes and edits, in order.
///
/// Relative paths are resolved against `base` (the host tool's working
/// directory when known).
pub fn extract_file_ops(turns: &[Turn], tool: SourceTool, base: Option<&Path>) -> Vec<FileOp> {
    let mut ops = Vec::new();

    for turn in turns {
        let model = normalize_model(turn.model(), tool);

        for assistant in &turn.assistants {
            for (_, name, input) in assistant.content.tool_uses() {
                let Some(input) = input.as_object() else {
                    continue;
                };
                let Some(raw_path) = ["file_path", "path"].iter().find_map(|k| {
                    input
                        .get(*k)
                        .and_then(Value::as_str)
                        .filter(|p| !p.is_empty())
                }) else {
                    continue;
                };
                let path = resolve(&expand_home(raw_path), base);

                if WRITE_TOOLS.contains(&name) {
                    let content = input.get("content").and_then(Value::as_str).unwrap_or("");
                    ops.push(FileOp {
                        path,
                        kind: FileOpKind::Write,
                        model: model.clone(),
                        line_count: count_lines(content),
                    });
                } else if EDIT_TOOLS.contains(&name) {
                    ops.push(FileOp {
                        path,
                        kind: FileOpKind::Edit,
                        model: model.clone(),
                        line_count: None,
                    });
                }
            }
        }
    }

    ops
}

/// Number of lines in `content`; a trailing newline does not start a new line.
pub(crate) fn count_lines(content: &str) -> Option<u64> {
    match content.lines().count() {
        0 => None,
        n => Some(n as u64),
    }
}

/// Detect the git repository that owns `paths`.
///
/// Every touched file's directory plus `fallback` is checked; when several
/// repositories answer, the shallowest root wins.
pub fn detect_repo_root(paths: &[PathBuf], fallback: Option<&Path>) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = paths
        .iter()
        .filter(|p| p.is_absolute())
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .collect();
    dirs.extend(fallback.map(Path::to_path_buf));

    let roots: BTreeSet<PathBuf> = dirs.iter().filter_map(|d| git_toplevel(d)).collect();
    roots.into_iter().min_by_key(|root| root.components().count())
}

/// Current HEAD commit of the repository at `repo_root`
pub fn git_revision(repo_root: &Path) -> Option<String> {
    git_stdout(repo_root, &["rev-parse", "HEAD"])
}

fn git_toplevel(dir: &Path) -> Option<PathBuf> {
    // Files may not exist yet; walk up to the nearest existing directory
    let existing = dir.ancestors().find(|d| d.is_dir())?;
    git_stdout(existing, &["rev-parse", "--show-toplevel"]).map(PathBuf::from)
}

fn git_stdout(dir: &Path, args: &[&str]) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(dir).args(args);
    let output = match run_with_timeout(cmd, GIT_TIMEOUT) {
        Ok(Some(output)) => output,
        Ok(None) => {
            tracing::debug!(dir = %dir.display(), ?args, "git timed out");
            return None;
        }
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Failed to run git");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

/// Run `cmd` to completion, or kill it after `timeout` and return `None`.
///
/// Stdout is captured; stdin and stderr are discarded.
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::io::Result<Option<Output>> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    // Drained concurrently; a full pipe would stall the child
    let reader = child.stdout.take().map(|mut out| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            buf
        })
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(GIT_POLL_INTERVAL);
    };

    let stdout = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    Ok(Some(Output {
        status,
        stdout,
        stderr: Vec::new(),
    }))
}
