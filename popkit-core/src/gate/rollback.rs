//! Deterministic rollback sequence for a failed quality gate run.
//!
//! Order matters: the diff is captured to a patch file *before* anything is
//! discarded. If capture fails the engine reports `RollbackUnsafe` and does
//! not touch the working tree — better to leave a dirty tree than silently
//! discard changes nobody could recover.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_RETENTION_DAYS: u64 = 7;
const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("rollback unsafe: could not capture diff before discarding changes: {0}")]
    RollbackUnsafe(String),
    #[error("git operation failed: {0}")]
    Git(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RollbackError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub timestamp: String,
    pub patch_path: PathBuf,
    pub reason: String,
}

fn run_git_once(working_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(working_dir)
        .output()
        .map_err(|e| RollbackError::Git(e.to_string()))?;
    if !output.status.success() {
        return Err(RollbackError::Git(String::from_utf8_lossy(&output.stderr).trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Transient git failures (lock contention from a concurrent git process)
/// are retried with exponential backoff before surfacing to the caller.
fn run_git(working_dir: &Path, args: &[&str]) -> Result<String> {
    let mut last_error = None;
    for attempt in 0..=MAX_RETRIES {
        match run_git_once(working_dir, args) {
            Ok(out) => return Ok(out),
            Err(e) => {
                let retryable = e.to_string().contains("lock") || e.to_string().contains("another git process");
                if retryable && attempt < MAX_RETRIES {
                    std::thread::sleep(std::time::Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << attempt)));
                    last_error = Some(e);
                } else {
                    return Err(e);
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| RollbackError::Git("retry budget exhausted".to_string())))
}

/// Run the five-step rollback sequence. `checkpoints_dir` holds both the
/// captured patch and the append-only manifest.
pub fn rollback(working_dir: &Path, checkpoints_dir: &Path, reason: &str) -> Result<ManifestEntry> {
    fs::create_dir_all(checkpoints_dir)?;

    let diff = run_git(working_dir, &["diff", "HEAD"]).map_err(|e| RollbackError::RollbackUnsafe(e.to_string()))?;
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
    let patch_path = checkpoints_dir.join(format!("{timestamp}.patch"));
    fs::write(&patch_path, diff).map_err(|e| RollbackError::RollbackUnsafe(e.to_string()))?;

    run_git(working_dir, &["checkout", "."])?;
    run_git(working_dir, &["clean", "-fd"])?;

    let entry = ManifestEntry { timestamp, patch_path, reason: reason.to_string() };
    append_manifest(checkpoints_dir, &entry)?;

    Ok(entry)
}

fn append_manifest(checkpoints_dir: &Path, entry: &ManifestEntry) -> Result<()> {
    use std::io::Write as _;
    let manifest_path = checkpoints_dir.join("manifest.jsonl");
    let mut file = fs::OpenOptions::new().create(true).append(true).open(manifest_path)?;
    writeln!(file, "{}", serde_json::to_string(entry).map_err(|e| RollbackError::Git(e.to_string()))?)?;
    Ok(())
}

/// Delete patches older than `retention_days` (default 7), called at startup.
pub fn prune_old_patches(checkpoints_dir: &Path, retention_days: Option<u64>) -> Result<usize> {
    let retention = std::time::Duration::from_secs(retention_days.unwrap_or(DEFAULT_RETENTION_DAYS) * 86_400);
    let mut pruned = 0;
    let Ok(entries) = fs::read_dir(checkpoints_dir) else { return Ok(0) };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("patch") {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                if modified.elapsed().unwrap_or_default() > retention {
                    fs::remove_file(&path)?;
                    pruned += 1;
                }
            }
        }
    }
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test"],
        ] {
            StdCommand::new("git").args(&args).current_dir(dir.path()).output().unwrap();
        }
        std::fs::write(dir.path().join("a.txt"), "original").unwrap();
        StdCommand::new("git").args(["add", "."]).current_dir(dir.path()).output().unwrap();
        StdCommand::new("git").args(["commit", "-m", "initial"]).current_dir(dir.path()).output().unwrap();
        dir
    }

    #[test]
    fn rollback_captures_patch_then_restores_clean_tree() {
        let dir = init_repo();
        std::fs::write(dir.path().join("a.txt"), "broken edit").unwrap();
        std::fs::write(dir.path().join("untracked.txt"), "junk").unwrap();

        let checkpoints = dir.path().join(".claude/checkpoints");
        let entry = rollback(dir.path(), &checkpoints, "gate failure").unwrap();

        assert!(entry.patch_path.exists());
        let patch = std::fs::read_to_string(&entry.patch_path).unwrap();
        assert!(patch.contains("broken edit"));

        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "original");
        assert!(!dir.path().join("untracked.txt").exists());
    }

    #[test]
    fn rollback_appends_manifest_entry() {
        let dir = init_repo();
        std::fs::write(dir.path().join("a.txt"), "changed").unwrap();
        let checkpoints = dir.path().join(".claude/checkpoints");
        rollback(dir.path(), &checkpoints, "gate failure").unwrap();
        let manifest = std::fs::read_to_string(checkpoints.join("manifest.jsonl")).unwrap();
        assert_eq!(manifest.lines().count(), 1);
    }
}
