use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::{
    Checkpoint, CheckpointTrigger, CheckpointType, GitComparison, GitSnapshot, RestoreAction,
    RestorePlan, SelectionEntry,
};

const DEFAULT_MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    NotFound(String),
    #[error("git operation failed: {0}")]
    Git(String),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Runs git commands with exponential backoff retry on transient failures
/// (lock contention from a concurrent git process).
struct GitHelper {
    working_dir: PathBuf,
}

impl GitHelper {
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|e| CheckpointError::Git(e.to_string()))?;
        if !output.status.success() {
            return Err(CheckpointError::Git(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_with_retry(&self, args: &[&str]) -> Result<String> {
        let mut last_error = None;
        for attempt in 0..=DEFAULT_MAX_RETRIES {
            match self.run(args) {
                Ok(out) => return Ok(out),
                Err(e) => {
                    let retryable = e.to_string().contains("lock") || e.to_string().contains("another git process");
                    if retryable && attempt < DEFAULT_MAX_RETRIES {
                        let delay = RETRY_BASE_DELAY_MS * (1 << attempt);
                        std::thread::sleep(std::time::Duration::from_millis(delay));
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CheckpointError::Git("retry budget exhausted".to_string())))
    }

    fn current_branch(&self) -> Result<String> {
        self.run_with_retry(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn current_commit(&self) -> Result<String> {
        self.run_with_retry(&["rev-parse", "--short", "HEAD"])
    }

    fn uncommitted_count(&self) -> Result<usize> {
        let status = self.run_with_retry(&["status", "--porcelain"])?;
        Ok(if status.is_empty() { 0 } else { status.lines().count() })
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(self.uncommitted_count()? > 0)
    }

    fn commits_since(&self, commit: &str) -> Result<usize> {
        let out = self.run_with_retry(&["rev-list", "--count", &format!("{commit}..HEAD")])?;
        out.parse().map_err(|_| CheckpointError::Git(format!("could not parse commit count: {out}")))
    }

    fn snapshot(&self) -> Result<GitSnapshot> {
        Ok(GitSnapshot {
            branch: self.current_branch()?,
            commit: self.current_commit()?,
            uncommitted_count: self.uncommitted_count()?,
        })
    }
}

/// Rolling checkpoint history, capped at `max_checkpoints`, newest last.
pub struct CheckpointManager {
    git: GitHelper,
    checkpoints: Vec<Checkpoint>,
    max_checkpoints: usize,
}

impl CheckpointManager {
    pub fn new(working_dir: impl AsRef<Path>, max_checkpoints: usize) -> Self {
        Self {
            git: GitHelper { working_dir: working_dir.as_ref().to_path_buf() },
            checkpoints: Vec::new(),
            max_checkpoints,
        }
    }

    /// Snapshot git state plus context and append to the rolling list,
    /// pruning the oldest entry if that pushes past `max_checkpoints`.
    pub fn create(
        &mut self,
        name: impl Into<String>,
        checkpoint_type: CheckpointType,
        trigger: CheckpointTrigger,
        note: Option<String>,
        context_snapshot: Value,
    ) -> Result<Checkpoint> {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            checkpoint_type,
            trigger,
            note,
            created_at: Utc::now().to_rfc3339(),
            git: self.git.snapshot()?,
            context_snapshot,
        };
        self.checkpoints.push(checkpoint.clone());
        if self.checkpoints.len() > self.max_checkpoints {
            self.checkpoints.remove(0);
        }
        Ok(checkpoint)
    }

    pub fn create_auto(&mut self, trigger: CheckpointTrigger, context_snapshot: Value) -> Result<Checkpoint> {
        let name = match &trigger {
            CheckpointTrigger::PhaseComplete => "auto:phase".to_string(),
            CheckpointTrigger::CommitPushed => {
                let hash7 = self.git.current_commit()?;
                format!("commit-{hash7}")
            }
            CheckpointTrigger::TestPassed => "auto:test".to_string(),
            CheckpointTrigger::PrCreated => "auto:pr".to_string(),
            CheckpointTrigger::Manual => "manual".to_string(),
        };
        self.create(name, CheckpointType::Auto, trigger, None, context_snapshot)
    }

    /// Build a restore plan for `id` without touching any files. `NotFound`
    /// if the id isn't in the rolling list.
    pub fn restore(&self, id: &str) -> Result<RestorePlan> {
        let checkpoint = self
            .checkpoints
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| CheckpointError::NotFound(id.to_string()))?;

        let current_commit = self.git.current_commit()?;
        let commits_since_checkpoint = self.git.commits_since(&checkpoint.git.commit).unwrap_or(0);
        let has_uncommitted_changes = self.git.has_uncommitted_changes().unwrap_or(false);

        Ok(RestorePlan {
            checkpoint_id: checkpoint.id.clone(),
            context_to_load: checkpoint.context_snapshot.clone(),
            git_comparison: GitComparison {
                current_commit,
                checkpoint_commit: checkpoint.git.commit.clone(),
                commits_since_checkpoint,
                has_uncommitted_changes,
            },
            available_actions: vec![
                RestoreAction::ContextOnly,
                RestoreAction::ContextAndResetToCommit,
                RestoreAction::Cancel,
            ],
        })
    }

    /// Reverse-chronological `{label, description}` pairs for interactive selection.
    pub fn list_for_selection(&self) -> Vec<SelectionEntry> {
        self.checkpoints
            .iter()
            .rev()
            .map(|c| SelectionEntry {
                id: c.id.clone(),
                label: c.name.clone(),
                description: format!("{} @ {} ({})", c.created_at, c.git.commit, c.git.branch),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::tempdir;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test"],
        ] {
            StdCommand::new("git").args(&args).current_dir(dir.path()).output().unwrap();
        }
        std::fs::write(dir.path().join("README.md"), "# test").unwrap();
        StdCommand::new("git").args(["add", "."]).current_dir(dir.path()).output().unwrap();
        StdCommand::new("git").args(["commit", "-m", "initial"]).current_dir(dir.path()).output().unwrap();
        dir
    }

    #[test]
    fn create_snapshots_git_and_context() {
        let dir = init_repo();
        let mut manager = CheckpointManager::new(dir.path(), 20);
        let checkpoint = manager
            .create("first", CheckpointType::Manual, CheckpointTrigger::Manual, None, serde_json::json!({"phase": "impl"}))
            .unwrap();
        assert_eq!(checkpoint.context_snapshot["phase"], "impl");
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn rolling_window_prunes_oldest_past_max() {
        let dir = init_repo();
        let mut manager = CheckpointManager::new(dir.path(), 2);
        manager.create("a", CheckpointType::Manual, CheckpointTrigger::Manual, None, Value::Null).unwrap();
        manager.create("b", CheckpointType::Manual, CheckpointTrigger::Manual, None, Value::Null).unwrap();
        manager.create("c", CheckpointType::Manual, CheckpointTrigger::Manual, None, Value::Null).unwrap();
        assert_eq!(manager.len(), 2);
        let names: Vec<_> = manager.list_for_selection().into_iter().map(|e| e.label).collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[test]
    fn restore_missing_checkpoint_is_not_found() {
        let dir = init_repo();
        let manager = CheckpointManager::new(dir.path(), 20);
        let err = manager.restore("does-not-exist").unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
    }

    #[test]
    fn restore_does_not_touch_filesystem() {
        let dir = init_repo();
        let mut manager = CheckpointManager::new(dir.path(), 20);
        let checkpoint = manager
            .create("before-change", CheckpointType::Manual, CheckpointTrigger::Manual, None, Value::Null)
            .unwrap();
        std::fs::write(dir.path().join("scratch.txt"), "untouched").unwrap();
        let plan = manager.restore(&checkpoint.id).unwrap();
        assert!(dir.path().join("scratch.txt").exists());
        assert_eq!(plan.available_actions.len(), 3);
    }

    #[test]
    fn auto_commit_checkpoint_is_named_with_short_hash() {
        let dir = init_repo();
        let mut manager = CheckpointManager::new(dir.path(), 20);
        let checkpoint = manager.create_auto(CheckpointTrigger::CommitPushed, Value::Null).unwrap();
        assert!(checkpoint.name.starts_with("commit-"));
    }
}
