//! Checkpoint Manager — rolling snapshots of git + context state.
//!
//! `restore` never touches the filesystem itself: it returns a plan the host
//! confirms before any files move. Actual rollback file-writes belong to the
//! quality-gate engine (§4.H), not here.

mod manager;

pub use manager::{CheckpointError, CheckpointManager, Result};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    Manual,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointTrigger {
    Manual,
    PhaseComplete,
    CommitPushed,
    TestPassed,
    PrCreated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSnapshot {
    pub branch: String,
    pub commit: String,
    pub uncommitted_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub checkpoint_type: CheckpointType,
    pub trigger: CheckpointTrigger,
    pub note: Option<String>,
    pub created_at: String,
    pub git: GitSnapshot,
    pub context_snapshot: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreAction {
    ContextOnly,
    ContextAndResetToCommit,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitComparison {
    pub current_commit: String,
    pub checkpoint_commit: String,
    pub commits_since_checkpoint: usize,
    pub has_uncommitted_changes: bool,
}

/// A proposed restoration, to be confirmed by the host before any file moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorePlan {
    pub checkpoint_id: String,
    pub context_to_load: Value,
    pub git_comparison: GitComparison,
    pub available_actions: Vec<RestoreAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub id: String,
    pub label: String,
    pub description: String,
}
