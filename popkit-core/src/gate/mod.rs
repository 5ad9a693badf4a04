//! Quality-Gate Engine — detects, triggers, and runs project quality gates,
//! then drives a deterministic failure-handling state machine.

pub mod detect;
pub mod diagnostics;
pub mod rollback;
pub mod state;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use detect::{GateDefinition, GateOverrides};
pub use diagnostics::Diagnostic;
pub use state::{FailureAction, GateState, GateStateMachine};

const DEFAULT_BATCH_THRESHOLD: usize = 5;
const DISTINCT_FILE_THRESHOLD: usize = 3;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("gate transition error: {0}")]
    Transition(#[from] state::TransitionError),
    #[error("rollback error: {0}")]
    Rollback(#[from] rollback::RollbackError),
}

pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateOutcome {
    pub name: String,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u128,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateRun {
    pub outcomes: Vec<GateOutcome>,
    pub all_passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolEventKind {
    Write,
    Edit,
    MultiEdit,
    Delete,
}

fn is_high_risk_path(path: &str) -> bool {
    static CONFIG_LIKE: &[&str] = &["tsconfig.json", "package.json", "Cargo.toml"];
    if CONFIG_LIKE.iter().any(|marker| path.ends_with(marker)) {
        return true;
    }
    let file_name = Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or("");
    file_name.contains(".config.") || file_name.starts_with(".env")
}

fn contains_import_export(edit_text: &str) -> bool {
    static PATTERN: std::sync::LazyLock<Regex> =
        std::sync::LazyLock::new(|| Regex::new(r"\b(import|export|require\()").unwrap());
    PATTERN.is_match(edit_text)
}

/// Auto-detects gates, tracks the rolling edit window, and runs the
/// configured gates sequentially with fail-fast semantics. Serialisable so
/// the hook binary can round-trip one instance per session across the
/// process-per-invocation hook protocol.
#[derive(Serialize, Deserialize)]
pub struct QualityGateEngine {
    working_dir: PathBuf,
    gates: Vec<GateDefinition>,
    fail_fast: bool,
    batch_threshold: usize,
    edit_counter: usize,
    touched_files: HashSet<String>,
    state: GateStateMachine,
}

impl QualityGateEngine {
    pub fn new(working_dir: impl Into<PathBuf>, overrides: &GateOverrides) -> Self {
        let working_dir = working_dir.into();
        let gates = detect::detect(&working_dir, overrides);
        Self {
            working_dir,
            gates,
            fail_fast: true,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            edit_counter: 0,
            touched_files: HashSet::new(),
            state: GateStateMachine::new(),
        }
    }

    pub fn state(&self) -> GateState {
        self.state.state()
    }

    /// Record a `PostToolUse` edit event and report whether it should
    /// trigger a gate run immediately, and separately whether the batched
    /// threshold has now been crossed.
    pub fn record_edit(&mut self, kind: ToolEventKind, path: &str, edit_text: &str) -> (bool, bool) {
        self.edit_counter += 1;
        self.touched_files.insert(path.to_string());

        let immediate = kind == ToolEventKind::Delete
            || is_high_risk_path(path)
            || contains_import_export(edit_text)
            || self.touched_files.len() >= DISTINCT_FILE_THRESHOLD;

        let batched = self.edit_counter >= self.batch_threshold;

        (immediate, batched)
    }

    fn reset_edit_window(&mut self) {
        self.edit_counter = 0;
        self.touched_files.clear();
    }

    /// Run every gate sequentially in declared order, stopping at the first
    /// failure when `fail_fast` is set. Resets the edit counter afterward
    /// regardless of outcome.
    pub fn run(&mut self) -> Result<GateRun> {
        self.state.start_evaluation()?;
        let mut outcomes = Vec::new();

        for gate in &self.gates {
            let outcome = run_one_gate(&self.working_dir, gate);
            let passed = outcome.passed;
            outcomes.push(outcome);
            if !passed && self.fail_fast && !gate.optional {
                break;
            }
        }

        self.reset_edit_window();
        let all_passed = outcomes.iter().all(|o| o.passed);
        self.state.record_result(all_passed)?;
        Ok(GateRun { outcomes, all_passed })
    }

    /// Execute the host's chosen action for a FAILED run. `Rollback`
    /// performs the deterministic rollback sequence; the others are pure
    /// state transitions the caller drives (fix re-injects diagnostics, and
    /// continue/pause just record intent).
    pub fn apply_action(&mut self, action: FailureAction, checkpoints_dir: &Path, reason: &str) -> Result<GateState> {
        let next_state = self.state.apply_action(action)?;
        if action == FailureAction::Rollback {
            rollback::rollback(&self.working_dir, checkpoints_dir, reason)?;
            self.reset_edit_window();
        }
        self.state.acknowledge();
        Ok(next_state)
    }

    pub fn gates(&self) -> &[GateDefinition] {
        &self.gates
    }
}

fn run_one_gate(working_dir: &Path, gate: &GateDefinition) -> GateOutcome {
    let start = Instant::now();
    let Some((program, args)) = gate.command.split_first() else {
        return GateOutcome { name: gate.name.clone(), passed: true, exit_code: Some(0), duration_ms: 0, diagnostics: vec![] };
    };

    if let Some(e) = args.iter().find_map(|a| crate::shell_safety::validate_arg(a).err()) {
        return GateOutcome {
            name: gate.name.clone(),
            passed: false,
            exit_code: None,
            duration_ms: start.elapsed().as_millis(),
            diagnostics: vec![Diagnostic {
                file: None,
                line: None,
                column: None,
                code: None,
                message: format!("refusing to run gate command: {e}"),
            }],
        };
    }

    match run_with_timeout(program, args, working_dir, Duration::from_secs(gate.timeout_secs)) {
        Ok(RunOutcome::Finished { exit_code, combined_output }) => {
            let duration_ms = start.elapsed().as_millis();
            let passed = exit_code == Some(0);
            let diagnostics = if passed { Vec::new() } else { diagnostics::parse(&gate.name, &combined_output) };
            GateOutcome { name: gate.name.clone(), passed, exit_code, duration_ms, diagnostics }
        }
        Ok(RunOutcome::TimedOut) => GateOutcome {
            name: gate.name.clone(),
            passed: false,
            exit_code: None,
            duration_ms: start.elapsed().as_millis(),
            diagnostics: vec![Diagnostic {
                file: None,
                line: None,
                column: None,
                code: None,
                message: "timed out".to_string(),
            }],
        },
        Err(e) => GateOutcome {
            name: gate.name.clone(),
            passed: false,
            exit_code: None,
            duration_ms: start.elapsed().as_millis(),
            diagnostics: vec![Diagnostic { file: None, line: None, column: None, code: None, message: e.to_string() }],
        },
    }
}

enum RunOutcome {
    Finished { exit_code: Option<i32>, combined_output: String },
    TimedOut,
}

/// Spawn `program args` in `working_dir`, draining stdout/stderr on
/// background threads so a chatty gate can't deadlock on a full pipe, and
/// poll for completion against `timeout`. A gate that outruns its timeout is
/// killed and reaped rather than left behind as a zombie.
fn run_with_timeout(
    program: &str,
    args: &[String],
    working_dir: &Path,
    timeout: Duration,
) -> std::io::Result<RunOutcome> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout = child.stdout.take().expect("stdout piped");
    let mut stderr = child.stderr.take().expect("stderr piped");
    let stdout_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut stdout, &mut buf).ok();
        buf
    });
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut stderr, &mut buf).ok();
        buf
    });

    let start = Instant::now();
    let poll_interval = Duration::from_millis(25);
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if start.elapsed() >= timeout {
            break None;
        }
        std::thread::sleep(poll_interval);
    };

    let Some(status) = status else {
        child.kill()?;
        child.wait()?;
        stdout_reader.join().ok();
        stderr_reader.join().ok();
        return Ok(RunOutcome::TimedOut);
    };

    let out = stdout_reader.join().unwrap_or_default();
    let err = stderr_reader.join().unwrap_or_default();
    let mut combined_output = String::from_utf8_lossy(&out).into_owned();
    combined_output.push_str(&String::from_utf8_lossy(&err));

    Ok(RunOutcome::Finished { exit_code: status.code(), combined_output })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_risk_path_triggers_immediate() {
        let mut engine = QualityGateEngine::new(tempfile::tempdir().unwrap().path(), &GateOverrides::default());
        let (immediate, _) = engine.record_edit(ToolEventKind::Edit, "tsconfig.json", "no imports here");
        assert!(immediate);
    }

    #[test]
    fn import_keyword_triggers_immediate() {
        let mut engine = QualityGateEngine::new(tempfile::tempdir().unwrap().path(), &GateOverrides::default());
        let (immediate, _) = engine.record_edit(ToolEventKind::Edit, "src/lib.rs", "import { x } from 'y'");
        assert!(immediate);
    }

    #[test]
    fn delete_always_triggers_immediate() {
        let mut engine = QualityGateEngine::new(tempfile::tempdir().unwrap().path(), &GateOverrides::default());
        let (immediate, _) = engine.record_edit(ToolEventKind::Delete, "src/old.rs", "");
        assert!(immediate);
    }

    #[test]
    fn three_distinct_files_triggers_immediate() {
        let mut engine = QualityGateEngine::new(tempfile::tempdir().unwrap().path(), &GateOverrides::default());
        engine.record_edit(ToolEventKind::Edit, "a.rs", "x");
        engine.record_edit(ToolEventKind::Edit, "b.rs", "x");
        let (immediate, _) = engine.record_edit(ToolEventKind::Edit, "c.rs", "x");
        assert!(immediate);
    }

    #[test]
    fn batched_threshold_fires_at_five_edits() {
        let mut engine = QualityGateEngine::new(tempfile::tempdir().unwrap().path(), &GateOverrides::default());
        let mut last_batched = false;
        for i in 0..5 {
            let (_, batched) = engine.record_edit(ToolEventKind::Edit, &format!("f{i}.rs"), "plain text");
            last_batched = batched;
        }
        assert!(last_batched);
    }

    #[test]
    fn run_with_no_detected_gates_passes_trivially() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = QualityGateEngine::new(dir.path(), &GateOverrides::default());
        let run = engine.run().unwrap();
        assert!(run.all_passed);
        assert_eq!(engine.state(), GateState::Idle);
    }

    #[test]
    fn run_resets_edit_window_regardless_of_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = QualityGateEngine::new(dir.path(), &GateOverrides::default());
        engine.record_edit(ToolEventKind::Edit, "a.rs", "x");
        engine.run().unwrap();
        assert_eq!(engine.edit_counter, 0);
        assert!(engine.touched_files.is_empty());
    }

    #[test]
    fn gate_command_exceeding_its_timeout_is_killed_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let gate = GateDefinition {
            name: "slow".to_string(),
            command: vec!["sleep".to_string(), "5".to_string()],
            timeout_secs: 1,
            optional: false,
        };
        let outcome = run_one_gate(dir.path(), &gate);
        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.diagnostics.iter().any(|d| d.message.contains("timed out")));
    }

    #[test]
    fn gate_command_finishing_under_timeout_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let gate = GateDefinition {
            name: "quick".to_string(),
            command: vec!["true".to_string()],
            timeout_secs: 5,
            optional: false,
        };
        let outcome = run_one_gate(dir.path(), &gate);
        assert!(outcome.passed);
        assert_eq!(outcome.exit_code, Some(0));
    }
}
