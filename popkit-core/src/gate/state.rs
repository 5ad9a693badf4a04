//! Gate state machine.
//!
//! `IDLE → EVALUATING → (PASSED | FAILED) → (FIX_REQUESTED | ROLLED_BACK |
//! PAUSED | CONTINUED) → IDLE`. `PAUSED` is the only state that does not
//! return to `IDLE` — it is a terminal that stops the host's progression
//! until the operator resumes manually.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Evaluating,
    Passed,
    Failed,
    FixRequested,
    RolledBack,
    Paused,
    Continued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    Fix,
    Rollback,
    Continue,
    Pause,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot start evaluation from {0:?}, engine must be idle")]
    NotIdle(GateState),
    #[error("cannot record a result outside of EVALUATING (currently {0:?})")]
    NotEvaluating(GateState),
    #[error("cannot choose a failure action from {0:?}, engine must be FAILED")]
    NotFailed(GateState),
    #[error("cannot choose a failure action from PASSED")]
    AlreadyPassed,
}

/// Drives the gate engine through its state machine. One instance per
/// working directory; `run()` in [`super::QualityGateEngine`] owns the
/// transitions end to end so callers never see an inconsistent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateStateMachine {
    state: GateState,
}

impl GateStateMachine {
    pub fn new() -> Self {
        Self { state: GateState::Idle }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn start_evaluation(&mut self) -> Result<(), TransitionError> {
        if self.state != GateState::Idle {
            return Err(TransitionError::NotIdle(self.state));
        }
        self.state = GateState::Evaluating;
        Ok(())
    }

    pub fn record_result(&mut self, all_passed: bool) -> Result<GateState, TransitionError> {
        if self.state != GateState::Evaluating {
            return Err(TransitionError::NotEvaluating(self.state));
        }
        self.state = if all_passed { GateState::Passed } else { GateState::Failed };
        if self.state == GateState::Passed {
            self.state = GateState::Idle;
        }
        Ok(self.state)
    }

    /// Apply the host's chosen failure action. Every outcome but `Pause`
    /// returns to `IDLE` on the next call to [`Self::acknowledge`].
    pub fn apply_action(&mut self, action: FailureAction) -> Result<GateState, TransitionError> {
        if self.state != GateState::Failed {
            if self.state == GateState::Passed {
                return Err(TransitionError::AlreadyPassed);
            }
            return Err(TransitionError::NotFailed(self.state));
        }
        self.state = match action {
            FailureAction::Fix => GateState::FixRequested,
            FailureAction::Rollback => GateState::RolledBack,
            FailureAction::Continue => GateState::Continued,
            FailureAction::Pause => GateState::Paused,
        };
        Ok(self.state)
    }

    /// Return to IDLE unless the current state is the PAUSED terminal.
    pub fn acknowledge(&mut self) {
        if self.state != GateState::Paused {
            self.state = GateState::Idle;
        }
    }
}

impl Default for GateStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
