//! Sync barrier — `PHASE_EXIT` waits for every active agent to ack
//! `SYNC_BARRIER` before the quality-gate suite runs and the next phase's
//! `PHASE_ENTER` opens.

use std::collections::HashSet;

use crate::gate::{GateRun, QualityGateEngine, Result as GateResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// Not every expected agent has acked yet.
    Waiting { pending: Vec<String> },
    /// All agents acked and the gate suite passed; the next phase may open.
    GatePassed,
    /// All agents acked but the gate suite failed; `PHASE_ENTER(next)` must
    /// not open until the failure is resolved.
    GateFailed(GateRun),
}

/// One in-flight `PHASE_EXIT`: which agents are expected to ack, and which
/// already have.
pub struct SyncBarrier {
    pub phase: String,
    expected: HashSet<String>,
    acked: HashSet<String>,
}

impl SyncBarrier {
    pub fn new(phase: impl Into<String>, active_agents: Vec<String>) -> Self {
        Self { phase: phase.into(), expected: active_agents.into_iter().collect(), acked: HashSet::new() }
    }

    /// Records a `SYNC_OK` ack from `agent_id`. No-op if the agent wasn't
    /// among those expected to ack this barrier (e.g. it registered after
    /// the barrier opened).
    pub fn ack(&mut self, agent_id: &str) {
        if self.expected.contains(agent_id) {
            self.acked.insert(agent_id.to_string());
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.expected.is_subset(&self.acked)
    }

    pub fn pending_agents(&self) -> Vec<String> {
        self.expected.difference(&self.acked).cloned().collect()
    }
}

/// Drives a single coordinator's phase transitions: opens a [`SyncBarrier`]
/// on `PHASE_EXIT`, runs the shared [`QualityGateEngine`] once every active
/// agent has acked, and gates whether `PHASE_ENTER(next)` may open.
pub struct PhaseCoordinator {
    gate: QualityGateEngine,
    barrier: Option<SyncBarrier>,
}

impl PhaseCoordinator {
    pub fn new(gate: QualityGateEngine) -> Self {
        Self { gate, barrier: None }
    }

    /// Opens a barrier for `phase` awaiting an ack from each of
    /// `active_agents`. Replaces any barrier already in flight.
    pub fn begin_exit(&mut self, phase: impl Into<String>, active_agents: Vec<String>) {
        self.barrier = Some(SyncBarrier::new(phase, active_agents));
    }

    pub fn pending_agents(&self) -> Vec<String> {
        self.barrier.as_ref().map(SyncBarrier::pending_agents).unwrap_or_default()
    }

    /// Records `agent_id`'s `SYNC_OK`. Once every expected agent has acked,
    /// runs the gate suite and returns the outcome; returns `Waiting`
    /// otherwise. Returns `None` if no barrier is currently open.
    pub fn ack(&mut self, agent_id: &str) -> Option<GateResult<BarrierOutcome>> {
        let barrier = self.barrier.as_mut()?;
        barrier.ack(agent_id);
        if !barrier.is_satisfied() {
            return Some(Ok(BarrierOutcome::Waiting { pending: barrier.pending_agents() }));
        }

        let outcome = match self.gate.run() {
            Ok(run) if run.all_passed => {
                self.barrier = None;
                Ok(BarrierOutcome::GatePassed)
            }
            Ok(run) => Ok(BarrierOutcome::GateFailed(run)),
            Err(e) => Err(e),
        };
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateOverrides;

    #[test]
    fn barrier_waits_until_every_agent_acks() {
        let mut barrier = SyncBarrier::new("phase-1", vec!["a1".to_string(), "a2".to_string()]);
        assert!(!barrier.is_satisfied());
        barrier.ack("a1");
        assert!(!barrier.is_satisfied());
        assert_eq!(barrier.pending_agents(), vec!["a2".to_string()]);
        barrier.ack("a2");
        assert!(barrier.is_satisfied());
    }

    #[test]
    fn ack_from_unexpected_agent_is_ignored() {
        let mut barrier = SyncBarrier::new("phase-1", vec!["a1".to_string()]);
        barrier.ack("stranger");
        assert!(!barrier.is_satisfied());
        assert_eq!(barrier.pending_agents(), vec!["a1".to_string()]);
    }

    #[test]
    fn phase_coordinator_runs_gate_once_satisfied_with_no_gates_defined() {
        let dir = tempfile::tempdir().unwrap();
        let engine = QualityGateEngine::new(dir.path(), &GateOverrides::default());
        let mut phase = PhaseCoordinator::new(engine);
        phase.begin_exit("phase-1", vec!["a1".to_string()]);
        let outcome = phase.ack("a1").unwrap().unwrap();
        assert_eq!(outcome, BarrierOutcome::GatePassed);
    }

    #[test]
    fn phase_coordinator_reports_waiting_before_barrier_satisfied() {
        let dir = tempfile::tempdir().unwrap();
        let engine = QualityGateEngine::new(dir.path(), &GateOverrides::default());
        let mut phase = PhaseCoordinator::new(engine);
        phase.begin_exit("phase-1", vec!["a1".to_string(), "a2".to_string()]);
        let outcome = phase.ack("a1").unwrap().unwrap();
        assert_eq!(outcome, BarrierOutcome::Waiting { pending: vec!["a2".to_string()] });
    }

    #[test]
    fn ack_with_no_open_barrier_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let engine = QualityGateEngine::new(dir.path(), &GateOverrides::default());
        let mut phase = PhaseCoordinator::new(engine);
        assert!(phase.ack("a1").is_none());
    }
}
