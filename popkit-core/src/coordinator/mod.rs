//! Power Coordinator — the multi-agent orchestration hub: agent registry,
//! stream sessions, phase sync barriers, and stuck-agent recovery, all
//! wired to the [`crate::bus::Bus`].

pub mod barrier;
pub mod registry;
pub mod streams;

use std::path::PathBuf;

use thiserror::Error;

use crate::bus::{Bus, Envelope, MessageType};
use crate::checkpoint::{CheckpointManager, CheckpointTrigger};
use crate::gate::GateError;
use crate::heartbeat::{HeartbeatMonitor, ToolCallEvent};

pub use barrier::{BarrierOutcome, PhaseCoordinator, SyncBarrier};
pub use registry::{AgentRegistry, AgentState, AgentStatus};
pub use streams::{DriftOutcome, StreamRegistry, StreamSession};

const STUCK_CONFIDENCE_THRESHOLD: f32 = 0.5;
const AGENT_IDLE_GC_SECS: i64 = 1800;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Bus(#[from] crate::bus::BusError),
    #[error(transparent)]
    Heartbeat(#[from] crate::heartbeat::HeartbeatError),
    #[error(transparent)]
    Checkpoint(#[from] crate::checkpoint::CheckpointError),
    #[error("envelope missing required payload field '{0}'")]
    MalformedPayload(&'static str),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// What the coordinator wants the host to do after dispatching one
/// envelope. Most message types just update internal state and produce
/// nothing; `Broadcast` and `StuckRecovery` carry an outbound envelope the
/// host must publish.
#[derive(Debug)]
pub enum DispatchOutcome {
    Ack,
    Broadcast(Envelope),
    Barrier(BarrierOutcome),
    StuckRecovery { agent_id: String, checkpoint_label: String, envelope: Envelope },
}

/// Ties the agent registry, stream sessions, and phase barrier together and
/// drives them from inbound [`Envelope`]s. Agents and streams are referenced
/// only by id from the outside — this struct is the single owner (the
/// arena) for both.
pub struct PowerCoordinator {
    pub agents: AgentRegistry,
    pub streams: StreamRegistry,
    pub phase: PhaseCoordinator,
    heartbeats: HeartbeatMonitor,
    checkpoints: CheckpointManager,
    channel: String,
}

impl PowerCoordinator {
    pub fn new(
        phase: PhaseCoordinator,
        heartbeats_root: impl Into<PathBuf>,
        checkpoints: CheckpointManager,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            agents: AgentRegistry::new(),
            streams: StreamRegistry::new(),
            phase,
            heartbeats: HeartbeatMonitor::new(heartbeats_root),
            checkpoints,
            channel: channel.into(),
        }
    }

    /// Dispatches one envelope off the bus. This is the coordinator's sole
    /// entry point — every message type in [`MessageType`] funnels through
    /// here.
    pub fn dispatch(&mut self, envelope: &Envelope) -> Result<DispatchOutcome> {
        match envelope.msg_type {
            MessageType::Register => self.handle_register(envelope),
            MessageType::Checkin => self.handle_checkin(envelope),
            MessageType::StreamStart => self.handle_stream_start(envelope),
            MessageType::StreamChunk => self.handle_stream_chunk(envelope),
            MessageType::StreamEnd | MessageType::StreamError => self.handle_stream_end(envelope),
            MessageType::PhaseExit => self.handle_phase_exit(envelope),
            MessageType::SyncOk => self.handle_sync_ok(envelope),
            _ => Ok(DispatchOutcome::Ack),
        }
    }

    fn payload_str<'a>(envelope: &'a Envelope, field: &'static str) -> Result<&'a str> {
        envelope.payload.get(field).and_then(|v| v.as_str()).ok_or(CoordinatorError::MalformedPayload(field))
    }

    fn handle_register(&mut self, envelope: &Envelope) -> Result<DispatchOutcome> {
        let session_id = Self::payload_str(envelope, "session_id").unwrap_or(&envelope.from_agent);
        let role = envelope.payload.get("role").and_then(|v| v.as_str()).map(str::to_string);
        let capabilities = envelope
            .payload
            .get("capabilities")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        self.agents.register(envelope.from_agent.clone(), session_id, role, capabilities);
        Ok(DispatchOutcome::Ack)
    }

    fn handle_checkin(&mut self, envelope: &Envelope) -> Result<DispatchOutcome> {
        let tool_name = envelope.payload.get("tool_name").and_then(|v| v.as_str());
        let file_touched = envelope.payload.get("file").and_then(|v| v.as_str());
        let bash_exit_success = envelope.payload.get("bash_exit_success").and_then(|v| v.as_bool());
        self.agents.checkin(&envelope.from_agent, tool_name, file_touched);

        if let Some(agent) = self.agents.get(&envelope.from_agent) {
            let session_id = agent.session_id.clone();
            if let Some(tool_name) = tool_name {
                self.heartbeats.record_event(
                    &session_id,
                    ToolCallEvent {
                        tool_name: tool_name.to_string(),
                        file_path: file_touched.map(str::to_string),
                        bash_exit_success,
                    },
                );
            }
            self.heartbeats.beat(&session_id, agent.tool_calls_total, agent.files_touched.len(), None)?;
            let report = self.heartbeats.detect_stuck(&session_id)?;
            if report.confidence >= STUCK_CONFIDENCE_THRESHOLD {
                return self.recover_stuck_agent(&envelope.from_agent.clone());
            }
        }
        Ok(DispatchOutcome::Ack)
    }

    /// Stuck recovery never kills the agent: it takes an auto-checkpoint
    /// and broadcasts a notice so a human or a higher-tier agent can step
    /// in. The agent keeps running.
    fn recover_stuck_agent(&mut self, agent_id: &str) -> Result<DispatchOutcome> {
        self.agents.mark_stuck(agent_id);
        let checkpoint = self
            .checkpoints
            .create_auto(CheckpointTrigger::PhaseComplete, serde_json::json!({ "reason": "stuck agent recovery" }))?;
        let envelope = Envelope::new(
            MessageType::Insight,
            "coordinator",
            None,
            serde_json::json!({
                "kind": "stuck_recovery",
                "agent_id": agent_id,
                "checkpoint_name": checkpoint.name,
            }),
        );
        Ok(DispatchOutcome::StuckRecovery { agent_id: agent_id.to_string(), checkpoint_label: checkpoint.name, envelope })
    }

    fn handle_stream_start(&mut self, envelope: &Envelope) -> Result<DispatchOutcome> {
        let session_id = Self::payload_str(envelope, "session_id")?;
        let tool_name = envelope.payload.get("tool_name").and_then(|v| v.as_str()).map(str::to_string);
        self.streams.start(session_id, &envelope.from_agent, tool_name);
        Ok(DispatchOutcome::Ack)
    }

    fn handle_stream_chunk(&mut self, envelope: &Envelope) -> Result<DispatchOutcome> {
        let session_id = Self::payload_str(envelope, "session_id")?;
        let index = envelope.payload.get("chunk_index").and_then(|v| v.as_u64()).unwrap_or(0);
        let content = envelope.payload.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let is_final = envelope.payload.get("is_final").and_then(|v| v.as_bool()).unwrap_or(false);

        match self.streams.chunk(session_id, &envelope.from_agent, index, content, is_final) {
            Some(DriftOutcome::CourseCorrect) => {
                let nudge = Envelope::new(
                    MessageType::CourseCorrect,
                    "coordinator",
                    Some(envelope.from_agent.clone()),
                    serde_json::json!({ "session_id": session_id }),
                );
                Ok(DispatchOutcome::Broadcast(nudge))
            }
            _ => Ok(DispatchOutcome::Ack),
        }
    }

    fn handle_stream_end(&mut self, envelope: &Envelope) -> Result<DispatchOutcome> {
        let session_id = Self::payload_str(envelope, "session_id")?;
        let error = envelope.payload.get("error").and_then(|v| v.as_str()).map(str::to_string);
        self.streams.end(session_id, &envelope.from_agent, error);
        Ok(DispatchOutcome::Ack)
    }

    fn handle_phase_exit(&mut self, envelope: &Envelope) -> Result<DispatchOutcome> {
        let phase = Self::payload_str(envelope, "phase")?;
        self.phase.begin_exit(phase, self.agents.active_agent_ids());
        Ok(DispatchOutcome::Ack)
    }

    fn handle_sync_ok(&mut self, envelope: &Envelope) -> Result<DispatchOutcome> {
        match self.phase.ack(&envelope.from_agent) {
            Some(Ok(outcome)) => Ok(DispatchOutcome::Barrier(outcome)),
            Some(Err(e)) => Err(CoordinatorError::Gate(e)),
            None => Ok(DispatchOutcome::Ack),
        }
    }

    /// Periodic upkeep: drops completed streams older than 300s and agents
    /// idle past 1800s (stuck agents are exempt from both).
    pub fn cleanup(&mut self) -> (usize, Vec<String>) {
        (self.streams.garbage_collect(), self.agents.garbage_collect(Some(AGENT_IDLE_GC_SECS)))
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn publish(&self, bus: &Bus, envelope: Envelope) -> Result<()> {
        bus.publish(&self.channel, envelope).map_err(CoordinatorError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointManager;
    use crate::gate::{GateOverrides, QualityGateEngine};

    fn coordinator(dir: &std::path::Path) -> PowerCoordinator {
        let gate = QualityGateEngine::new(dir, &GateOverrides::default());
        let phase = PhaseCoordinator::new(gate);
        let checkpoints = CheckpointManager::new(dir, 20);
        PowerCoordinator::new(phase, dir.join("heartbeats"), checkpoints, "coordinator")
    }

    #[test]
    fn register_then_checkin_tracks_the_agent() {
        let dir = tempfile::tempdir().unwrap();
        let mut coord = coordinator(dir.path());
        let register = Envelope::new(MessageType::Register, "agent-1", None, serde_json::json!({"session_id": "s1"}));
        coord.dispatch(&register).unwrap();

        let checkin = Envelope::new(
            MessageType::Checkin,
            "agent-1",
            None,
            serde_json::json!({"tool_name": "Edit", "file": "main.rs"}),
        );
        coord.dispatch(&checkin).unwrap();

        assert_eq!(coord.agents.get("agent-1").unwrap().tool_calls_total, 1);
    }

    #[test]
    fn stream_lifecycle_reconstructs_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut coord = coordinator(dir.path());
        let start =
            Envelope::new(MessageType::StreamStart, "agent-1", None, serde_json::json!({"session_id": "s1"}));
        coord.dispatch(&start).unwrap();

        let chunk = Envelope::new(
            MessageType::StreamChunk,
            "agent-1",
            None,
            serde_json::json!({"session_id": "s1", "chunk_index": 0, "content": "hi", "is_final": true}),
        );
        coord.dispatch(&chunk).unwrap();

        assert_eq!(coord.streams.get("s1", "agent-1").unwrap().total_content(), "hi");
    }

    #[test]
    fn phase_exit_then_sync_ok_satisfies_the_barrier() {
        let dir = tempfile::tempdir().unwrap();
        let mut coord = coordinator(dir.path());
        let register = Envelope::new(MessageType::Register, "agent-1", None, serde_json::json!({"session_id": "s1"}));
        coord.dispatch(&register).unwrap();

        let exit = Envelope::new(MessageType::PhaseExit, "agent-1", None, serde_json::json!({"phase": "design"}));
        coord.dispatch(&exit).unwrap();

        let sync_ok = Envelope::new(MessageType::SyncOk, "agent-1", None, serde_json::json!({}));
        let outcome = coord.dispatch(&sync_ok).unwrap();
        match outcome {
            DispatchOutcome::Barrier(BarrierOutcome::GatePassed) => {}
            other => panic!("expected gate to pass, got {other:?}"),
        }
    }

    #[test]
    fn malformed_stream_start_without_session_id_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut coord = coordinator(dir.path());
        let start = Envelope::new(MessageType::StreamStart, "agent-1", None, serde_json::json!({}));
        assert!(coord.dispatch(&start).is_err());
    }
}
