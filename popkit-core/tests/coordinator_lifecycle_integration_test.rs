//! Drives the power coordinator through a register -> check-in -> stream ->
//! phase-exit -> sync-ok sequence against the file-backed bus, the way two
//! cooperating agent processes would see it end to end.

use popkit_core::bus::file_log::FileLogBus;
use popkit_core::bus::{Bus, Envelope, MessageType, Subscription};
use popkit_core::checkpoint::CheckpointManager;
use popkit_core::coordinator::{BarrierOutcome, DispatchOutcome, PhaseCoordinator, PowerCoordinator};
use popkit_core::gate::{GateOverrides, QualityGateEngine};

fn coordinator(dir: &std::path::Path) -> PowerCoordinator {
    let gate = QualityGateEngine::new(dir, &GateOverrides::default());
    let phase = PhaseCoordinator::new(gate);
    let checkpoints = CheckpointManager::new(dir, 20);
    PowerCoordinator::new(phase, dir.join("heartbeats"), checkpoints, "coordinator")
}

#[test]
fn register_checkin_and_stream_round_trip_through_the_bus() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = coordinator(dir.path());
    let bus = Bus::FileLog(FileLogBus::new(dir.path().join("bus")));

    let register =
        Envelope::new(MessageType::Register, "agent-1", None, serde_json::json!({"session_id": "s1", "role": "coder"}));
    assert!(matches!(coord.dispatch(&register).unwrap(), DispatchOutcome::Ack));
    coord.publish(&bus, register.clone()).unwrap();

    let checkin = Envelope::new(
        MessageType::Checkin,
        "agent-1",
        None,
        serde_json::json!({"tool_name": "Edit", "file": "main.rs"}),
    );
    coord.dispatch(&checkin).unwrap();

    let agent = coord.agents.get("agent-1").unwrap();
    assert_eq!(agent.tool_calls_total, 1);
    assert_eq!(agent.files_touched.len(), 1);

    let start = Envelope::new(MessageType::StreamStart, "agent-1", None, serde_json::json!({"session_id": "s1"}));
    coord.dispatch(&start).unwrap();

    let chunk_a = Envelope::new(
        MessageType::StreamChunk,
        "agent-1",
        None,
        serde_json::json!({"session_id": "s1", "chunk_index": 0, "content": "build", "is_final": false}),
    );
    coord.dispatch(&chunk_a).unwrap();

    let chunk_b = Envelope::new(
        MessageType::StreamChunk,
        "agent-1",
        None,
        serde_json::json!({"session_id": "s1", "chunk_index": 1, "content": "ing...done", "is_final": true}),
    );
    coord.dispatch(&chunk_b).unwrap();

    let stream = coord.streams.get("s1", "agent-1").unwrap();
    assert!(stream.is_complete);
    assert_eq!(stream.total_content(), "building...done");

    let mut subscription = bus.subscribe(vec!["coordinator".to_string()]);
    let received = subscription.poll().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from_agent, "agent-1");
}

#[test]
fn phase_exit_then_sync_ok_from_the_only_active_agent_passes_the_barrier() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = coordinator(dir.path());

    let register = Envelope::new(MessageType::Register, "agent-1", None, serde_json::json!({"session_id": "s1"}));
    coord.dispatch(&register).unwrap();

    let exit = Envelope::new(MessageType::PhaseExit, "agent-1", None, serde_json::json!({"phase": "design"}));
    coord.dispatch(&exit).unwrap();

    let sync_ok = Envelope::new(MessageType::SyncOk, "agent-1", None, serde_json::json!({}));
    match coord.dispatch(&sync_ok).unwrap() {
        DispatchOutcome::Barrier(BarrierOutcome::GatePassed) => {}
        other => panic!("expected gate to pass with a single agent acking, got {other:?}"),
    }
}

#[test]
fn stream_start_without_a_session_id_is_a_malformed_payload_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = coordinator(dir.path());
    let register = Envelope::new(MessageType::Register, "agent-1", None, serde_json::json!({}));
    coord.dispatch(&register).unwrap();

    let start = Envelope::new(MessageType::StreamStart, "agent-1", None, serde_json::json!({}));
    assert!(coord.dispatch(&start).is_err());
}
