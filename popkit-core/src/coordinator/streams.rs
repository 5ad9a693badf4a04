//! Stream Session bookkeeping — `STREAM_START`/`STREAM_CHUNK`/`STREAM_END`
//! and the drift-based course-correction nudge.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DRIFT_CHECK_INTERVAL: usize = 10;
const DRIFT_NUDGE_THRESHOLD: usize = 2;
const DRIFT_MARKERS: &[&str] = &["however", "instead", "alternatively", "but actually"];
const COMPLETED_STREAM_GC_SECS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: u64,
    pub content: String,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
    /// Set when this chunk's index is lower than one already seen for this
    /// stream; the chunk is still accepted, just flagged.
    pub out_of_order: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSession {
    pub session_id: String,
    pub agent_id: String,
    pub tool_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
    pub is_complete: bool,
    pub error: Option<String>,
    max_index_seen: Option<u64>,
    chunks_since_last_drift_check: usize,
}

impl StreamSession {
    fn key(session_id: &str, agent_id: &str) -> String {
        format!("{session_id}:{agent_id}")
    }

    /// Content reconstructed in index order regardless of arrival order.
    pub fn total_content(&self) -> String {
        let mut sorted = self.chunks.clone();
        sorted.sort_by_key(|c| c.index);
        sorted.into_iter().map(|c| c.content).collect::<Vec<_>>().join("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftOutcome {
    None,
    CourseCorrect,
}

#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: HashMap<String, StreamSession>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self { streams: HashMap::new() }
    }

    pub fn start(&mut self, session_id: &str, agent_id: &str, tool_name: Option<String>) -> &StreamSession {
        let key = StreamSession::key(session_id, agent_id);
        let stream = StreamSession {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            tool_name,
            started_at: Utc::now(),
            chunks: Vec::new(),
            is_complete: false,
            error: None,
            max_index_seen: None,
            chunks_since_last_drift_check: 0,
        };
        self.streams.insert(key.clone(), stream);
        self.streams.get(&key).expect("just inserted")
    }

    /// Append a chunk; returns whether a drift-based course-correct nudge
    /// should fire right now (checked every 10 chunks).
    pub fn chunk(
        &mut self,
        session_id: &str,
        agent_id: &str,
        index: u64,
        content: String,
        is_final: bool,
    ) -> Option<DriftOutcome> {
        let key = StreamSession::key(session_id, agent_id);
        let stream = self.streams.get_mut(&key)?;

        let out_of_order = stream.max_index_seen.is_some_and(|max| index < max);
        stream.max_index_seen = Some(stream.max_index_seen.map_or(index, |max| max.max(index)));

        stream.chunks.push(Chunk { index, content, is_final, timestamp: Utc::now(), out_of_order });
        if is_final {
            stream.is_complete = true;
        }

        stream.chunks_since_last_drift_check += 1;
        if stream.chunks_since_last_drift_check >= DRIFT_CHECK_INTERVAL {
            stream.chunks_since_last_drift_check = 0;
            let window_start = stream.chunks.len().saturating_sub(DRIFT_CHECK_INTERVAL);
            let marker_hits: usize = stream.chunks[window_start..]
                .iter()
                .map(|c| {
                    let lowered = c.content.to_lowercase();
                    DRIFT_MARKERS.iter().filter(|m| lowered.contains(**m)).count()
                })
                .sum();
            if marker_hits >= DRIFT_NUDGE_THRESHOLD {
                return Some(DriftOutcome::CourseCorrect);
            }
        }
        Some(DriftOutcome::None)
    }

    pub fn end(&mut self, session_id: &str, agent_id: &str, error: Option<String>) {
        let key = StreamSession::key(session_id, agent_id);
        if let Some(stream) = self.streams.get_mut(&key) {
            stream.is_complete = true;
            stream.error = error;
        }
    }

    pub fn get(&self, session_id: &str, agent_id: &str) -> Option<&StreamSession> {
        self.streams.get(&StreamSession::key(session_id, agent_id))
    }

    /// Completed streams older than 300s are garbage-collected.
    pub fn garbage_collect(&mut self) -> usize {
        let now = Utc::now();
        let before = self.streams.len();
        self.streams.retain(|_, s| {
            !(s.is_complete && (now - s.started_at).num_seconds() > COMPLETED_STREAM_GC_SECS)
        });
        before - self.streams.len()
    }
}
