//! Heartbeat Monitor — session liveness and stuck-agent detection.
//!
//! Beats are append-only, one jsonl file per session. `detect_stuck`
//! combines four independent signals into a confidence score in `[0,1]`;
//! `is_stuck` is just `confidence >= 0.5`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const STUCK_THRESHOLD: f32 = 0.5;
const NO_HEARTBEAT_SECS: i64 = 180;
const NO_HEARTBEAT_WEIGHT: f32 = 0.4;
const REPEATED_EDIT_THRESHOLD: usize = 5;
const REPEATED_EDIT_WINDOW: usize = 20;
const REPEATED_EDIT_WEIGHT: f32 = 0.2;
const BASH_FAILURE_STREAK: usize = 3;
const BASH_FAILURE_WINDOW: usize = 10;
const BASH_FAILURE_WEIGHT: f32 = 0.3;
const CIRCULAR_EDIT_WEIGHT: f32 = 0.3;

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HeartbeatError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub tool_calls_total: u64,
    pub files_touched_set_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_note: Option<String>,
}

/// One observed tool-call event, fed in for stuck-detection signals. Kept
/// separate from the heartbeat jsonl so recency windows can be computed
/// without re-parsing beat records.
#[derive(Debug, Clone)]
pub struct ToolCallEvent {
    pub tool_name: String,
    pub file_path: Option<String>,
    pub bash_exit_success: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StuckReport {
    pub is_stuck: bool,
    pub confidence: f32,
    pub indicators: Vec<String>,
}

/// Append-only heartbeat log plus an in-memory rolling window of recent
/// tool-call events, keyed by session.
pub struct HeartbeatMonitor {
    root: PathBuf,
    recent_events: HashMap<String, Vec<ToolCallEvent>>,
}

impl HeartbeatMonitor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), recent_events: HashMap::new() }
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id).join("heartbeats.jsonl")
    }

    pub fn beat(
        &self,
        session_id: &str,
        tool_calls_total: u64,
        files_touched_set_size: usize,
        progress_note: Option<String>,
    ) -> Result<Heartbeat> {
        let heartbeat = Heartbeat {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            tool_calls_total,
            files_touched_set_size,
            progress_note,
        };
        let path = self.session_file(session_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(&heartbeat)?)?;
        Ok(heartbeat)
    }

    /// Record a tool-call event into the session's rolling window (kept at
    /// the largest window any signal needs) for use by [`Self::detect_stuck`].
    pub fn record_event(&mut self, session_id: &str, event: ToolCallEvent) {
        let window = self.recent_events.entry(session_id.to_string()).or_default();
        window.push(event);
        let cap = REPEATED_EDIT_WINDOW.max(BASH_FAILURE_WINDOW).max(4);
        if window.len() > cap {
            let excess = window.len() - cap;
            window.drain(0..excess);
        }
    }

    fn last_heartbeat(&self, session_id: &str) -> Result<Option<Heartbeat>> {
        let path = self.session_file(session_id);
        let Ok(contents) = fs::read_to_string(path) else { return Ok(None) };
        let mut last = None;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(beat) = serde_json::from_str::<Heartbeat>(line) {
                last = Some(beat);
            }
        }
        Ok(last)
    }

    /// Combine the four liveness signals into a stuck report. With no
    /// heartbeats recorded at all, the age signal alone fires at a fixed
    /// confidence of 0.4 (below the 0.5 threshold).
    pub fn detect_stuck(&self, session_id: &str) -> Result<StuckReport> {
        let mut confidence = 0.0f32;
        let mut indicators = Vec::new();

        match self.last_heartbeat(session_id)? {
            Some(beat) => {
                let age = (Utc::now() - beat.timestamp).num_seconds();
                if age > NO_HEARTBEAT_SECS {
                    confidence += NO_HEARTBEAT_WEIGHT;
                    indicators.push(format!("no heartbeat for {age}s"));
                }
            }
            None => {
                confidence += NO_HEARTBEAT_WEIGHT;
                indicators.push("no heartbeat recorded".to_string());
            }
        }

        let events = self.recent_events.get(session_id).map(Vec::as_slice).unwrap_or(&[]);

        let recent_edits: Vec<&ToolCallEvent> = events
            .iter()
            .rev()
            .take(REPEATED_EDIT_WINDOW)
            .filter(|e| e.file_path.is_some())
            .collect();
        let mut edit_counts: HashMap<&str, usize> = HashMap::new();
        for e in &recent_edits {
            *edit_counts.entry(e.file_path.as_deref().unwrap()).or_insert(0) += 1;
        }
        if let Some((file, count)) = edit_counts.into_iter().max_by_key(|(_, c)| *c) {
            if count >= REPEATED_EDIT_THRESHOLD {
                confidence += REPEATED_EDIT_WEIGHT;
                indicators.push(format!("{file} edited {count} times in last {REPEATED_EDIT_WINDOW} tool calls"));
            }
        }

        let recent_bash: Vec<&ToolCallEvent> = events
            .iter()
            .rev()
            .take(BASH_FAILURE_WINDOW)
            .filter(|e| e.tool_name == "Bash")
            .collect();
        let mut consecutive_failures = 0usize;
        for e in &recent_bash {
            match e.bash_exit_success {
                Some(false) => consecutive_failures += 1,
                Some(true) => break,
                None => {}
            }
        }
        if consecutive_failures >= BASH_FAILURE_STREAK {
            confidence += BASH_FAILURE_WEIGHT;
            indicators.push(format!("{consecutive_failures} consecutive bash failures"));
        }

        let last_four: Vec<&str> = events
            .iter()
            .rev()
            .take(4)
            .filter_map(|e| e.file_path.as_deref())
            .collect();
        if last_four.len() == 4 && last_four[0] == last_four[2] && last_four[1] == last_four[3] && last_four[0] != last_four[1] {
            confidence += CIRCULAR_EDIT_WEIGHT;
            indicators.push(format!("circular edit pattern {}<->{}", last_four[1], last_four[0]));
        }

        let confidence = confidence.min(1.0);
        Ok(StuckReport { is_stuck: confidence >= STUCK_THRESHOLD, confidence, indicators })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_heartbeats_yields_fixed_low_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = HeartbeatMonitor::new(dir.path());
        let report = monitor.detect_stuck("s1").unwrap();
        assert!(!report.is_stuck);
        assert!((report.confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn repeated_file_edits_push_past_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = HeartbeatMonitor::new(dir.path());
        monitor.beat("s1", 1, 1, None).unwrap();
        for _ in 0..5 {
            monitor.record_event(
                "s1",
                ToolCallEvent { tool_name: "Edit".into(), file_path: Some("a.rs".into()), bash_exit_success: None },
            );
        }
        let report = monitor.detect_stuck("s1").unwrap();
        assert!(report.confidence >= 0.2);
        assert!(report.indicators.iter().any(|i| i.contains("a.rs")));
    }

    #[test]
    fn consecutive_bash_failures_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = HeartbeatMonitor::new(dir.path());
        monitor.beat("s1", 1, 1, None).unwrap();
        for _ in 0..3 {
            monitor.record_event(
                "s1",
                ToolCallEvent { tool_name: "Bash".into(), file_path: None, bash_exit_success: Some(false) },
            );
        }
        let report = monitor.detect_stuck("s1").unwrap();
        assert!(report.indicators.iter().any(|i| i.contains("consecutive bash")));
    }

    #[test]
    fn circular_edit_pattern_a_b_a_b_detected() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = HeartbeatMonitor::new(dir.path());
        monitor.beat("s1", 1, 1, None).unwrap();
        for f in ["a.rs", "b.rs", "a.rs", "b.rs"] {
            monitor.record_event(
                "s1",
                ToolCallEvent { tool_name: "Edit".into(), file_path: Some(f.into()), bash_exit_success: None },
            );
        }
        let report = monitor.detect_stuck("s1").unwrap();
        assert!(report.indicators.iter().any(|i| i.contains("circular")));
    }

    #[test]
    fn confidence_is_clamped_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = HeartbeatMonitor::new(dir.path());
        // No beat at all (+0.4), plus all other signals stacked.
        for _ in 0..5 {
            monitor.record_event(
                "s1",
                ToolCallEvent { tool_name: "Edit".into(), file_path: Some("x.rs".into()), bash_exit_success: None },
            );
        }
        for _ in 0..3 {
            monitor.record_event(
                "s1",
                ToolCallEvent { tool_name: "Bash".into(), file_path: None, bash_exit_success: Some(false) },
            );
        }
        let report = monitor.detect_stuck("s1").unwrap();
        assert!(report.confidence <= 1.0);
        assert!(report.is_stuck);
    }
}
