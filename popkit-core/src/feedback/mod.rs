//! Feedback & Vote Store — SQLite-backed user ratings and a GitHub-reaction
//! vote cache feeding a composite issue-priority score.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DISMISSAL_SUPPRESS_LIMIT: u32 = 3;
const MIN_TOOL_CALLS_BETWEEN_PROMPTS: u64 = 10;
const VOTE_CACHE_TTL_SECS: i64 = 3_600;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, FeedbackError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rating {
    Poor = 0,
    Fair = 1,
    Good = 2,
    Great = 3,
}

impl Rating {
    fn from_i64(n: i64) -> Option<Self> {
        match n {
            0 => Some(Rating::Poor),
            1 => Some(Rating::Fair),
            2 => Some(Rating::Good),
            3 => Some(Rating::Great),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub session_id: String,
    pub timestamp: String,
    pub feature: String,
    pub rating: Rating,
    pub reason: Option<String>,
    pub user_prompted_after_tools: u64,
}

/// Decides whether the host should prompt the user for feedback on `feature`
/// right now, given the session's tool-call counter and prior dismissals.
pub struct PromptGate {
    last_prompted_at_tool_call: Option<u64>,
    dismissal_count: u32,
}

impl PromptGate {
    pub fn new() -> Self {
        Self { last_prompted_at_tool_call: None, dismissal_count: 0 }
    }

    pub fn should_prompt(&self, tool_calls_total: u64) -> bool {
        if self.dismissal_count >= DISMISSAL_SUPPRESS_LIMIT {
            return false;
        }
        match self.last_prompted_at_tool_call {
            None => tool_calls_total >= MIN_TOOL_CALLS_BETWEEN_PROMPTS,
            Some(last) => tool_calls_total.saturating_sub(last) >= MIN_TOOL_CALLS_BETWEEN_PROMPTS,
        }
    }

    pub fn record_prompted(&mut self, tool_calls_total: u64) {
        self.last_prompted_at_tool_call = Some(tool_calls_total);
    }

    pub fn record_dismissed(&mut self) {
        self.dismissal_count += 1;
    }
}

impl Default for PromptGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Cached GitHub reactions for one issue. `votes(reaction) = count`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteCounts {
    pub thumbs_up: u32,
    pub heart: u32,
    pub rocket: u32,
    pub thumbs_down: u32,
}

impl VoteCounts {
    fn weighted_sum(&self) -> f64 {
        self.thumbs_up as f64 + 2.0 * self.heart as f64 + 3.0 * self.rocket as f64 - self.thumbs_down as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuePriorityInputs {
    pub votes: VoteCounts,
    /// Votes across the whole tracked issue set, for normalisation.
    pub max_weighted_votes_observed: f64,
    pub staleness: f64,
    pub label_score: f64,
    pub epic_bonus: f64,
}

/// `priority(issue) = 0.35·normalise(votes) + 0.20·staleness + 0.30·label_score + 0.15·epic_bonus`.
pub fn priority(inputs: &IssuePriorityInputs) -> f64 {
    let normalised_votes = if inputs.max_weighted_votes_observed > 0.0 {
        (inputs.votes.weighted_sum() / inputs.max_weighted_votes_observed).clamp(0.0, 1.0)
    } else {
        0.0
    };
    0.35 * normalised_votes + 0.20 * inputs.staleness.clamp(0.0, 1.0) + 0.30 * inputs.label_score.clamp(0.0, 1.0)
        + 0.15 * inputs.epic_bonus.clamp(0.0, 1.0)
}

/// SQLite-backed storage for both feedback ratings and the vote cache.
pub struct FeedbackStore {
    conn: Connection,
}

impl FeedbackStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                feature TEXT NOT NULL,
                rating INTEGER NOT NULL,
                reason TEXT,
                user_prompted_after_tools INTEGER NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS vote_cache (
                issue_key TEXT PRIMARY KEY,
                thumbs_up INTEGER NOT NULL,
                heart INTEGER NOT NULL,
                rocket INTEGER NOT NULL,
                thumbs_down INTEGER NOT NULL,
                cached_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(())
    }

    pub fn record_feedback(&self, entry: &FeedbackEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO feedback (session_id, timestamp, feature, rating, reason, user_prompted_after_tools)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.session_id,
                entry.timestamp,
                entry.feature,
                entry.rating as i64,
                entry.reason,
                entry.user_prompted_after_tools as i64,
            ],
        )?;
        Ok(())
    }

    pub fn feedback_for_session(&self, session_id: &str) -> Result<Vec<FeedbackEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, timestamp, feature, rating, reason, user_prompted_after_tools
             FROM feedback WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            let rating_raw: i64 = row.get(3)?;
            Ok(FeedbackEntry {
                session_id: row.get(0)?,
                timestamp: row.get(1)?,
                feature: row.get(2)?,
                rating: Rating::from_i64(rating_raw).unwrap_or(Rating::Fair),
                reason: row.get(4)?,
                user_prompted_after_tools: row.get::<_, i64>(5)? as u64,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(FeedbackError::from)
    }

    /// Cache reaction counts for an issue, timestamped now.
    pub fn cache_votes(&self, issue_key: &str, votes: &VoteCounts) -> Result<()> {
        self.conn.execute(
            "INSERT INTO vote_cache (issue_key, thumbs_up, heart, rocket, thumbs_down, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(issue_key) DO UPDATE SET
                thumbs_up = excluded.thumbs_up, heart = excluded.heart,
                rocket = excluded.rocket, thumbs_down = excluded.thumbs_down,
                cached_at = excluded.cached_at",
            params![issue_key, votes.thumbs_up, votes.heart, votes.rocket, votes.thumbs_down, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Returns `None` if there's no cache entry or it's past the 1h TTL —
    /// the caller should re-fetch from the GitHub API in that case.
    pub fn cached_votes(&self, issue_key: &str) -> Result<Option<VoteCounts>> {
        let mut stmt = self.conn.prepare(
            "SELECT thumbs_up, heart, rocket, thumbs_down, cached_at FROM vote_cache WHERE issue_key = ?1",
        )?;
        let mut rows = stmt.query(params![issue_key])?;
        let Some(row) = rows.next()? else { return Ok(None) };
        let cached_at: String = row.get(4)?;
        let Ok(cached_at) = chrono::DateTime::parse_from_rfc3339(&cached_at) else { return Ok(None) };
        if (Utc::now() - cached_at.with_timezone(&Utc)).num_seconds() > VOTE_CACHE_TTL_SECS {
            return Ok(None);
        }
        Ok(Some(VoteCounts {
            thumbs_up: row.get::<_, i64>(0)? as u32,
            heart: row.get::<_, i64>(1)? as u32,
            rocket: row.get::<_, i64>(2)? as u32,
            thumbs_down: row.get::<_, i64>(3)? as u32,
        }))
    }
}
