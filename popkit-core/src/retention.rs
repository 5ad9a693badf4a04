//! Retention Tracker — classifies tool-call results into retention tiers and
//! expires them according to each tier's TTL.
//!
//! | Tier | TTL (tool calls) | Expires on |
//! |------|------------------|------------|
//! | ephemeral | 1 | next tool call |
//! | short | 5 | supersede (same pattern) |
//! | medium | ∞ | edit(file) or commit |
//! | session | ∞ | supersede (same command) |
//! | preserved | ∞ | manual only |

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Ephemeral,
    Short,
    Medium,
    Session,
    Preserved,
}

impl Tier {
    /// `None` means the tier never expires by call count alone.
    fn ttl_calls(self) -> Option<u64> {
        match self {
            Tier::Ephemeral => Some(1),
            Tier::Short => Some(5),
            Tier::Medium | Tier::Session | Tier::Preserved => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionRecord {
    pub id: String,
    pub tool_name: String,
    pub tier: Tier,
    /// The call counter value when this record was created.
    pub created_at_call: u64,
    pub token_estimate: u64,
    /// Key used to detect supersession: a Grep pattern, a Bash command
    /// family, etc. Two records with the same tool_name and pattern_key
    /// supersede one another.
    pub pattern_key: String,
    pub superseded: bool,
    pub expired: bool,
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$")).map(|re| re.is_match(text)).unwrap_or(false)
}

/// Matches a Bash command against a configured command-family pattern. A
/// pattern containing `*` globs as usual; a bare pattern (e.g. `"git commit"`)
/// matches the command itself or as a prefix followed by a space, so it
/// still covers `"git commit -m x"` without matching `"git commitment"`.
fn command_family_match(pattern: &str, text: &str) -> bool {
    if pattern.contains('*') {
        glob_match(pattern, text)
    } else {
        text == pattern || text.starts_with(&format!("{pattern} "))
    }
}

/// Default per-tool tier classification, overridable via [`RetentionTracker::with_overrides`].
fn default_tier_for(tool_name: &str, pattern_key: &str) -> Tier {
    match tool_name {
        "Read" => Tier::Medium,
        "Grep" | "Glob" => Tier::Short,
        "Edit" | "Write" => Tier::Ephemeral,
        "Bash" => {
            // "*test*"/"*build*" commands are also Session tier, which is
            // this arm's default for anything not in EPHEMERAL_COMMANDS, so
            // they need no explicit check.
            const EPHEMERAL_COMMANDS: &[&str] = &["git commit", "git push", "mkdir", "rm*"];
            if EPHEMERAL_COMMANDS.iter().any(|p| command_family_match(p, pattern_key)) {
                Tier::Ephemeral
            } else {
                Tier::Session
            }
        }
        _ => Tier::Session,
    }
}

#[derive(Debug, Default)]
pub struct ExpirySummary {
    pub expired_ids: Vec<String>,
    pub token_estimate: u64,
}

/// Tracks retained tool-call results across a session and reports expirations
/// on every subsequent call. Serialisable so the hook binary can persist one
/// instance per session between process-per-invocation hook calls.
#[derive(Serialize, Deserialize)]
pub struct RetentionTracker {
    records: Vec<RetentionRecord>,
    call_counter: u64,
    overrides: HashMap<String, Tier>,
}

impl RetentionTracker {
    pub fn new() -> Self {
        Self { records: Vec::new(), call_counter: 0, overrides: HashMap::new() }
    }

    pub fn with_overrides(overrides: HashMap<String, Tier>) -> Self {
        Self { records: Vec::new(), call_counter: 0, overrides }
    }

    fn classify(&self, tool_name: &str, pattern_key: &str) -> Tier {
        self.overrides.get(tool_name).copied().unwrap_or_else(|| default_tier_for(tool_name, pattern_key))
    }

    /// Record a new tool-call result and return everything that expired as a
    /// consequence: (1) classify and emit the new record, (2) mark
    /// supersessions, (3) collect and return all newly-expired ids.
    pub fn record_tool_call(
        &mut self,
        id: impl Into<String>,
        tool_name: impl Into<String>,
        pattern_key: impl Into<String>,
        token_estimate: u64,
    ) -> ExpirySummary {
        self.call_counter += 1;
        let tool_name = tool_name.into();
        let pattern_key = pattern_key.into();
        let tier = self.classify(&tool_name, &pattern_key);

        // Mark supersessions: same tool_name + pattern_key, regardless of tier,
        // is superseded by the new record (Grep same pattern, Bash same family).
        for record in self.records.iter_mut() {
            if !record.superseded
                && !record.expired
                && record.tool_name == tool_name
                && record.pattern_key == pattern_key
            {
                record.superseded = true;
            }
        }

        self.records.push(RetentionRecord {
            id: id.into(),
            tool_name,
            tier,
            created_at_call: self.call_counter,
            token_estimate,
            pattern_key,
            superseded: false,
            expired: false,
        });

        self.collect_expirations()
    }

    /// Medium-tier records expire when the file they were read from is
    /// edited. A `Read`'s `pattern_key` is the file path it read (see
    /// `retention_pattern_key` in the hook binary), so scoping by that field
    /// expires only the records tied to the edited file, not every
    /// Medium-tier record in the session.
    pub fn notify_edit(&mut self, file_path: &str) -> ExpirySummary {
        for record in self.records.iter_mut() {
            if record.tier == Tier::Medium && !record.expired && record.pattern_key == file_path {
                record.expired = true;
            }
        }
        self.collect_expirations()
    }

    pub fn notify_commit(&mut self) -> ExpirySummary {
        for record in self.records.iter_mut() {
            if record.tier == Tier::Medium && !record.expired {
                record.expired = true;
            }
        }
        self.collect_expirations()
    }

    fn collect_expirations(&mut self) -> ExpirySummary {
        let mut summary = ExpirySummary::default();
        for record in self.records.iter_mut() {
            if record.expired {
                continue;
            }
            let ttl_expired = record
                .tier
                .ttl_calls()
                .map(|ttl| self.call_counter.saturating_sub(record.created_at_call) >= ttl)
                .unwrap_or(false);
            if record.superseded || ttl_expired {
                record.expired = true;
            }
        }
        self.records.retain(|r| {
            if r.expired {
                summary.expired_ids.push(r.id.clone());
                summary.token_estimate += r.token_estimate;
                false
            } else {
                true
            }
        });
        summary
    }
}

impl Default for RetentionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_expires_on_next_call() {
        let mut tracker = RetentionTracker::new();
        tracker.record_tool_call("r1", "Edit", "src/main.rs", 10);
        let summary = tracker.record_tool_call("r2", "Edit", "src/lib.rs", 5);
        assert_eq!(summary.expired_ids, vec!["r1".to_string()]);
        assert_eq!(summary.token_estimate, 10);
    }

    #[test]
    fn short_tier_survives_four_calls_then_expires() {
        let mut tracker = RetentionTracker::new();
        tracker.record_tool_call("r1", "Grep", "TODO", 20);
        for i in 0..4 {
            let summary = tracker.record_tool_call(format!("noise{i}"), "Read", "other.rs", 1);
            assert!(!summary.expired_ids.contains(&"r1".to_string()));
        }
        let summary = tracker.record_tool_call("noise5", "Read", "other.rs", 1);
        assert!(summary.expired_ids.contains(&"r1".to_string()));
    }

    #[test]
    fn grep_same_pattern_supersedes() {
        let mut tracker = RetentionTracker::new();
        tracker.record_tool_call("r1", "Grep", "TODO", 20);
        let summary = tracker.record_tool_call("r2", "Grep", "TODO", 25);
        assert_eq!(summary.expired_ids, vec!["r1".to_string()]);
    }

    #[test]
    fn bash_git_commit_is_ephemeral() {
        let mut tracker = RetentionTracker::new();
        tracker.record_tool_call("r1", "Bash", "git commit -m x", 5);
        let summary = tracker.record_tool_call("r2", "Read", "a.rs", 1);
        assert_eq!(summary.expired_ids, vec!["r1".to_string()]);
    }

    #[test]
    fn bash_test_command_is_session_tier() {
        let mut tracker = RetentionTracker::new();
        tracker.record_tool_call("r1", "Bash", "cargo test", 5);
        for i in 0..10 {
            let summary = tracker.record_tool_call(format!("n{i}"), "Read", "a.rs", 1);
            assert!(!summary.expired_ids.contains(&"r1".to_string()));
        }
    }

    #[test]
    fn medium_tier_expires_on_edit_notification() {
        let mut tracker = RetentionTracker::new();
        tracker.record_tool_call("r1", "Read", "a.rs", 50);
        let summary = tracker.notify_edit("a.rs");
        assert_eq!(summary.expired_ids, vec!["r1".to_string()]);
        assert_eq!(summary.token_estimate, 50);
    }

    #[test]
    fn notify_edit_only_expires_the_matching_file() {
        let mut tracker = RetentionTracker::new();
        tracker.record_tool_call("r1", "Read", "a.rs", 50);
        tracker.record_tool_call("r2", "Read", "b.rs", 30);
        let summary = tracker.notify_edit("a.rs");
        assert_eq!(summary.expired_ids, vec!["r1".to_string()]);
        assert_eq!(summary.token_estimate, 50);
    }
}
