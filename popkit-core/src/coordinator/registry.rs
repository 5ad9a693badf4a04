//! Agent registry — the coordinator's arena of [`AgentState`]s, keyed by
//! `agent_id`. Agents never hold references to each other, only ids; the
//! registry is the single owner, matching the "arena + index" strategy for
//! the coordinator/agent/bus cyclic-reference shape (§9).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_IDLE_GC_SECS: i64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Idle,
    Stuck,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub session_id: String,
    pub role: Option<String>,
    pub capabilities: Vec<String>,
    pub phase: Option<String>,
    pub files_touched: Vec<String>,
    pub tools_used: HashMap<String, u64>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: AgentStatus,
    pub tool_calls_total: u64,
}

impl AgentState {
    fn new(agent_id: String, session_id: String, role: Option<String>, capabilities: Vec<String>) -> Self {
        Self {
            agent_id,
            session_id,
            role,
            capabilities,
            phase: None,
            files_touched: Vec::new(),
            tools_used: HashMap::new(),
            last_heartbeat: Utc::now(),
            status: AgentStatus::Active,
            tool_calls_total: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentState>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self { agents: HashMap::new() }
    }

    /// `REGISTER`: any agent declares itself; re-registering an existing
    /// `agent_id` resets its bookkeeping but keeps `Active` status.
    pub fn register(
        &mut self,
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        role: Option<String>,
        capabilities: Vec<String>,
    ) -> &AgentState {
        let agent_id = agent_id.into();
        let state = AgentState::new(agent_id.clone(), session_id.into(), role, capabilities);
        self.agents.insert(agent_id.clone(), state);
        self.agents.get(&agent_id).expect("just inserted")
    }

    /// `CHECKIN`: update counters and refresh liveness. Returns the updated
    /// state, or `None` if the agent never registered.
    pub fn checkin(
        &mut self,
        agent_id: &str,
        tool_name: Option<&str>,
        file_touched: Option<&str>,
    ) -> Option<&AgentState> {
        let agent = self.agents.get_mut(agent_id)?;
        agent.tool_calls_total += 1;
        agent.last_heartbeat = Utc::now();
        if agent.status != AgentStatus::Stuck {
            agent.status = AgentStatus::Active;
        }
        if let Some(tool_name) = tool_name {
            *agent.tools_used.entry(tool_name.to_string()).or_insert(0) += 1;
        }
        if let Some(file) = file_touched {
            if !agent.files_touched.iter().any(|f| f == file) {
                agent.files_touched.push(file.to_string());
            }
        }
        self.agents.get(agent_id)
    }

    pub fn mark_phase(&mut self, agent_id: &str, phase: impl Into<String>) {
        if let Some(agent) = self.agents.get_mut(agent_id) {
            agent.phase = Some(phase.into());
        }
    }

    pub fn mark_stuck(&mut self, agent_id: &str) {
        if let Some(agent) = self.agents.get_mut(agent_id) {
            agent.status = AgentStatus::Stuck;
        }
    }

    pub fn mark_completed(&mut self, agent_id: &str) {
        if let Some(agent) = self.agents.get_mut(agent_id) {
            agent.status = AgentStatus::Completed;
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentState> {
        self.agents.get(agent_id)
    }

    pub fn active_agent_ids(&self) -> Vec<String> {
        self.agents
            .values()
            .filter(|a| a.status == AgentStatus::Active || a.status == AgentStatus::Stuck)
            .map(|a| a.agent_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Garbage-collect agents idle past `idle_secs` (default 1800s), unless
    /// they are `Stuck` — a stuck agent is never silently dropped.
    pub fn garbage_collect(&mut self, idle_secs: Option<i64>) -> Vec<String> {
        let threshold = idle_secs.unwrap_or(DEFAULT_IDLE_GC_SECS);
        let now = Utc::now();
        let expired: Vec<String> = self
            .agents
            .values()
            .filter(|a| a.status != AgentStatus::Stuck && (now - a.last_heartbeat).num_seconds() > threshold)
            .map(|a| a.agent_id.clone())
            .collect();
        for id in &expired {
            self.agents.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_checkin_updates_counters() {
        let mut registry = AgentRegistry::new();
        registry.register("a1", "s1", Some("coder".to_string()), vec!["rust".to_string()]);
        registry.checkin("a1", Some("Edit"), Some("main.rs"));
        let agent = registry.get("a1").unwrap();
        assert_eq!(agent.tool_calls_total, 1);
        assert_eq!(agent.tools_used.get("Edit"), Some(&1));
        assert_eq!(agent.files_touched, vec!["main.rs".to_string()]);
    }

    #[test]
    fn checkin_on_unregistered_agent_is_none() {
        let mut registry = AgentRegistry::new();
        assert!(registry.checkin("ghost", None, None).is_none());
    }

    #[test]
    fn stuck_agents_survive_garbage_collection() {
        let mut registry = AgentRegistry::new();
        registry.register("a1", "s1", None, vec![]);
        registry.mark_stuck("a1");
        registry.agents.get_mut("a1").unwrap().last_heartbeat = Utc::now() - chrono::Duration::seconds(10_000);
        let collected = registry.garbage_collect(Some(1800));
        assert!(collected.is_empty());
        assert!(registry.get("a1").is_some());
    }

    #[test]
    fn idle_agents_are_garbage_collected_past_threshold() {
        let mut registry = AgentRegistry::new();
        registry.register("a1", "s1", None, vec![]);
        registry.agents.get_mut("a1").unwrap().last_heartbeat = Utc::now() - chrono::Duration::seconds(10_000);
        let collected = registry.garbage_collect(Some(300));
        assert_eq!(collected, vec!["a1".to_string()]);
        assert!(registry.get("a1").is_none());
    }

    #[test]
    fn checkin_does_not_clear_stuck_status() {
        let mut registry = AgentRegistry::new();
        registry.register("a1", "s1", None, vec![]);
        registry.mark_stuck("a1");
        registry.checkin("a1", Some("Read"), None);
        assert_eq!(registry.get("a1").unwrap().status, AgentStatus::Stuck);
    }
}
