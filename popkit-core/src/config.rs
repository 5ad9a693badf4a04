//! Process-wide configuration, read once at startup.
//!
//! Defaults first, env vars override, paths resolved relative to the
//! working directory. Nothing outside this module touches `std::env` —
//! hook bodies receive `Config` by reference and never read ambient state
//! themselves.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project root; `.claude/` state directories resolve under here.
    pub working_directory: PathBuf,
    /// Whether the remote pub/sub + embedding-provider path is enabled.
    pub cloud_enabled: bool,
    /// Relaxes timeouts and enables verbose gate output.
    pub dev_mode: bool,
    /// Base URL for the remote key-value pub/sub backend, when cloud_enabled.
    pub cloud_url: Option<String>,
    /// Bearer token / API key for the embedding provider, if any.
    pub embedding_api_key: Option<String>,
    /// Maximum rolling checkpoints retained (spec default: 20).
    pub max_checkpoints: usize,
    /// Gate subprocess timeout in seconds.
    pub gate_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            cloud_enabled: true,
            dev_mode: false,
            cloud_url: None,
            embedding_api_key: None,
            max_checkpoints: 20,
            gate_timeout_secs: 120,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("POPKIT_WORKING_DIR") {
            config.working_directory = PathBuf::from(dir);
        }
        if let Ok(val) = std::env::var("POPKIT_CLOUD_ENABLED") {
            config.cloud_enabled = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("POPKIT_DEV_MODE") {
            config.dev_mode = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(url) = std::env::var("POPKIT_CLOUD_URL") {
            config.cloud_url = Some(url);
        }
        if let Ok(key) = std::env::var("POPKIT_EMBEDDING_API_KEY") {
            config.embedding_api_key = Some(key);
        }
        if let Ok(n) = std::env::var("POPKIT_MAX_CHECKPOINTS") {
            if let Ok(n) = n.parse() {
                config.max_checkpoints = n;
            }
        }
        if let Ok(n) = std::env::var("POPKIT_GATE_TIMEOUT_SECS") {
            if let Ok(n) = n.parse() {
                config.gate_timeout_secs = n;
            }
        }

        config
    }

    pub fn state_dir(&self) -> PathBuf {
        self.working_directory.join(".claude")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.state_dir().join("checkpoints")
    }

    pub fn knowledge_dir(&self) -> PathBuf {
        self.state_dir().join("knowledge")
    }

    pub fn heartbeats_dir(&self) -> PathBuf {
        self.state_dir().join("popkit").join("heartbeats")
    }

    /// Where the hook runtime persists one session's gate/retention state
    /// between process-per-invocation calls. Not read by anything else.
    pub fn hook_session_dir(&self, session_id: &str) -> PathBuf {
        self.state_dir().join("popkit").join("sessions").join(session_id)
    }
}
