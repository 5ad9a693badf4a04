//! Crate-wide error aggregation.
//!
//! Every component owns its own `thiserror` enum and `Result` alias. This
//! module exists for the few call sites that cross component boundaries (the
//! hook dispatch table, the gate engine driving checkpoint rollback) and need
//! a single error type to return.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Structured, agent-facing error: a machine-readable code, a message, and a
/// recovery action the hook runtime can surface to the host as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: String,
    pub message: String,
    pub recovery_action: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Embedding(#[from] crate::embedding::EmbeddingError),
    #[error(transparent)]
    Checkpoint(#[from] crate::checkpoint::CheckpointError),
    #[error(transparent)]
    Knowledge(#[from] crate::knowledge::KnowledgeError),
    #[error(transparent)]
    Gate(#[from] crate::gate::GateError),
    #[error(transparent)]
    Bus(#[from] crate::bus::BusError),
    #[error(transparent)]
    Coordinator(#[from] crate::coordinator::CoordinatorError),
    #[error(transparent)]
    Feedback(#[from] crate::feedback::FeedbackError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Render as the structured form the hook runtime puts in `{"action":"error",...}`.
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::new("POPKIT_INTERNAL_ERROR", self.to_string(), "continue; the host tool call is unaffected")
    }
}
