//! Pub/Sub Bus — two interchangeable implementations of one surface:
//! `publish`, `subscribe`, `close`. The file-based ring log is the default;
//! the remote adapter is a thin wrapper over a hosted key-value pub/sub
//! primitive, used only when cloud mode is enabled.

pub mod file_log;
pub mod remote;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Register,
    Checkin,
    State,
    Insight,
    Request,
    Response,
    StreamStart,
    StreamChunk,
    StreamEnd,
    StreamError,
    CourseCorrect,
    PhaseEnter,
    PhaseExit,
    SyncBarrier,
    SyncOk,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub from_agent: String,
    pub to_agent: Option<String>,
    pub payload: Value,
    pub timestamp: String,
}

impl Envelope {
    pub fn new(msg_type: MessageType, from_agent: impl Into<String>, to_agent: Option<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            msg_type,
            from_agent: from_agent.into(),
            to_agent,
            payload,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("remote bus error: {0}")]
    Remote(String),
    #[error("bus is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BusError>;

/// Pulls newly-published envelopes off a set of channels since the last
/// call. Mirrors a file tailer: non-blocking, returns whatever is
/// available right now rather than waiting for more.
pub trait Subscription {
    fn poll(&mut self) -> Result<Vec<Envelope>>;
}

pub enum Bus {
    FileLog(file_log::FileLogBus),
    Remote(remote::RemoteBus),
}

impl Bus {
    pub fn publish(&self, channel: &str, envelope: Envelope) -> Result<()> {
        match self {
            Bus::FileLog(bus) => bus.publish(channel, envelope),
            Bus::Remote(bus) => bus.publish(channel, envelope),
        }
    }

    pub fn subscribe(&self, channels: Vec<String>) -> Box<dyn Subscription> {
        match self {
            Bus::FileLog(bus) => Box::new(bus.subscribe(channels)),
            Bus::Remote(bus) => Box::new(bus.subscribe(channels)),
        }
    }

    pub fn close(&self) -> Result<()> {
        match self {
            Bus::FileLog(bus) => bus.close(),
            Bus::Remote(bus) => bus.close(),
        }
    }
}
