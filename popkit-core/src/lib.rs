//! popkit-core
//!
//! The shared runtime behind the popkit hook toolchain: a hook-event data
//! model, a quality-gate engine with deterministic rollback, a semantic
//! router over an embedding-backed knowledge store, a checkpoint manager,
//! a retention tracker for conversation history, a pub/sub bus wiring a
//! multi-agent coordinator together, and the feedback store behind
//! in-product surveys.
//!
//! `popkit-hooks` is the thin binary that links this crate into the
//! host assistant's hook protocol; everything in here is usable
//! standalone by any other host that speaks the same JSON shapes.

#![allow(clippy::uninlined_format_args)]

pub mod bus;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod feedback;
pub mod gate;
pub mod heartbeat;
pub mod hook;
pub mod knowledge;
pub mod message;
pub mod platform;
pub mod retention;
pub mod router;
pub mod shell_safety;

pub use config::Config;
pub use context::{Context, ContextDelta};
pub use error::{Error, Result, StructuredError};
pub use hook::{
    dispatch, parse_input, sensitive_path_check, serialize_output, Action, HookEvent, HookInput, HookOutput,
};
pub use message::{Block, HistoryRecord, Message, Role};
