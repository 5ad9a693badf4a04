//! Message Composer — pure functions over conversation message blocks.
//!
//! No state, no I/O. A `Message` carries a role and an ordered list of typed
//! content blocks; composing and rebuilding conversations is just list
//! manipulation and validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A single content block within a message. Tagged by `type` so the wire
/// representation matches what the host's conversation format expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { id: String, content: String, #[serde(default)] is_error: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<Block>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ComposeError {
    #[error("message at index {0} has no content blocks")]
    EmptyContent(usize),
    #[error("tool_result at index {0} has no matching tool_use id {1}")]
    DanglingToolResult(usize, String),
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![Block::Text { text: content.into() }] }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: vec![Block::Text { text: content.into() }] }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![Block::ToolUse { id: id.into(), name: name.into(), input }],
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            role: Role::User,
            content: vec![Block::ToolResult { id: id.into(), content: content.into(), is_error }],
        }
    }

    pub fn extract_tool_use(&self) -> Option<(&str, &str, &Value)> {
        self.content.iter().find_map(|block| match block {
            Block::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }
}

/// Validate role/content invariants and return the list unchanged.
pub fn compose(messages: Vec<Message>) -> Result<Vec<Message>, ComposeError> {
    let tool_use_ids: std::collections::HashSet<&str> = messages
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|b| match b {
            Block::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();

    for (i, message) in messages.iter().enumerate() {
        if message.content.is_empty() {
            return Err(ComposeError::EmptyContent(i));
        }
        for block in &message.content {
            if let Block::ToolResult { id, .. } = block {
                if !tool_use_ids.contains(id.as_str()) {
                    return Err(ComposeError::DanglingToolResult(i, id.clone()));
                }
            }
        }
    }

    Ok(messages)
}

/// Merge all `tool_use` blocks across a batch of assistant messages into a
/// single assistant message, preserving relative order.
pub fn merge_tool_uses(messages: &[Message]) -> Message {
    let content = messages
        .iter()
        .flat_map(|m| m.content.iter().cloned())
        .filter(|b| matches!(b, Block::ToolUse { .. }))
        .collect();
    Message { role: Role::Assistant, content }
}

/// Merge all `tool_result` blocks into a single user message, preserving order.
pub fn merge_tool_results(messages: &[Message]) -> Message {
    let content = messages
        .iter()
        .flat_map(|m| m.content.iter().cloned())
        .filter(|b| matches!(b, Block::ToolResult { .. }))
        .collect();
    Message { role: Role::User, content }
}

/// Input to [`rebuild_from_history`]: the minimal record needed to
/// reconstruct a conversation after an interruption.
pub struct HistoryRecord {
    pub user_prompt: String,
    pub tool_uses: Vec<Message>,
    pub tool_results: Vec<Message>,
}

/// The canonical retry path: emit at most three messages, in order
/// user → assistant(tool_uses) → user(tool_results). Empty tool histories are
/// simply omitted rather than emitted as empty messages.
pub fn rebuild_from_history(record: HistoryRecord) -> Vec<Message> {
    let mut out = vec![Message::user(record.user_prompt)];
    if !record.tool_uses.is_empty() {
        out.push(merge_tool_uses(&record.tool_uses));
    }
    if !record.tool_results.is_empty() {
        out.push(merge_tool_results(&record.tool_results));
    }
    out
}
