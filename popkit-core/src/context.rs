//! Context Carrier — the immutable value object threaded through every hook.
//!
//! Two constructors only: [`Context::create`] and [`Context::update`].
//! `update` never mutates in place; it returns a new value with the delta
//! applied rather than mutating a shared struct.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::message::Message;

/// A single prior hook's recorded output, keyed by hook name.
pub type HookOutputs = BTreeMap<String, Value>;

/// Delta applied by [`Context::update`]. Only one field is ever set per call
/// by convention, but the struct allows composing both in one update.
#[derive(Debug, Clone, Default)]
pub struct ContextDelta {
    pub message: Option<Message>,
    pub hook_output: Option<(String, Value)>,
}

impl ContextDelta {
    pub fn message(message: Message) -> Self {
        Self { message: Some(message), hook_output: None }
    }

    pub fn hook_output(name: impl Into<String>, value: Value) -> Self {
        Self { message: None, hook_output: Some((name.into(), value)) }
    }
}

/// Immutable snapshot of a hook invocation: the session it belongs to, the
/// tool being invoked, the accumulated message history, and whatever prior
/// hooks recorded. Serialises to canonical JSON (`BTreeMap` keeps hook_outputs
/// ordered; fields are declared in fixed order below) so that a round trip
/// through `serde_json` is byte-identical modulo whitespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Context {
    pub session_id: String,
    pub tool_name: String,
    pub tool_input: Value,
    pub messages: Vec<Message>,
    pub hook_outputs: HookOutputs,
}

impl Context {
    /// Construct a fresh context for a tool invocation. Any additional
    /// metadata the host wants attached rides in `meta` and is merged into
    /// `hook_outputs` under the key `"meta"`.
    pub fn create(
        session_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input: Value,
        meta: Option<Value>,
    ) -> Self {
        let mut hook_outputs = HookOutputs::new();
        if let Some(meta) = meta {
            hook_outputs.insert("meta".to_string(), meta);
        }
        Self {
            session_id: session_id.into(),
            tool_name: tool_name.into(),
            tool_input,
            messages: Vec::new(),
            hook_outputs,
        }
    }

    /// Apply a delta, returning a new `Context`. `message` deltas append;
    /// `hook_output` deltas merge (last write per hook name wins).
    pub fn update(&self, delta: ContextDelta) -> Self {
        let mut next = self.clone();
        if let Some(message) = delta.message {
            next.messages.push(message);
        }
        if let Some((name, value)) = delta.hook_output {
            next.hook_outputs.insert(name, value);
        }
        next
    }

    /// Canonical JSON form: `serde_json`'s struct field order matches
    /// declaration order and `BTreeMap` keys sort lexicographically, so this
    /// is stable across processes without a custom serializer.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
