//! Host ↔ hook wire protocol.
//!
//! Parsed input always yields a [`Context`]; dispatch always yields a
//! [`HookOutput`]. The one invariant that matters more than any other: a
//! thrown error becomes `{"action":"error",...}` on stdout with exit code 0,
//! never a non-zero exit or a panic. Malformed input JSON is the sole
//! exception permitted to exit 1 — there is no Context to report an error
//! through at that point.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    SessionStart,
    Stop,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    pub event: HookEvent,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub tool_error: Option<Value>,
    #[serde(default)]
    pub message_history: Option<Vec<Value>>,
    #[serde(default)]
    pub working_directory: Option<String>,
}

fn default_session_id() -> String {
    "unknown".to_string()
}

impl HookInput {
    /// §4.I step 2: construct the `Context` for this invocation. A missing
    /// `session_id` already defaulted to `"unknown"` at deserialization time.
    pub fn to_context(&self) -> Context {
        Context::create(self.session_id.clone(), self.tool_name.clone(), self.tool_input.clone(), None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Continue,
    Block,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct HookOutput {
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inject_context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

impl HookOutput {
    pub fn continue_(context: Context) -> Self {
        Self { action: Action::Continue, message: None, inject_context: None, context: Some(context) }
    }

    /// `action:"block"` must carry a message per the external interface contract.
    pub fn block(message: impl Into<String>, context: Context) -> Self {
        Self { action: Action::Block, message: Some(message.into()), inject_context: None, context: Some(context) }
    }

    pub fn with_injected_context(mut self, value: Value) -> Self {
        self.inject_context = Some(value);
        self
    }

    /// §4.I step 5: any exception becomes this, exit code 0.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self { action: Action::Error, message: Some(message.to_string()), inject_context: None, context: None }
    }

    /// Same as [`Self::error`] but carries the full structured error (code,
    /// recovery action, retryable flag) in `inject_context` so the host can
    /// act on more than the bare message string.
    pub fn error_structured(err: &crate::error::Error) -> Self {
        let structured = err.to_structured();
        let inject_context = serde_json::to_value(&structured).ok();
        Self { action: Action::Error, message: Some(structured.message), inject_context, context: None }
    }
}

/// Parse raw stdin bytes into a [`HookInput`]. The only call site permitted
/// to translate a failure here into a non-zero process exit.
pub fn parse_input(raw: &str) -> serde_json::Result<HookInput> {
    serde_json::from_str(raw)
}

/// Run `handler` and convert any error it returns into the `{"action":
/// "error", ...}` output shape, matching the catch-all in §4.I step 5.
/// `handler` itself should be written so it never panics; this function
/// only guards against `Result::Err`, not unwinding.
pub fn dispatch<F>(input: &HookInput, handler: F) -> HookOutput
where
    F: FnOnce(&HookInput, Context) -> crate::error::Result<HookOutput>,
{
    dispatch_with_context(input, input.to_context(), handler)
}

/// Same catch-all as [`dispatch`], but takes an already-constructed
/// `Context` instead of building one from `input`. Needed by event handlers
/// that must run async work (e.g. semantic routing) ahead of dispatch and
/// fold its result into the context before the fallible handler body runs.
pub fn dispatch_with_context<F>(input: &HookInput, context: Context, handler: F) -> HookOutput
where
    F: FnOnce(&HookInput, Context) -> crate::error::Result<HookOutput>,
{
    match handler(input, context) {
        Ok(output) => output,
        Err(err) => HookOutput::error_structured(&err),
    }
}

pub fn serialize_output(output: &HookOutput) -> serde_json::Result<String> {
    serde_json::to_string(output)
}

/// §8 scenario 2: `PreToolUse` safety check against sensitive paths. Reads
/// or writes touching dotfile secrets and credential stores are blocked
/// outright; everything else passes. Returns the path that tripped the
/// check, for the block message.
pub fn sensitive_path_check(tool_name: &str, tool_input: &Value) -> Option<String> {
    const SENSITIVE_MARKERS: &[&str] = &[
        ".env", "id_rsa", "id_ed25519", ".ssh/", ".aws/credentials", ".netrc", ".pgpass",
    ];
    if !matches!(tool_name, "Read" | "Edit" | "Write" | "MultiEdit" | "NotebookEdit") {
        return None;
    }
    let path = tool_input
        .get("file_path")
        .or_else(|| tool_input.get("path"))
        .and_then(Value::as_str)?;
    SENSITIVE_MARKERS.iter().find(|marker| path.contains(*marker)).map(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_path_check_blocks_dotenv_reads() {
        let input = serde_json::json!({"file_path": "/home/u/.env"});
        assert_eq!(sensitive_path_check("Read", &input), Some("/home/u/.env".to_string()));
    }

    #[test]
    fn sensitive_path_check_ignores_ordinary_reads() {
        let input = serde_json::json!({"file_path": "/home/u/main.rs"});
        assert_eq!(sensitive_path_check("Read", &input), None);
    }

    #[test]
    fn sensitive_path_check_ignores_non_file_tools() {
        let input = serde_json::json!({"command": "cat .env"});
        assert_eq!(sensitive_path_check("Bash", &input), None);
    }

    #[test]
    fn missing_session_id_defaults_to_unknown() {
        let input: HookInput = serde_json::from_str(r#"{"event":"Stop"}"#).unwrap();
        assert_eq!(input.session_id, "unknown");
    }

    #[test]
    fn dispatch_converts_error_to_error_action_never_panics() {
        let input: HookInput = serde_json::from_str(r#"{"event":"PreToolUse","session_id":"s1"}"#).unwrap();
        let output = dispatch(&input, |_input, _ctx| {
            Err(crate::error::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")))
        });
        assert_eq!(output.action, Action::Error);
        assert!(output.message.unwrap().contains("boom"));
    }

    #[test]
    fn dispatch_with_context_uses_the_supplied_context_not_a_fresh_one() {
        let input: HookInput = serde_json::from_str(r#"{"event":"PreToolUse","session_id":"s1"}"#).unwrap();
        let context = input.to_context().update(crate::context::ContextDelta::hook_output(
            "semantic_router",
            Value::Null,
        ));
        let output = dispatch_with_context(&input, context, |_input, ctx| {
            Ok(HookOutput::continue_(ctx))
        });
        assert!(output.context.unwrap().hook_outputs.contains_key("semantic_router"));
    }

    #[test]
    fn block_action_always_carries_a_message() {
        let context = Context::create("s1", "Bash", Value::Null, None);
        let output = HookOutput::block("dangerous command", context);
        assert_eq!(output.action, Action::Block);
        assert!(output.message.is_some());
    }

    #[test]
    fn output_omits_absent_optional_fields() {
        let output = HookOutput::error("bad input");
        let json = serialize_output(&output).unwrap();
        assert!(!json.contains("inject_context"));
        assert!(!json.contains("\"context\""));
    }
}
