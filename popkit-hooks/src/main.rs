//! popkit-hooks — the hook runtime binary.
//!
//! Reads exactly one JSON hook event on stdin, writes exactly one JSON
//! decision on stdout, and exits 0. This process never propagates a
//! non-zero exit to the host except when the input itself cannot be parsed
//! as JSON, which is the one permitted exception.
//!
//! State that must survive across the process-per-invocation protocol (the
//! quality-gate engine's edit counters, the retention tracker) is persisted
//! as a small JSON snapshot under `.claude/popkit/sessions/<id>/state.json`
//! and reloaded at the top of the next invocation.

use std::io::Read;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use popkit_core::checkpoint::{CheckpointManager, CheckpointTrigger};
use popkit_core::context::ContextDelta;
use popkit_core::gate::{self, FailureAction, GateOverrides, QualityGateEngine, ToolEventKind};
use popkit_core::hook::{self, HookEvent, HookInput, HookOutput};
use popkit_core::retention::RetentionTracker;
use popkit_core::router::fallback::AgentMatcher;
use popkit_core::router::provider::EmbeddingProvider;
use popkit_core::router::SemanticRouter;
use popkit_core::Config;

/// Everything the hook binary needs to remember between invocations for one
/// session. Both fields are cheap to serialise and small enough to read and
/// rewrite on every call without becoming the bottleneck.
#[derive(Default, Serialize, Deserialize)]
struct SessionState {
    retention: Option<RetentionTracker>,
    gate: Option<QualityGateEngine>,
    tool_calls_total: u64,
}

impl SessionState {
    fn path(config: &Config, session_id: &str) -> PathBuf {
        config.hook_session_dir(session_id).join("state.json")
    }

    fn load(config: &Config, session_id: &str) -> Self {
        let path = Self::path(config, session_id);
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save(&self, config: &Config, session_id: &str) {
        let path = Self::path(config, session_id);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(component = "hook_runtime", reason = %e, "could not create session state dir");
                return;
            }
        }
        match serde_json::to_string(self) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&path, raw) {
                    warn!(component = "hook_runtime", reason = %e, "could not persist session state");
                }
            }
            Err(e) => warn!(component = "hook_runtime", reason = %e, "could not serialise session state"),
        }
    }
}

/// Minimal built-in keyword matrix consulted until a project supplies its
/// own agent registry; keeps routing useful with zero configuration.
fn default_matchers() -> Vec<AgentMatcher> {
    vec![
        AgentMatcher {
            agent_id: "security-auditor".into(),
            keywords: vec!["security".into(), "vulnerability".into(), "exploit".into(), "injection".into()],
            file_patterns: vec![],
            error_names: vec![],
        },
        AgentMatcher {
            agent_id: "rust-fixer".into(),
            keywords: vec!["borrow checker".into(), "lifetime".into()],
            file_patterns: vec!["*.rs".into()],
            error_names: vec!["E0502".into(), "E0382".into()],
        },
        AgentMatcher {
            agent_id: "ts-fixer".into(),
            keywords: vec!["type error".into()],
            file_patterns: vec!["*.ts".into(), "*.tsx".into()],
            error_names: vec![],
        },
    ]
}

fn tool_event_kind(tool_name: &str) -> Option<ToolEventKind> {
    match tool_name {
        "Write" => Some(ToolEventKind::Write),
        "Edit" => Some(ToolEventKind::Edit),
        "MultiEdit" => Some(ToolEventKind::MultiEdit),
        "Delete" => Some(ToolEventKind::Delete),
        _ => None,
    }
}

fn edit_path(tool_input: &Value) -> String {
    tool_input
        .get("file_path")
        .or_else(|| tool_input.get("path"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn edit_text(tool_input: &Value) -> String {
    tool_input
        .get("new_string")
        .or_else(|| tool_input.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Rough token estimate: four characters per token, the same heuristic used
/// elsewhere for budget accounting without actually tokenising.
fn token_estimate(value: &Value) -> u64 {
    (value.to_string().len() as u64 / 4).max(1)
}

fn retention_pattern_key(tool_name: &str, tool_input: &Value) -> String {
    match tool_name {
        "Grep" => tool_input.get("pattern").and_then(Value::as_str).unwrap_or_default().to_string(),
        "Glob" => tool_input.get("pattern").and_then(Value::as_str).unwrap_or_default().to_string(),
        "Bash" => tool_input.get("command").and_then(Value::as_str).unwrap_or_default().to_string(),
        _ => edit_path(tool_input),
    }
}

fn handle_session_start(
    config: &Config,
    input: &HookInput,
    context: popkit_core::Context,
) -> popkit_core::error::Result<HookOutput> {
    let checkpoints_dir = config.checkpoints_dir();
    let pruned = gate::rollback::prune_old_patches(&checkpoints_dir, None)
        .map_err(gate::GateError::from)?;
    if pruned > 0 {
        info!(component = "checkpoint", pruned, "pruned stale rollback patches past retention window");
    }
    let context = context.update(ContextDelta::hook_output(
        "session_start",
        json!({ "working_directory": input.working_directory, "pruned_patches": pruned }),
    ));
    Ok(HookOutput::continue_(context))
}

fn handle_pre_tool_use(
    input: &HookInput,
    context: popkit_core::Context,
) -> popkit_core::error::Result<HookOutput> {
    if let Some(path) = hook::sensitive_path_check(&input.tool_name, &input.tool_input) {
        let context = context.update(ContextDelta::hook_output(
            "pre_tool_use",
            json!({ "safety_check": { "passed": false, "path": path } }),
        ));
        return Ok(HookOutput::block(format!("refusing to access sensitive path: {path}"), context));
    }

    let context = context.update(ContextDelta::hook_output(
        "pre_tool_use",
        json!({ "safety_check": { "passed": true } }),
    ));
    Ok(HookOutput::continue_(context))
}

/// Build the `inject_context` payload for a failed gate run: the formatted
/// diagnostics list the default `fix` action re-injects into the next turn.
fn gate_failure_context(run: &gate::GateRun) -> Value {
    let failing: Vec<Value> = run
        .outcomes
        .iter()
        .filter(|o| !o.passed)
        .map(|o| {
            json!({
                "gate": o.name,
                "diagnostics": o.diagnostics.iter().map(|d| json!({
                    "file": d.file,
                    "line": d.line,
                    "column": d.column,
                    "code": d.code,
                    "message": d.message,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "quality_gate_failures": failing })
}

fn maybe_checkpoint(
    config: &Config,
    trigger: CheckpointTrigger,
    context: &popkit_core::Context,
) -> popkit_core::error::Result<()> {
    let mut manager = CheckpointManager::new(&config.working_directory, config.max_checkpoints);
    let snapshot = json!({ "hook_outputs": context.hook_outputs, "session_id": context.session_id });
    manager.create_auto(trigger, snapshot)?;
    Ok(())
}

fn handle_post_tool_use(
    config: &Config,
    input: &HookInput,
    mut context: popkit_core::Context,
    state: &mut SessionState,
) -> popkit_core::error::Result<HookOutput> {
    state.tool_calls_total += 1;

    let retention = state.retention.get_or_insert_with(RetentionTracker::new);
    let pattern_key = retention_pattern_key(&input.tool_name, &input.tool_input);
    let estimate = input
        .tool_result
        .as_ref()
        .or(input.tool_error.as_ref())
        .map(token_estimate)
        .unwrap_or(1);
    let record_id = format!("{}:{}", input.session_id, state.tool_calls_total);
    let expiry = retention.record_tool_call(record_id, input.tool_name.clone(), pattern_key, estimate);
    context = context.update(ContextDelta::hook_output(
        "retention",
        json!({ "expired_ids": expiry.expired_ids, "expired_tokens": expiry.token_estimate }),
    ));

    let Some(kind) = tool_event_kind(&input.tool_name) else {
        if input.tool_name == "Bash" {
            if let Some(command) = input.tool_input.get("command").and_then(Value::as_str) {
                if command.contains("git commit") || command.contains("git push") {
                    retention.notify_commit();
                    if command.contains("git push") {
                        maybe_checkpoint(config, CheckpointTrigger::CommitPushed, &context)?;
                    }
                }
            }
        }
        return Ok(HookOutput::continue_(context));
    };

    let path = edit_path(&input.tool_input);
    retention.notify_edit(&path);

    let gate_engine = state
        .gate
        .get_or_insert_with(|| QualityGateEngine::new(config.working_directory.clone(), &GateOverrides::default()));
    let (immediate, batched) = gate_engine.record_edit(kind, &path, &edit_text(&input.tool_input));

    if !immediate && !batched {
        return Ok(HookOutput::continue_(context));
    }

    // A `GateRun` whose gates failed is not an internal error — it's the
    // documented failure menu (§4.H) and stays a `continue` with injected
    // diagnostics. An `Err` here means the engine itself malfunctioned
    // (state transition / rollback plumbing), which does propagate.
    let run = gate_engine.run()?;
    if run.all_passed {
        if run.outcomes.iter().any(|o| o.name == "test") {
            maybe_checkpoint(config, CheckpointTrigger::TestPassed, &context)?;
        }
        context = context.update(ContextDelta::hook_output("quality_gate", json!({ "passed": true })));
        return Ok(HookOutput::continue_(context));
    }

    let failure_context = gate_failure_context(&run);
    gate_engine.apply_action(FailureAction::Fix, &config.checkpoints_dir(), "gate failure")?;
    context = context.update(ContextDelta::hook_output(
        "quality_gate",
        json!({ "passed": false, "action": "fix" }),
    ));
    Ok(HookOutput::continue_(context).with_injected_context(failure_context))
}

fn handle_stop(context: popkit_core::Context) -> popkit_core::error::Result<HookOutput> {
    Ok(HookOutput::continue_(context))
}

/// Best-effort semantic routing for `Task`-shaped tool calls carrying a
/// free-text `prompt`/`description`. Never blocks: embedding failures fall
/// through to keywords, and keyword misses fall through to the default
/// agent inside `SemanticRouter::route` itself.
async fn maybe_route(config: &Config, input: &HookInput, context: popkit_core::Context) -> popkit_core::Context {
    if input.tool_name != "Task" {
        return context;
    }
    let Some(query) = input
        .tool_input
        .get("prompt")
        .or_else(|| input.tool_input.get("description"))
        .and_then(Value::as_str)
    else {
        return context;
    };

    let store = popkit_core::embedding::EmbeddingStore::open(config.knowledge_dir().join("index"))
        .unwrap_or_else(|_| popkit_core::embedding::EmbeddingStore::in_memory());
    let provider = if config.cloud_enabled {
        config.embedding_api_key.clone().map(|key| {
            EmbeddingProvider::new(
                config.cloud_url.clone().unwrap_or_else(|| "https://api.voyageai.com/v1/embeddings".to_string()),
                key,
            )
        })
    } else {
        None
    };
    let mut router = SemanticRouter::new(provider, default_matchers(), "generalist");
    let hits = router.route(&store, query, 3, None).await;

    context.update(ContextDelta::hook_output(
        "semantic_router",
        json!({ "hits": hits.iter().map(|h| json!({
            "agent_id": h.agent_id, "score": h.score, "reason": h.reason,
        })).collect::<Vec<_>>() }),
    ))
}

/// Every event funnels through [`hook::dispatch_with_context`], so any
/// internal component error any handler returns lands in exactly one place
/// — `{"action":"error",...}` with the structured `{code, message,
/// recovery_action}` triple, never a bare `warn!()` plus a silent
/// downgrade to `continue`.
async fn run(config: &Config, input: HookInput) -> HookOutput {
    let context = input.to_context();

    match input.event {
        HookEvent::SessionStart => {
            hook::dispatch_with_context(&input, context, |input, ctx| handle_session_start(config, input, ctx))
        }
        HookEvent::PreToolUse => {
            let context = maybe_route(config, &input, context).await;
            hook::dispatch_with_context(&input, context, |input, ctx| handle_pre_tool_use(input, ctx))
        }
        HookEvent::PostToolUse => {
            let mut state = SessionState::load(config, &input.session_id);
            let output = hook::dispatch_with_context(&input, context, |input, ctx| {
                handle_post_tool_use(config, input, ctx, &mut state)
            });
            state.save(config, &input.session_id);
            output
        }
        HookEvent::Stop => hook::dispatch_with_context(&input, context, |_input, ctx| handle_stop(ctx)),
    }
}

fn write_output(output: &HookOutput) {
    match hook::serialize_output(output) {
        Ok(json) => println!("{json}"),
        Err(e) => println!("{{\"action\":\"error\",\"message\":\"failed to serialise output: {e}\"}}"),
    }
}

fn read_stdin() -> std::io::Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let raw = match read_stdin() {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("failed to read stdin: {e}");
            std::process::exit(1);
        }
    };

    let input = match hook::parse_input(&raw) {
        Ok(input) => input,
        Err(e) => {
            // The sole case permitted a non-zero exit — there is no Context
            // yet to report the error through.
            write_output(&HookOutput::error(format!("invalid hook input: {e}")));
            std::process::exit(1);
        }
    };

    let mut config = Config::from_env();
    if let Some(dir) = &input.working_directory {
        config.working_directory = PathBuf::from(dir);
    }

    let output = run(&config, input).await;
    write_output(&output);
}
