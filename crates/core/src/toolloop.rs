//! Tool-call loop (§4.D): envelope parsing, bounded multi-round tool
//! execution with caching, concurrent read-only dispatch, and the
//! hard-evidence gate.
//!
//! Grounded directly on `runtime/turn.rs::run_turn_inner`'s round structure:
//! advertise tool defs, call the model, assemble pending calls, dispatch
//! concurrently via `join_all`, append tool results, loop.

use crate::tools::{PolicyCode, PolicyDecision, ToolContext, ToolPolicy, ToolRegistry};
use agentrt_domain::collab::{ChatRequest, LlmClient};
use agentrt_domain::config::ToolConfig;
use agentrt_domain::error::{sentinels, Result};
use agentrt_domain::tool::{EnvelopeKind, Message, RiskClass, ToolCallEnvelope, ToolDefinition, ToolResult};
use agentrt_domain::trace::TraceEvent;
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_CACHE_CAPACITY: usize = 256;

pub struct ToolLoopOutcome {
    pub reply_text: String,
    pub tools_executed: bool,
    pub rounds_completed: u32,
    pub tool_results: Vec<ToolResult>,
    pub policy_decisions: Vec<(String, PolicyDecision)>,
    pub deduplicated_call_count: u32,
    pub events: Vec<TraceEvent>,
}

/// Strip a single layer of optional ```json ... ``` (or bare ``` ... ```)
/// fencing, trimming whitespace. Shared with the critic loop's lenient
/// JSON parsing (§4.F note).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub(crate) fn parse_envelope(text: &str) -> Option<ToolCallEnvelope> {
    let candidate = strip_code_fence(text);
    let envelope: ToolCallEnvelope = serde_json::from_str(candidate).ok()?;
    matches!(envelope.kind, EnvelopeKind::ToolCalls).then_some(envelope)
}

pub(crate) fn looks_like_envelope_attempt(text: &str) -> bool {
    let trimmed = strip_code_fence(text);
    let starts_structured = trimmed.starts_with('{') || trimmed.starts_with('[');
    starts_structured && (trimmed.contains("\"type\"") || trimmed.contains("\"name\"") || trimmed.contains("\"calls\""))
}

/// Recursively sorts object keys so `name::stable_stringify(args)` is a
/// stable cache key regardless of the model's key emission order. Arrays
/// keep their declared order (§4.D).
pub fn stable_stringify(value: &Value) -> String {
    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut sorted = serde_json::Map::new();
                for (k, v) in entries {
                    sorted.insert(k.clone(), canonicalize(v));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }
    canonicalize(value).to_string()
}

fn cache_key(name: &str, args: &Value) -> String {
    format!("{name}::{}", stable_stringify(args))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push_str("...(truncated)");
        out
    }
}

/// `run` (§4.D contract): drives the round loop to completion and returns
/// the final reply plus a full audit trail of tool activity.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    client: &dyn LlmClient,
    model: &str,
    mut messages: Vec<Message>,
    registry: &ToolRegistry,
    policy: &ToolPolicy,
    ctx: &ToolContext,
    config: &ToolConfig,
) -> Result<ToolLoopOutcome> {
    let mut events = Vec::new();
    let mut all_results: Vec<ToolResult> = Vec::new();
    let mut all_decisions: Vec<(String, PolicyDecision)> = Vec::new();
    let mut deduplicated_call_count: u32 = 0;
    let mut cache: LruCache<String, ToolResult> =
        LruCache::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap());

    let advertised: Vec<ToolDefinition> = registry
        .definitions()
        .into_iter()
        .filter(|d| policy.allowed_for_route(&ctx.route, &d.name))
        .collect();

    let mut rounds_completed: u32 = 0;
    let mut retried_ambiguous = false;

    for round in 1..=config.max_rounds {
        rounds_completed = round;
        let response = client
            .chat(ChatRequest {
                model: model.to_string(),
                messages: messages.clone(),
                tools: advertised.clone(),
                temperature: Some(0.2),
                max_tokens: None,
            })
            .await?;

        let envelope = match parse_envelope(&response.content) {
            Some(env) => Some(env),
            None if looks_like_envelope_attempt(&response.content) && !retried_ambiguous => {
                retried_ambiguous = true;
                messages.push(Message::assistant(&response.content));
                messages.push(Message::user(
                    "Your last message looked like it was attempting a tool-call envelope but did \
                     not parse. Respond with EITHER a valid `{\"type\":\"tool_calls\",\"calls\":[...]}` \
                     JSON object, or plain text with no JSON if you are not calling a tool.",
                ));
                continue;
            }
            None => None,
        };

        let Some(envelope) = envelope else {
            return Ok(ToolLoopOutcome {
                reply_text: response.content,
                tools_executed: round > 1,
                rounds_completed: round,
                tool_results: all_results,
                policy_decisions: all_decisions,
                deduplicated_call_count,
                events,
            });
        };

        let max_calls = config.max_calls_per_round as usize;
        let (calls, truncated) = if envelope.calls.len() > max_calls {
            let (kept, dropped) = envelope.calls.split_at(max_calls);
            (kept.to_vec(), dropped.to_vec())
        } else {
            (envelope.calls.clone(), Vec::new())
        };
        for dropped in &truncated {
            all_decisions.push((
                dropped.name.clone(),
                PolicyDecision { allowed: false, code: PolicyCode::MaxCallsPerRoundTruncated },
            ));
        }

        let mut read_only_calls = Vec::new();
        let mut mutating_calls = Vec::new();
        let mut synchronous_results: Vec<ToolResult> = Vec::new();

        for call in &calls {
            let call_id = uuid::Uuid::new_v4().to_string();
            let def_class = registry.get(&call.name).map(|d| d.risk_class).unwrap_or(RiskClass::Benign);
            let decision = policy.evaluate(&call.name, def_class);
            events.push(TraceEvent::ToolPolicyDecision {
                trace_id: ctx.trace_id.clone(),
                tool_name: call.name.clone(),
                code: decision.code.as_str().to_string(),
            });
            all_decisions.push((call.name.clone(), decision));

            if !decision.allowed {
                synchronous_results.push(ToolResult {
                    call_id,
                    tool_name: call.name.clone(),
                    args: call.args.clone(),
                    success: false,
                    output: None,
                    error: Some(decision.code.as_str().to_string()),
                    deduplicated: false,
                });
                continue;
            }

            let validated = match registry.validate_call(&call.name, &call.args) {
                Ok(v) => v,
                Err(e) => {
                    synchronous_results.push(ToolResult {
                        call_id,
                        tool_name: call.name.clone(),
                        args: call.args.clone(),
                        success: false,
                        output: None,
                        error: Some(e.to_string()),
                        deduplicated: false,
                    });
                    continue;
                }
            };

            let key = cache_key(&call.name, &validated.args);
            if let Some(cached) = cache.get(&key) {
                let mut reused = cached.clone();
                reused.call_id = call_id;
                reused.deduplicated = true;
                deduplicated_call_count += 1;
                synchronous_results.push(reused);
                continue;
            }

            let effective_class = policy.effective_risk_class(&call.name, def_class);
            if config.parallel_read_only_enabled && effective_class.is_read_only() {
                read_only_calls.push((call_id, call.name.clone(), validated.args, key));
            } else {
                mutating_calls.push((call_id, call.name.clone(), validated.args, key));
            }
        }

        for chunk in read_only_calls.chunks(config.max_parallel_read_only.max(1)) {
            let futures = chunk.iter().map(|(call_id, name, args, _)| {
                execute_one(registry, name, args, ctx, config.timeout_ms, call_id)
            });
            let results = futures_util::future::join_all(futures).await;
            for ((_, _, _, key), result) in chunk.iter().zip(results) {
                cache_if_success(&mut cache, key, &result);
                synchronous_results.push(result);
            }
        }

        for (call_id, name, args, key) in &mutating_calls {
            let result = execute_one(registry, name, args, ctx, config.timeout_ms, call_id).await;
            cache_if_success(&mut cache, key, &result);
            synchronous_results.push(result);
        }

        for result in &synchronous_results {
            events.push(TraceEvent::ToolExecuted {
                trace_id: ctx.trace_id.clone(),
                tool_name: result.tool_name.clone(),
                success: result.success,
                cache_hit: result.deduplicated,
                duration_ms: 0,
            });
        }

        messages.push(Message::assistant(&response.content));
        for result in &synchronous_results {
            let args_summary = truncate(&result.args.to_string(), config.result_max_chars);
            let outcome_summary = if result.success {
                truncate(result.output.as_deref().unwrap_or(""), config.result_max_chars)
            } else {
                format!("error: {}", result.error.as_deref().unwrap_or("unknown"))
            };
            messages.push(Message::tool_result(
                format!("{}:{}", result.tool_name, &result.call_id[..8.min(result.call_id.len())]),
                format!("args: {args_summary}\nresult: {outcome_summary}"),
            ));
        }

        events.push(TraceEvent::ToolLoopRoundCompleted {
            trace_id: ctx.trace_id.clone(),
            round,
            tools_executed: !synchronous_results.is_empty(),
        });
        all_results.extend(synchronous_results);
    }

    // maxRounds exhausted and the model is still trying to call tools: one
    // finalization pass with no tools advertised.
    let finalization = client
        .chat(ChatRequest {
            model: model.to_string(),
            messages: messages.clone(),
            tools: Vec::new(),
            temperature: Some(0.2),
            max_tokens: None,
        })
        .await?;

    let reply_text = if parse_envelope(&finalization.content).is_some()
        || looks_like_envelope_attempt(&finalization.content)
    {
        sentinels::TOOL_LOOP_FINALIZATION_FAILURE.to_string()
    } else {
        finalization.content
    };

    Ok(ToolLoopOutcome {
        reply_text,
        tools_executed: true,
        rounds_completed,
        tool_results: all_results,
        policy_decisions: all_decisions,
        deduplicated_call_count,
        events,
    })
}

async fn execute_one(
    registry: &ToolRegistry,
    name: &str,
    args: &Value,
    ctx: &ToolContext,
    timeout_ms: u64,
    call_id: &str,
) -> ToolResult {
    let Some(executor) = registry.executor(name) else {
        return ToolResult {
            call_id: call_id.to_string(),
            tool_name: name.to_string(),
            args: args.clone(),
            success: false,
            output: None,
            error: Some(format!("no executor registered for tool '{name}'")),
            deduplicated: false,
        };
    };

    let call = executor.execute(args.clone(), ctx);
    let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), call).await;
    match outcome {
        Ok(result) => ToolResult {
            call_id: call_id.to_string(),
            tool_name: name.to_string(),
            args: args.clone(),
            success: result.success,
            output: result.output,
            error: result.error,
            deduplicated: false,
        },
        Err(_elapsed) => ToolResult {
            call_id: call_id.to_string(),
            tool_name: name.to_string(),
            args: args.clone(),
            success: false,
            output: None,
            error: Some(format!("timeout after {timeout_ms}ms")),
            deduplicated: false,
        },
    }
}

fn cache_if_success(cache: &mut LruCache<String, ToolResult>, key: &str, result: &ToolResult) {
    if result.success {
        cache.put(key.to_string(), result.clone());
    }
}

/// Hard-evidence gate (§4.D): the orchestrator calls this after `run`
/// returns. Not folded into `run` itself since only the orchestrator knows
/// whether a turn `requiresToolEvidence`.
pub fn successful_tool_count(results: &[ToolResult]) -> u32 {
    results.iter().filter(|r| r.success).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolExecResult, ToolExecutor};
    use agentrt_domain::config::ToolConfig;
    use agentrt_domain::tool::ToolDefinition;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type ChatResponseAlias = agentrt_domain::collab::ChatResponse;

    struct ScriptedClient {
        responses: std::sync::Mutex<Vec<ChatResponseAlias>>,
    }
    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponseAlias> {
            let mut r = self.responses.lock().unwrap();
            Ok(r.remove(0))
        }
    }

    fn plain(text: &str) -> ChatResponseAlias {
        ChatResponseAlias { content: text.to_string(), tool_calls: vec![], prompt_tokens: None, completion_tokens: None }
    }

    struct EchoExecutor;
    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolExecResult {
            ToolExecResult::ok(args.to_string())
        }
    }

    struct CountingExecutor {
        calls: AtomicUsize,
    }
    #[async_trait]
    impl ToolExecutor for CountingExecutor {
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolExecResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ToolExecResult::ok(args.to_string())
        }
    }

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: "test".into(),
            parameters: serde_json::json!({"type": "object"}),
            risk_class: RiskClass::Benign,
        }
    }

    fn ctx() -> ToolContext {
        ToolContext { trace_id: "t1".into(), tenant_id: None, route: "chat".into() }
    }

    #[tokio::test]
    async fn plain_text_response_terminates_immediately() {
        let client = ScriptedClient { responses: std::sync::Mutex::new(vec![plain("hello there")]) };
        let registry = ToolRegistry::new();
        let config = ToolConfig::default();
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();
        let outcome = run(&client, "m", vec![Message::user("hi")], &registry, &policy, &ctx(), &config)
            .await
            .unwrap();
        assert_eq!(outcome.reply_text, "hello there");
        assert!(!outcome.tools_executed);
    }

    #[tokio::test]
    async fn tool_call_envelope_executes_then_finalizes() {
        let mut registry = ToolRegistry::new();
        registry.register(def("search"), Arc::new(EchoExecutor)).unwrap();
        let config = ToolConfig::default();
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();

        let envelope_text = serde_json::json!({
            "type": "tool_calls",
            "calls": [{"name": "search", "args": {"q": "rust"}}]
        })
        .to_string();
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec![plain(&envelope_text), plain("final answer")]),
        };

        let outcome = run(&client, "m", vec![Message::user("hi")], &registry, &policy, &ctx(), &config)
            .await
            .unwrap();
        assert_eq!(outcome.reply_text, "final answer");
        assert!(outcome.tools_executed);
        assert_eq!(outcome.tool_results.len(), 1);
        assert!(outcome.tool_results[0].success);
    }

    #[tokio::test]
    async fn cache_hit_deduplicates_identical_calls_regardless_of_key_order() {
        let mut registry = ToolRegistry::new();
        let counter = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        registry.register(def("search"), counter.clone()).unwrap();
        let config = ToolConfig::default();
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();

        let env1 = serde_json::json!({"type":"tool_calls","calls":[{"name":"search","args":{"a":1,"b":2}}]}).to_string();
        let env2 = serde_json::json!({"type":"tool_calls","calls":[{"name":"search","args":{"b":2,"a":1}}]}).to_string();
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec![plain(&env1), plain(&env2), plain("done")]),
        };

        let outcome = run(&client, "m", vec![Message::user("hi")], &registry, &policy, &ctx(), &config)
            .await
            .unwrap();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.deduplicated_call_count, 1);
        assert_eq!(outcome.reply_text, "done");
    }

    #[tokio::test]
    async fn calls_beyond_max_per_round_are_truncated() {
        let mut registry = ToolRegistry::new();
        registry.register(def("search"), Arc::new(EchoExecutor)).unwrap();
        let mut config = ToolConfig::default();
        config.max_calls_per_round = 1;
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();

        let envelope_text = serde_json::json!({
            "type": "tool_calls",
            "calls": [
                {"name": "search", "args": {"q": "a"}},
                {"name": "search", "args": {"q": "b"}}
            ]
        })
        .to_string();
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec![plain(&envelope_text), plain("ok")]),
        };

        let outcome = run(&client, "m", vec![Message::user("hi")], &registry, &policy, &ctx(), &config)
            .await
            .unwrap();
        assert_eq!(outcome.tool_results.len(), 1);
        assert!(outcome
            .policy_decisions
            .iter()
            .any(|(_, d)| d.code.as_str() == "max_calls_per_round_truncated"));
    }

    #[test]
    fn stable_stringify_ignores_key_order() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(stable_stringify(&a), stable_stringify(&b));
    }

    #[test]
    fn strip_code_fence_removes_json_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    struct NoopTenantRepo;
    #[async_trait]
    impl agentrt_domain::collab::TenantPolicyRepo for NoopTenantRepo {
        async fn allowlist(&self, _tenant_id: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn blocklist(&self, _tenant_id: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }
}
