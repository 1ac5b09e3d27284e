//! Orchestrator (§4.H): wires components A-G into one turn.
//!
//! Grounded on `runtime/turn.rs::run_turn`/`run_turn_inner`'s staged setup —
//! resolve provider, build context, run the loop, finalize — generalized from
//! "one turn's tool loop" to "one turn's full canary → graph → main pass →
//! critic → validator → trace sequence".

use crate::canary::{reason_codes, CanaryController};
use crate::critic::{self, CriticRequest};
use crate::graph::{self, GraphExecutionResult};
use crate::search::{self, SearchOutcome, SearchRequest, SearchToolPass};
use crate::toolloop::{self, looks_like_envelope_attempt, parse_envelope};
use crate::tools::{ToolContext, ToolPolicy, ToolRegistry};
use agentrt_domain::blackboard::{ArtifactKind, BinaryAttachment};
use agentrt_domain::collab::{ChatRequest, ContextProviderRunner, LlmClient, TraceRepo};
use agentrt_domain::config::Config;
use agentrt_domain::error::{sentinels, Result};
use agentrt_domain::graph::AgentGraph;
use agentrt_domain::tool::Message;
use agentrt_domain::trace::TraceEvent;

/// Input to a single turn. The route decision itself (`route`, `model_role`)
/// is made upstream by the caller — the orchestrator sequences components,
/// it does not classify intent.
pub struct TurnInput {
    pub trace_id: String,
    pub route: String,
    pub guild_id: String,
    pub tenant_id: Option<String>,
    pub model_role: String,
    pub messages: Vec<Message>,
    pub graph: Option<AgentGraph>,
    pub requires_tool_evidence: bool,
    pub voice_active: bool,
    pub files_attached: bool,
    pub search_complex_mode: bool,
    pub search_user_has_url: bool,
    pub search_requires_freshness: bool,
    pub search_original_request: String,
    pub search_current_date: String,
    pub now_ms: u64,
}

pub struct TurnResult {
    pub reply_text: String,
    pub files: Vec<BinaryAttachment>,
    pub debug_messages: Vec<Message>,
    pub trace_events: Vec<TraceEvent>,
}

pub struct OrchestratorDeps<'a> {
    pub llm: &'a dyn LlmClient,
    pub trace_repo: &'a dyn TraceRepo,
    pub canary: &'a CanaryController,
    pub context_runner: &'a dyn ContextProviderRunner,
    pub tool_registry: &'a ToolRegistry,
    pub tool_policy: &'a ToolPolicy,
}

fn main_pass_role<'a>(route: &str, model_role: &'a str) -> &'a str {
    if !model_role.is_empty() {
        return model_role;
    }
    match route {
        "coding" => "executor",
        _ => "reasoning",
    }
}

fn search_request<'a>(input: &'a TurnInput, context_text: &'a str, prior_draft: Option<&'a str>) -> SearchRequest<'a> {
    SearchRequest {
        trace_id: &input.trace_id,
        retrieved_context: context_text,
        recent_turns: &input.messages,
        current_date: &input.search_current_date,
        prior_draft,
        critic_revision_focus: None,
        complex_mode: input.search_complex_mode,
        user_has_url: input.search_user_has_url,
        requires_freshness: input.search_requires_freshness,
        original_request: &input.search_original_request,
    }
}

/// Sequence canary (A) → context graph (C) → main pass (tool loop D or search
/// pipeline E) → critic (F) → validator (G), persisting every `TraceEvent`
/// through `TraceRepo::append` as it is produced — the append-only contract
/// makes the first event appended under a trace a de facto "start" record
/// and the last (`TurnCompleted`) a de facto "end" record, so no separate
/// upsert/update trace operation is needed (§7 open question).
pub async fn run_turn(deps: &OrchestratorDeps<'_>, input: TurnInput, config: &Config) -> Result<TurnResult> {
    let start = std::time::Instant::now();
    let mut events: Vec<TraceEvent> = Vec::new();
    let mut reason_codes_hit: Vec<String> = Vec::new();
    let mut debug_messages = input.messages.clone();
    let files: Vec<BinaryAttachment> = Vec::new();

    let tool_ctx = ToolContext {
        trace_id: input.trace_id.clone(),
        tenant_id: input.tenant_id.clone(),
        route: input.route.clone(),
    };

    let canary_decision = deps
        .canary
        .evaluate(&input.trace_id, &input.route, &input.guild_id, &config.canary, input.now_ms)
        .await;

    let mut context_text = String::new();
    if canary_decision.allow_agentic {
        if let Some(graph) = &input.graph {
            let exec: GraphExecutionResult =
                graph::execute(&input.trace_id, graph, deps.context_runner, config.graph.max_parallel).await?;
            events.extend(exec.events.clone());
            if exec.blackboard.counters().failed_tasks > 0 {
                reason_codes_hit.push(reason_codes::GRAPH_FAILED_TASKS.to_string());
            }
            for artifact in exec.blackboard.by_kind(ArtifactKind::ContextPacket) {
                context_text.push_str(&artifact.content);
                context_text.push('\n');
            }
        }
    }

    if !context_text.is_empty() {
        debug_messages.push(Message::system(format!("Retrieved context:\n{context_text}")));
    }

    let role = main_pass_role(&input.route, &input.model_role).to_string();
    let mut tool_loop_failed = false;
    let mut hard_gate_met = true;

    let mut draft = if input.route == "search" {
        let search_req = search_request(&input, &context_text, None);
        let tool_pass = if canary_decision.allow_agentic && config.tool.loop_enabled {
            Some(SearchToolPass {
                registry: deps.tool_registry,
                policy: deps.tool_policy,
                ctx: &tool_ctx,
                tool_config: &config.tool,
                model_role: &role,
            })
        } else {
            None
        };
        let outcome: SearchOutcome =
            search::run(deps.llm, input.messages.clone(), &search_req, &config.search, tool_pass).await?;
        events.extend(outcome.events.clone());
        match outcome.reply_text {
            Some(text) => text,
            None => {
                tool_loop_failed = true;
                reason_codes_hit.push(reason_codes::TOOL_LOOP_FAILED.to_string());
                sentinels::TRANSPORT_FAILURE.to_string()
            }
        }
    } else if canary_decision.allow_agentic && config.tool.loop_enabled {
        let outcome = toolloop::run(
            deps.llm,
            &role,
            input.messages.clone(),
            deps.tool_registry,
            deps.tool_policy,
            &tool_ctx,
            &config.tool,
        )
        .await?;
        events.extend(outcome.events.clone());

        if config.tool.hard_gate_enabled && input.requires_tool_evidence {
            let successful = toolloop::successful_tool_count(&outcome.tool_results);
            hard_gate_met = successful >= config.tool.hard_gate_min_successful_calls;
            let gate_event = TraceEvent::HardGateEvaluated {
                trace_id: input.trace_id.clone(),
                required: config.tool.hard_gate_min_successful_calls,
                successful,
                met: hard_gate_met,
            };
            gate_event.emit();
            events.push(gate_event);
            if !hard_gate_met {
                tool_loop_failed = true;
                reason_codes_hit.push(reason_codes::HARD_GATE_UNMET.to_string());
            }
        }

        if hard_gate_met {
            outcome.reply_text
        } else {
            sentinels::HARD_GATE_REFUSAL.to_string()
        }
    } else {
        match deps
            .llm
            .chat(ChatRequest {
                model: role.clone(),
                messages: input.messages.clone(),
                tools: vec![],
                temperature: Some(0.4),
                max_tokens: None,
            })
            .await
        {
            Ok(resp) => resp.content,
            Err(_) => sentinels::TRANSPORT_FAILURE.to_string(),
        }
    };

    if config.critic.enabled && hard_gate_met && !draft.trim().is_empty() {
        let draft_snapshot = draft.clone();
        let critic_search_req = if input.route == "search" {
            Some(search_request(&input, &context_text, Some(&draft_snapshot)))
        } else {
            None
        };
        let critic_req = CriticRequest {
            trace_id: &input.trace_id,
            route: &input.route,
            voice_active: input.voice_active,
            files_attached: input.files_attached,
            search_fallback_terminal: tool_loop_failed,
            graph: input.graph.as_ref(),
            runner: Some(deps.context_runner),
            search_req_base: critic_search_req,
            search_config: &config.search,
            tool_config: &config.tool,
            registry: Some(deps.tool_registry),
            policy: Some(deps.tool_policy),
            ctx: Some(&tool_ctx),
        };
        let critic_outcome = critic::run(deps.llm, draft, &critic_req, &config.critic).await?;
        events.extend(critic_outcome.events.clone());
        draft = critic_outcome.final_text;
    }

    let mut reply_text = if config.validation.enabled {
        let draft_snapshot = draft.clone();
        let validator_search_req = if input.route == "search" {
            Some(search_request(&input, &context_text, Some(&draft_snapshot)))
        } else {
            None
        };
        let validator_req = crate::validator::ValidatorRequest {
            trace_id: &input.trace_id,
            route: &input.route,
            search_req_base: validator_search_req,
            search_config: &config.search,
            validation_policy_json: config.validation.policy_json.as_deref(),
        };
        crate::validator::validate_and_repair(
            deps.llm,
            draft,
            &validator_req,
            config.validation.auto_repair_enabled,
            config.validation.auto_repair_max_attempts,
        )
        .await?
    } else {
        draft
    };

    reply_text = redact_leaked_envelope(&reply_text);

    let duration_ms = start.elapsed().as_millis() as u64;
    let turn_event = TraceEvent::TurnCompleted {
        trace_id: input.trace_id.clone(),
        route: input.route.clone(),
        duration_ms,
        canary_outcome_reasons: reason_codes_hit.clone(),
    };
    turn_event.emit();
    events.push(turn_event);

    if config.observability.trace_enabled {
        for event in &events {
            let json = serde_json::to_string(event)?;
            deps.trace_repo.append(&input.trace_id, json).await?;
        }
    }

    deps.canary
        .record(&input.route, reason_codes_hit.is_empty(), reason_codes_hit.clone(), &config.canary, input.now_ms)
        .await;

    debug_messages.push(Message::assistant(reply_text.clone()));

    Ok(TurnResult { reply_text, files, debug_messages, trace_events: events })
}

/// Final safety net: if the reply is itself a bare tool-call envelope (the
/// model ignored the instruction to answer in plain text), substitute the
/// finalization-failure sentinel rather than leak raw JSON to the user.
fn redact_leaked_envelope(text: &str) -> String {
    if parse_envelope(text).is_some() || looks_like_envelope_attempt(text) {
        sentinels::TOOL_LOOP_FINALIZATION_FAILURE.to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use agentrt_domain::blackboard::{Artifact, ContextPacket};
    use agentrt_domain::canary::CanaryStateRecord;
    use agentrt_domain::collab::{CanaryStateRepo, ChatResponse, TenantPolicyRepo};
    use agentrt_domain::config::ToolConfig;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoClient;
    #[async_trait]
    impl LlmClient for EchoClient {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
            let last = req.messages.last().map(|m| m.content.extract_all_text()).unwrap_or_default();
            Ok(ChatResponse { content: format!("echo:{last}"), tool_calls: vec![], prompt_tokens: None, completion_tokens: None })
        }
    }

    struct NoopTraceRepo;
    #[async_trait]
    impl TraceRepo for NoopTraceRepo {
        async fn append(&self, _trace_id: &str, _event_json: String) -> Result<()> {
            Ok(())
        }
    }

    struct NoopContextRunner;
    #[async_trait]
    impl ContextProviderRunner for NoopContextRunner {
        async fn run_node(&self, _graph: &AgentGraph, _node_id: &str, _upstream: Vec<Artifact>) -> Result<Vec<ContextPacket>> {
            Ok(vec![])
        }
    }

    struct MemCanaryRepo;
    #[async_trait]
    impl CanaryStateRepo for MemCanaryRepo {
        async fn load(&self, _route: &str) -> Result<Option<CanaryStateRecord>> {
            Ok(None)
        }
        async fn save(&self, _state: &CanaryStateRecord) -> Result<()> {
            Ok(())
        }
    }

    struct NoopTenantRepo;
    #[async_trait]
    impl TenantPolicyRepo for NoopTenantRepo {
        async fn allowlist(&self, _tenant_id: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn blocklist(&self, _tenant_id: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn base_input(route: &str) -> TurnInput {
        TurnInput {
            trace_id: "t1".into(),
            route: route.into(),
            guild_id: "g1".into(),
            tenant_id: None,
            model_role: String::new(),
            messages: vec![Message::user("hello")],
            graph: None,
            requires_tool_evidence: false,
            voice_active: false,
            files_attached: false,
            search_complex_mode: false,
            search_user_has_url: false,
            search_requires_freshness: false,
            search_original_request: "hello".into(),
            search_current_date: "2026-01-01".into(),
            now_ms: 0,
        }
    }

    #[tokio::test]
    async fn chat_turn_with_ambient_passes_disabled_takes_plain_llm_path() {
        let client = EchoClient;
        let trace_repo = NoopTraceRepo;
        let runner = NoopContextRunner;
        let registry = ToolRegistry::new();
        let tool_config = ToolConfig::default();
        let policy = ToolPolicy::resolve(&tool_config, None, &NoopTenantRepo, None).await.unwrap();
        let canary = CanaryController::new(Arc::new(MemCanaryRepo));
        let deps = OrchestratorDeps {
            llm: &client,
            trace_repo: &trace_repo,
            canary: &canary,
            context_runner: &runner,
            tool_registry: &registry,
            tool_policy: &policy,
        };
        let mut config = Config::default();
        config.canary.enabled = false;
        config.tool.loop_enabled = false;
        config.critic.enabled = false;
        config.validation.enabled = false;

        let result = run_turn(&deps, base_input("chat"), &config).await.unwrap();
        assert!(result.reply_text.starts_with("echo:"));
    }

    #[tokio::test]
    async fn search_route_without_urls_falls_through_to_validator_sentinel() {
        let client = EchoClient;
        let trace_repo = NoopTraceRepo;
        let runner = NoopContextRunner;
        let registry = ToolRegistry::new();
        let tool_config = ToolConfig::default();
        let policy = ToolPolicy::resolve(&tool_config, None, &NoopTenantRepo, None).await.unwrap();
        let canary = CanaryController::new(Arc::new(MemCanaryRepo));
        let deps = OrchestratorDeps {
            llm: &client,
            trace_repo: &trace_repo,
            canary: &canary,
            context_runner: &runner,
            tool_registry: &registry,
            tool_policy: &policy,
        };
        let mut config = Config::default();
        config.canary.enabled = false;
        config.tool.loop_enabled = false;
        config.critic.enabled = false;

        let result = run_turn(&deps, base_input("search"), &config).await.unwrap();
        assert_eq!(result.reply_text, sentinels::VALIDATOR_BLOCK);
    }
}
