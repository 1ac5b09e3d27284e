//! `POST /v1/turn` — the gateway's one real endpoint: run a single turn
//! through the core orchestrator and return its result.
//!
//! Every collaborator that carries per-request state (the tool policy is
//! merged per tenant; the context runner borrows the LLM client for the
//! duration of the call) is built fresh here rather than cached in
//! [`AppState`] — see `context_runner`/`llm_adapter` for why those two in
//! particular can't be singletons.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use agentrt_core::orchestrator::{self, OrchestratorDeps, TurnInput, TurnResult};
use agentrt_core::tools::ToolPolicy;
use agentrt_domain::blackboard::BinaryAttachment;
use agentrt_domain::error::CoreError;
use agentrt_domain::graph::AgentGraph;
use agentrt_domain::tool::Message;

use crate::context_runner::LlmContextProviderRunner;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub route: String,
    pub guild_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub model_role: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub graph: Option<AgentGraph>,
    #[serde(default)]
    pub requires_tool_evidence: bool,
    #[serde(default)]
    pub voice_active: bool,
    #[serde(default)]
    pub files_attached: bool,
    #[serde(default)]
    pub search_complex_mode: bool,
    #[serde(default)]
    pub search_user_has_url: bool,
    #[serde(default)]
    pub search_requires_freshness: bool,
    #[serde(default)]
    pub search_original_request: String,
    #[serde(default)]
    pub search_current_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub trace_id: String,
    pub reply_text: String,
    pub files: Vec<BinaryAttachment>,
}

pub async fn run_turn(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let trace_id = uuid::Uuid::new_v4().to_string();

    let tool_policy = ToolPolicy::resolve(
        &state.config.core.tool,
        req.tenant_id.as_deref(),
        state.tenant_repo.as_ref(),
        state.config.core.tenant.policy_json.as_deref(),
    )
    .await?;

    let context_runner = LlmContextProviderRunner::new(state.llm.as_ref());

    let deps = OrchestratorDeps {
        llm: state.llm.as_ref(),
        trace_repo: state.trace_repo.as_ref(),
        canary: state.canary.as_ref(),
        context_runner: &context_runner,
        tool_registry: state.tool_registry.as_ref(),
        tool_policy: &tool_policy,
    };

    let now_ms = chrono::Utc::now().timestamp_millis() as u64;
    let current_date = req
        .search_current_date
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());

    let input = TurnInput {
        trace_id: trace_id.clone(),
        route: req.route,
        guild_id: req.guild_id,
        tenant_id: req.tenant_id,
        model_role: req.model_role,
        messages: req.messages,
        graph: req.graph,
        requires_tool_evidence: req.requires_tool_evidence,
        voice_active: req.voice_active,
        files_attached: req.files_attached,
        search_complex_mode: req.search_complex_mode,
        search_user_has_url: req.search_user_has_url,
        search_requires_freshness: req.search_requires_freshness,
        search_original_request: req.search_original_request,
        search_current_date: current_date,
        now_ms,
    };

    let TurnResult { reply_text, files, .. } =
        orchestrator::run_turn(&deps, input, &state.config.core).await?;

    Ok(Json(TurnResponse { trace_id, reply_text, files }))
}

/// Thin `CoreError -> HTTP` mapping. Validation/policy failures are the
/// caller's fault (400); everything else is ours (502/500).
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Validation(_) | CoreError::Policy(_) | CoreError::HardGate(_) => StatusCode::BAD_REQUEST,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Graph(_) | CoreError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Model(_) | CoreError::Execution(_) | CoreError::Dependency(_) => StatusCode::BAD_GATEWAY,
            CoreError::Persistence(_) | CoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
