//! Shared application state passed to every API handler.
//!
//! Grouped by concern, same banner style as the rest of this crate:
//! - **Config** — the merged behavioral + deployment config
//! - **Collaborators** (§6.1) — the one concrete, swappable implementation
//!   this gateway wires up for each trait the core depends on
//! - **Tool plumbing** — the registry (empty: individual tool implementations
//!   are out of scope, §1) and the per-tenant policy repo it's resolved against

use std::sync::Arc;

use agentrt_core::canary::CanaryController;
use agentrt_core::tools::ToolRegistry;
use agentrt_domain::collab::{
    GuildSettingsRepo, LlmClient, SummaryStore, TenantPolicyRepo, TraceRepo, TranscriptRingBuffer,
};

use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct AppState {
    // ── Config ────────────────────────────────────────────────────────
    pub config: Arc<GatewayConfig>,

    // ── Collaborators (§6.1) ─────────────────────────────────────────
    pub llm: Arc<dyn LlmClient>,
    pub trace_repo: Arc<dyn TraceRepo>,
    pub canary: Arc<CanaryController>,
    pub tenant_repo: Arc<dyn TenantPolicyRepo>,
    pub guild_settings: Arc<dyn GuildSettingsRepo>,
    pub summary_store: Arc<dyn SummaryStore>,
    pub transcripts: Arc<dyn TranscriptRingBuffer>,

    // ── Tool plumbing (§4.B) ──────────────────────────────────────────
    pub tool_registry: Arc<ToolRegistry>,

    // ── Auth ──────────────────────────────────────────────────────────
    /// SHA-256 digest of the bearer token read from `config.http.api_token_env`
    /// at startup, or `None` when that env var is unset (dev mode — no auth).
    pub api_token_hash: Option<Vec<u8>>,
}

/// Builds every collaborator from `config.workspace.state_path`, mirroring
/// the teacher's staged `build_app_state` construction one subsystem at a
/// time, each step logged as it comes up.
pub async fn build_app_state(config: Arc<GatewayConfig>) -> anyhow::Result<AppState> {
    let state_path = &config.workspace.state_path;
    std::fs::create_dir_all(state_path)
        .map_err(|e| anyhow::anyhow!("creating state dir {state_path:?}: {e}"))?;

    let canary_repo = agentrt_store::FileCanaryStateRepo::new(state_path.clone())?;
    let canary: Arc<CanaryController> = Arc::new(CanaryController::new(Arc::new(canary_repo)));
    tracing::info!("canary controller ready");

    let trace_repo: Arc<dyn TraceRepo> = Arc::new(agentrt_store::FileTraceRepo::new(state_path.clone())?);
    tracing::info!("trace repo ready");

    let tenant_repo: Arc<dyn TenantPolicyRepo> =
        Arc::new(agentrt_store::FileTenantPolicyRepo::new(state_path.clone())?);
    let guild_settings: Arc<dyn GuildSettingsRepo> =
        Arc::new(agentrt_store::FileGuildSettingsRepo::new(state_path.clone())?);
    let summary_store: Arc<dyn SummaryStore> = Arc::new(agentrt_store::FileSummaryStore::new(state_path.clone())?);
    let transcripts: Arc<dyn TranscriptRingBuffer> =
        Arc::new(agentrt_store::FileTranscriptRingBuffer::new(state_path.clone())?);
    tracing::info!("tenant/guild/summary/transcript stores ready");

    let router = agentrt_providers::LlmRouter::from_config(&config.llm)
        .map_err(|e| anyhow::anyhow!("initializing LLM providers: {e}"))?;
    let llm: Arc<dyn LlmClient> = Arc::new(crate::llm_adapter::RouterLlmClient::new(router));
    tracing::info!(roles = config.llm.roles.len(), providers = config.llm.providers.len(), "LLM router ready");

    // Individual tool implementations are out of scope (§1) — the registry
    // ships empty; a deployment that needs real tools registers them against
    // `ToolRegistry` before handing it to `build_app_state`.
    let tool_registry = Arc::new(ToolRegistry::new());
    tracing::info!("tool registry ready (no tools registered)");

    let api_token_hash = match std::env::var(&config.http.api_token_env) {
        Ok(token) if !token.is_empty() => {
            use sha2::{Digest, Sha256};
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env_var = %config.http.api_token_env,
                "no API token configured, running without authentication"
            );
            None
        }
    };

    Ok(AppState {
        config,
        llm,
        trace_repo,
        canary,
        tenant_repo,
        guild_settings,
        summary_store,
        transcripts,
        tool_registry,
        api_token_hash,
    })
}
