use serde::Serialize;

/// Structured trace events emitted across the core (canary, graph, tool loop,
/// search, critic, validator, orchestrator). One flat tagged enum, logged as a
/// single `tracing::info!` line per event — never printed directly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    // ── Canary (A) ──────────────────────────────────────────────────
    CanaryEvaluated {
        trace_id: String,
        route: String,
        allow_agentic: bool,
        reason: String,
        sample_percent: Option<f64>,
    },
    CanaryRecorded {
        success: bool,
        reason_codes: Vec<String>,
        window_len: usize,
        degraded_mode: bool,
    },

    // ── Context graph (C) ───────────────────────────────────────────
    GraphStarted {
        trace_id: String,
        node_count: usize,
    },
    GraphValidationFailed {
        trace_id: String,
        issues: Vec<String>,
    },
    NodeStarted {
        trace_id: String,
        node_id: String,
        attempt: u32,
    },
    NodeRetry {
        trace_id: String,
        node_id: String,
        attempt: u32,
    },
    NodeCompleted {
        trace_id: String,
        node_id: String,
        confidence: f64,
    },
    NodeFailed {
        trace_id: String,
        node_id: String,
        error: String,
    },
    ArtifactWritten {
        trace_id: String,
        artifact_id: String,
        kind: String,
    },
    GraphCompleted {
        trace_id: String,
        completed_tasks: u32,
        failed_tasks: u32,
    },

    // ── Tool loop (D) ───────────────────────────────────────────────
    ToolPolicyDecision {
        trace_id: String,
        tool_name: String,
        code: String,
    },
    ToolExecuted {
        trace_id: String,
        tool_name: String,
        success: bool,
        cache_hit: bool,
        duration_ms: u64,
    },
    ToolLoopRoundCompleted {
        trace_id: String,
        round: u32,
        tools_executed: bool,
    },
    HardGateEvaluated {
        trace_id: String,
        required: u32,
        successful: u32,
        met: bool,
    },

    // ── Search pipeline (E) ─────────────────────────────────────────
    SearchAttempt {
        trace_id: String,
        model: String,
        accepted: bool,
        rejection_reason: Option<String>,
    },
    SearchCrossCheck {
        trace_id: String,
        model: String,
        accepted: bool,
    },

    // ── Critic loop (F) ─────────────────────────────────────────────
    CriticAssessed {
        trace_id: String,
        iteration: u32,
        score: f64,
        verdict: String,
    },

    // ── Validator (G) ───────────────────────────────────────────────
    ValidationFailed {
        trace_id: String,
        route: String,
        issues: Vec<String>,
        repaired: bool,
    },

    // ── Orchestrator (H) & LLM client ───────────────────────────────
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    TurnCompleted {
        trace_id: String,
        route: String,
        duration_ms: u64,
        canary_outcome_reasons: Vec<String>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "agentrt_event");
    }
}
