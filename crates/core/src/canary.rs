//! Canary admission controller (§4.A): probabilistic allow/deny plus a
//! persisted rolling failure budget, with degrade-to-in-memory on store
//! errors.

use agentrt_domain::canary::{CanaryOutcome, CanaryStateRecord};
use agentrt_domain::collab::CanaryStateRepo;
use agentrt_domain::config::CanaryConfig;
use agentrt_domain::trace::TraceEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// FNV-1a over the raw bytes, matching the algorithm named in SPEC_FULL.md
/// §4.A. Deliberately hand-rolled rather than pulled from a crate: it needs
/// to be deterministic across process restarts, which rules out
/// `std::collections::hash_map::DefaultHasher`.
fn fnv_1a_hash(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Deterministic sample percent in `[0, 99.99]` for one `(guild, route, trace)`.
fn sample_percent(guild_id: &str, route: &str, trace_id: &str) -> f64 {
    let key = format!("{guild_id}|{route}|{trace_id}");
    let hash = fnv_1a_hash(key.as_bytes());
    (hash % 10_000) as f64 / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanaryReason {
    Disabled,
    RouteNotAllowlisted,
    OutOfRolloutSample,
    ErrorBudgetCooldown,
    Allowed,
}

impl CanaryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CanaryReason::Disabled => "disabled",
            CanaryReason::RouteNotAllowlisted => "route_not_allowlisted",
            CanaryReason::OutOfRolloutSample => "out_of_rollout_sample",
            CanaryReason::ErrorBudgetCooldown => "error_budget_cooldown",
            CanaryReason::Allowed => "allowed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CanaryDecision {
    pub allow_agentic: bool,
    pub reason: CanaryReason,
    pub sample_percent: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CanarySnapshot {
    pub success_count: u32,
    pub failure_count: u32,
    pub failure_rate: f64,
    pub cooldown_until_ms: u64,
    pub degraded_mode: bool,
    pub latest_outcome: Option<CanaryOutcome>,
}

/// Reason codes recorded against a canary outcome (§3).
pub mod reason_codes {
    pub const GRAPH_FAILED_TASKS: &str = "graph_failed_tasks";
    pub const HARD_GATE_UNMET: &str = "hard_gate_unmet";
    pub const TOOL_LOOP_FAILED: &str = "tool_loop_failed";
}

pub struct CanaryController {
    repo: Arc<dyn CanaryStateRepo>,
    cache: RwLock<HashMap<String, CanaryStateRecord>>,
    /// Once the store errors, never retry it for the rest of the process
    /// lifetime (§4.A persistence semantics).
    degraded: AtomicBool,
}

impl CanaryController {
    pub fn new(repo: Arc<dyn CanaryStateRepo>) -> Self {
        Self { repo, cache: RwLock::new(HashMap::new()), degraded: AtomicBool::new(false) }
    }

    async fn hydrate(&self, route: &str, window_capacity: usize) -> CanaryStateRecord {
        if let Some(state) = self.cache.read().get(route).cloned() {
            return state;
        }
        if self.degraded.load(Ordering::Relaxed) {
            return CanaryStateRecord::new(route, window_capacity);
        }
        let state = match self.repo.load(route).await {
            Ok(Some(state)) => state,
            Ok(None) => CanaryStateRecord::new(route, window_capacity),
            Err(e) => {
                tracing::warn!(route, error = %e, "canary store unavailable at hydrate, degrading to in-memory");
                self.degraded.store(true, Ordering::Relaxed);
                CanaryStateRecord::new(route, window_capacity)
            }
        };
        self.cache.write().insert(route.to_string(), state.clone());
        state
    }

    pub async fn evaluate(
        &self,
        trace_id: &str,
        route: &str,
        guild_id: &str,
        cfg: &CanaryConfig,
        now_ms: u64,
    ) -> CanaryDecision {
        if !cfg.enabled {
            let decision = CanaryDecision {
                allow_agentic: true,
                reason: CanaryReason::Disabled,
                sample_percent: None,
            };
            emit_evaluated(trace_id, route, &decision);
            return decision;
        }

        if !cfg.route_allowlist.iter().any(|r| r == route) {
            let decision = CanaryDecision {
                allow_agentic: false,
                reason: CanaryReason::RouteNotAllowlisted,
                sample_percent: None,
            };
            emit_evaluated(trace_id, route, &decision);
            return decision;
        }

        let state = self.hydrate(route, cfg.window_size).await;
        if now_ms < state.cooldown_until_ms {
            let decision = CanaryDecision {
                allow_agentic: false,
                reason: CanaryReason::ErrorBudgetCooldown,
                sample_percent: None,
            };
            emit_evaluated(trace_id, route, &decision);
            return decision;
        }

        let sample = sample_percent(guild_id, route, trace_id);
        let decision = if sample >= cfg.percent {
            CanaryDecision {
                allow_agentic: false,
                reason: CanaryReason::OutOfRolloutSample,
                sample_percent: Some(sample),
            }
        } else {
            CanaryDecision { allow_agentic: true, reason: CanaryReason::Allowed, sample_percent: Some(sample) }
        };
        emit_evaluated(trace_id, route, &decision);
        decision
    }

    pub async fn record(
        &self,
        route: &str,
        success: bool,
        reason_codes: Vec<String>,
        cfg: &CanaryConfig,
        now_ms: u64,
    ) {
        let mut state = self.hydrate(route, cfg.window_size).await;
        let outcome = if success { CanaryOutcome::Success } else { CanaryOutcome::Failure };
        state.record(outcome, reason_codes.clone(), now_ms);

        if state.window.len() >= cfg.min_samples && state.failure_rate() > cfg.max_failure_rate {
            state.extend_cooldown(now_ms + cfg.cooldown_sec * 1000);
        }

        self.cache.write().insert(route.to_string(), state.clone());

        if !self.degraded.load(Ordering::Relaxed) {
            if let Err(e) = self.repo.save(&state).await {
                tracing::warn!(route, error = %e, "canary store unavailable at record, degrading to in-memory");
                self.degraded.store(true, Ordering::Relaxed);
            }
        }

        TraceEvent::CanaryRecorded {
            success,
            reason_codes,
            window_len: state.window.len(),
            degraded_mode: self.degraded.load(Ordering::Relaxed),
        }
        .emit();
    }

    pub async fn snapshot(&self, route: &str, cfg: &CanaryConfig) -> CanarySnapshot {
        let state = self.hydrate(route, cfg.window_size).await;
        let success_count = state.window.iter().filter(|e| e.outcome == CanaryOutcome::Success).count() as u32;
        let failure_count = state.window.len() as u32 - success_count;
        CanarySnapshot {
            success_count,
            failure_count,
            failure_rate: state.failure_rate(),
            cooldown_until_ms: state.cooldown_until_ms,
            degraded_mode: self.degraded.load(Ordering::Relaxed),
            latest_outcome: state.window.last().map(|e| e.outcome),
        }
    }
}

fn emit_evaluated(trace_id: &str, route: &str, decision: &CanaryDecision) {
    TraceEvent::CanaryEvaluated {
        trace_id: trace_id.to_string(),
        route: route.to_string(),
        allow_agentic: decision.allow_agentic,
        reason: decision.reason.as_str().to_string(),
        sample_percent: decision.sample_percent,
    }
    .emit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::error::Result;
    use async_trait::async_trait;

    struct MemRepo {
        inner: RwLock<HashMap<String, CanaryStateRecord>>,
    }
    impl MemRepo {
        fn new() -> Self {
            Self { inner: RwLock::new(HashMap::new()) }
        }
    }
    #[async_trait]
    impl CanaryStateRepo for MemRepo {
        async fn load(&self, route: &str) -> Result<Option<CanaryStateRecord>> {
            Ok(self.inner.read().get(route).cloned())
        }
        async fn save(&self, state: &CanaryStateRecord) -> Result<()> {
            self.inner.write().insert(state.route.clone(), state.clone());
            Ok(())
        }
    }

    struct FailingRepo;
    #[async_trait]
    impl CanaryStateRepo for FailingRepo {
        async fn load(&self, _route: &str) -> Result<Option<CanaryStateRecord>> {
            Err(agentrt_domain::error::CoreError::Persistence("unreachable".into()))
        }
        async fn save(&self, _state: &CanaryStateRecord) -> Result<()> {
            Err(agentrt_domain::error::CoreError::Persistence("unreachable".into()))
        }
    }

    fn cfg() -> CanaryConfig {
        CanaryConfig {
            enabled: true,
            percent: 100.0,
            route_allowlist: vec!["chat".into()],
            max_failure_rate: 0.5,
            min_samples: 2,
            cooldown_sec: 60,
            window_size: 10,
        }
    }

    #[tokio::test]
    async fn disabled_config_allows_unconditionally() {
        let controller = CanaryController::new(Arc::new(MemRepo::new()));
        let mut c = cfg();
        c.enabled = false;
        let decision = controller.evaluate("t1", "chat", "g1", &c, 0).await;
        assert!(decision.allow_agentic);
        assert_eq!(decision.reason, CanaryReason::Disabled);
    }

    #[tokio::test]
    async fn route_not_allowlisted_is_denied() {
        let controller = CanaryController::new(Arc::new(MemRepo::new()));
        let decision = controller.evaluate("t1", "search", "g1", &cfg(), 0).await;
        assert!(!decision.allow_agentic);
        assert_eq!(decision.reason, CanaryReason::RouteNotAllowlisted);
    }

    #[tokio::test]
    async fn sample_below_zero_percent_is_always_denied() {
        let controller = CanaryController::new(Arc::new(MemRepo::new()));
        let mut c = cfg();
        c.percent = 0.0;
        let decision = controller.evaluate("t1", "chat", "g1", &c, 0).await;
        assert!(!decision.allow_agentic);
        assert_eq!(decision.reason, CanaryReason::OutOfRolloutSample);
    }

    #[tokio::test]
    async fn repeated_failures_trip_cooldown() {
        let controller = CanaryController::new(Arc::new(MemRepo::new()));
        let c = cfg();
        controller.record("chat", false, vec![], &c, 1_000).await;
        controller.record("chat", false, vec![], &c, 1_001).await;

        let decision = controller.evaluate("t1", "chat", "g1", &c, 1_002).await;
        assert!(!decision.allow_agentic);
        assert_eq!(decision.reason, CanaryReason::ErrorBudgetCooldown);
    }

    #[tokio::test]
    async fn store_failure_at_hydrate_degrades_to_empty_window() {
        let controller = CanaryController::new(Arc::new(FailingRepo));
        let decision = controller.evaluate("t1", "chat", "g1", &cfg(), 0).await;
        assert!(decision.allow_agentic);
        let snapshot = controller.snapshot("chat", &cfg()).await;
        assert!(snapshot.degraded_mode);
        assert_eq!(snapshot.success_count + snapshot.failure_count, 0);
    }

    #[test]
    fn fnv_hash_is_deterministic() {
        assert_eq!(fnv_1a_hash(b"abc"), fnv_1a_hash(b"abc"));
        assert_ne!(fnv_1a_hash(b"abc"), fnv_1a_hash(b"abd"));
    }
}
