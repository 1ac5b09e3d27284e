//! Persisted canary rollout state (§3, §4.A). The admission/failure-budget
//! decision logic that builds and consumes this state lives in the core;
//! this module only names the data and its window bookkeeping.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanaryOutcome {
    Success,
    Failure,
}

/// One recorded outcome in a route's rolling window (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryWindowEntry {
    pub outcome: CanaryOutcome,
    #[serde(default)]
    pub reason_codes: Vec<String>,
    pub recorded_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryStateRecord {
    pub route: String,
    /// Fixed-capacity ring of recent outcomes, oldest first.
    pub window: Vec<CanaryWindowEntry>,
    pub window_capacity: usize,
    pub degraded_mode: bool,
    /// Admission is denied while `now < cooldown_until_ms`.
    pub cooldown_until_ms: u64,
}

impl CanaryStateRecord {
    pub fn new(route: impl Into<String>, window_capacity: usize) -> Self {
        Self {
            route: route.into(),
            window: Vec::with_capacity(window_capacity),
            window_capacity,
            degraded_mode: false,
            cooldown_until_ms: 0,
        }
    }

    /// Push an outcome, evicting the oldest entry once at capacity.
    pub fn record(&mut self, outcome: CanaryOutcome, reason_codes: Vec<String>, recorded_at_ms: u64) {
        if self.window.len() >= self.window_capacity {
            self.window.remove(0);
        }
        self.window.push(CanaryWindowEntry { outcome, reason_codes, recorded_at_ms });
    }

    pub fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|e| e.outcome == CanaryOutcome::Failure).count();
        failures as f64 / self.window.len() as f64
    }

    /// Extend the cooldown to at least `candidate_until_ms`, never shortening it.
    pub fn extend_cooldown(&mut self, candidate_until_ms: u64) {
        self.cooldown_until_ms = self.cooldown_until_ms.max(candidate_until_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(outcome: CanaryOutcome, at_ms: u64) -> CanaryWindowEntry {
        CanaryWindowEntry { outcome, reason_codes: Vec::new(), recorded_at_ms: at_ms }
    }

    #[test]
    fn window_evicts_oldest_at_capacity() {
        let mut state = CanaryStateRecord::new("chat", 2);
        state.record(CanaryOutcome::Success, vec![], 1);
        state.record(CanaryOutcome::Failure, vec![], 2);
        state.record(CanaryOutcome::Failure, vec![], 3);
        assert_eq!(state.window.len(), 2);
        assert_eq!(state.window[0].outcome, CanaryOutcome::Failure);
        assert_eq!(state.window[1].outcome, CanaryOutcome::Failure);
    }

    #[test]
    fn failure_rate_on_empty_window_is_zero() {
        let state = CanaryStateRecord::new("chat", 5);
        assert_eq!(state.failure_rate(), 0.0);
    }

    #[test]
    fn failure_rate_computed_over_window() {
        let mut state = CanaryStateRecord::new("chat", 4);
        state.record(CanaryOutcome::Success, vec![], 1);
        state.record(CanaryOutcome::Failure, vec!["tool_loop_failed".into()], 2);
        state.record(CanaryOutcome::Success, vec![], 3);
        state.record(CanaryOutcome::Failure, vec!["hard_gate_unmet".into()], 4);
        assert_eq!(state.failure_rate(), 0.5);
        let _ = entry(CanaryOutcome::Success, 0);
    }

    #[test]
    fn extend_cooldown_never_shortens() {
        let mut state = CanaryStateRecord::new("chat", 4);
        state.extend_cooldown(1000);
        state.extend_cooldown(500);
        assert_eq!(state.cooldown_until_ms, 1000);
        state.extend_cooldown(2000);
        assert_eq!(state.cooldown_until_ms, 2000);
    }
}
