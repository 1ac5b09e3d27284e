mod canary;
mod critic;
mod graph;
mod manager_worker;
mod observability;
mod search;
mod server;
mod tenant;
mod tool;
mod validation;

pub use canary::CanaryConfig;
pub use critic::CriticConfig;
pub use graph::GraphConfig;
pub use manager_worker::ManagerWorkerConfig;
pub use observability::ObservabilityConfig;
pub use search::SearchConfig;
pub use server::ServerConfig;
pub use tenant::TenantConfig;
pub use tool::ToolConfig;
pub use validation::ValidationConfig;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Closed `AGENTIC_*`/legacy env-var surface (§6). `Config::load` reads a TOML
/// file, then overlays these on top — the same two-phase load the gateway's
/// `cli::load_config` performs, generalized from one env var to the full set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub critic: CriticConfig,
    #[serde(default)]
    pub canary: CanaryConfig,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub manager_worker: ManagerWorkerConfig,
    #[serde(default)]
    pub tenant: TenantConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load from `path` if it exists (TOML), falling back to defaults, then
    /// overlay every `AGENTIC_*`/legacy env var that is actually set.
    pub fn load(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)
                .map_err(|e| crate::error::CoreError::Config(format!("parsing {path:?}: {e}")))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay every `AGENTIC_*`/legacy env var that is actually set. Exposed
    /// as `pub` (rather than only reachable through [`Config::load`]) so a
    /// caller embedding `Config` inside a larger, flattened config struct —
    /// the gateway's `GatewayConfig` — can still apply the overlay after its
    /// own single-file TOML parse.
    pub fn apply_env_overrides(&mut self) {
        overlay_bool("AGENTIC_GRAPH_PARALLEL_ENABLED", &mut self.graph.parallel_enabled);
        overlay("AGENTIC_GRAPH_MAX_PARALLEL", &mut self.graph.max_parallel);

        overlay_bool("AGENTIC_CRITIC_ENABLED", &mut self.critic.enabled);
        overlay("AGENTIC_CRITIC_MAX_LOOPS", &mut self.critic.max_loops);
        overlay("AGENTIC_CRITIC_MIN_SCORE", &mut self.critic.min_score);
        overlay("CRITIC_MAX_OUTPUT_TOKENS", &mut self.critic.max_output_tokens);

        overlay_bool("AGENTIC_CANARY_ENABLED", &mut self.canary.enabled);
        overlay("AGENTIC_CANARY_PERCENT", &mut self.canary.percent);
        overlay_csv("AGENTIC_CANARY_ROUTE_ALLOWLIST_CSV", &mut self.canary.route_allowlist);
        overlay("AGENTIC_CANARY_MAX_FAILURE_RATE", &mut self.canary.max_failure_rate);
        overlay("AGENTIC_CANARY_MIN_SAMPLES", &mut self.canary.min_samples);
        overlay("AGENTIC_CANARY_COOLDOWN_SEC", &mut self.canary.cooldown_sec);
        overlay("AGENTIC_CANARY_WINDOW_SIZE", &mut self.canary.window_size);

        overlay_bool("AGENTIC_TOOL_LOOP_ENABLED", &mut self.tool.loop_enabled);
        overlay("AGENTIC_TOOL_MAX_ROUNDS", &mut self.tool.max_rounds);
        overlay("AGENTIC_TOOL_MAX_CALLS_PER_ROUND", &mut self.tool.max_calls_per_round);
        overlay("AGENTIC_TOOL_TIMEOUT_MS", &mut self.tool.timeout_ms);
        overlay("AGENTIC_TOOL_RESULT_MAX_CHARS", &mut self.tool.result_max_chars);
        overlay_bool(
            "AGENTIC_TOOL_PARALLEL_READ_ONLY_ENABLED",
            &mut self.tool.parallel_read_only_enabled,
        );
        overlay("AGENTIC_TOOL_MAX_PARALLEL_READ_ONLY", &mut self.tool.max_parallel_read_only);
        overlay_bool("AGENTIC_TOOL_HARD_GATE_ENABLED", &mut self.tool.hard_gate_enabled);
        overlay(
            "AGENTIC_TOOL_HARD_GATE_MIN_SUCCESSFUL_CALLS",
            &mut self.tool.hard_gate_min_successful_calls,
        );
        overlay_bool("AGENTIC_TOOL_ALLOW_NETWORK_READ", &mut self.tool.allow_network_read);
        overlay_bool("AGENTIC_TOOL_ALLOW_EXTERNAL_WRITE", &mut self.tool.allow_external_write);
        overlay_bool("AGENTIC_TOOL_ALLOW_HIGH_RISK", &mut self.tool.allow_high_risk);
        overlay_csv("AGENTIC_TOOL_BLOCKLIST_CSV", &mut self.tool.blocklist);
        overlay_opt_string("AGENTIC_TOOL_POLICY_JSON", &mut self.tool.policy_json);

        overlay_bool("AGENTIC_VALIDATION_ENABLED", &mut self.validation.enabled);
        overlay_opt_string("AGENTIC_VALIDATION_POLICY_JSON", &mut self.validation.policy_json);
        overlay_bool(
            "AGENTIC_VALIDATION_AUTO_REPAIR_ENABLED",
            &mut self.validation.auto_repair_enabled,
        );
        overlay(
            "AGENTIC_VALIDATION_AUTO_REPAIR_MAX_ATTEMPTS",
            &mut self.validation.auto_repair_max_attempts,
        );

        overlay_bool("AGENTIC_MANAGER_WORKER_ENABLED", &mut self.manager_worker.enabled);
        overlay("AGENTIC_MANAGER_WORKER_MAX_WORKERS", &mut self.manager_worker.max_workers);
        overlay(
            "AGENTIC_MANAGER_WORKER_MAX_PLANNER_LOOPS",
            &mut self.manager_worker.max_planner_loops,
        );
        overlay("AGENTIC_MANAGER_WORKER_MAX_TOKENS", &mut self.manager_worker.max_tokens);
        overlay(
            "AGENTIC_MANAGER_WORKER_MAX_INPUT_CHARS",
            &mut self.manager_worker.max_input_chars,
        );
        overlay("AGENTIC_MANAGER_WORKER_TIMEOUT_MS", &mut self.manager_worker.timeout_ms);
        overlay(
            "AGENTIC_MANAGER_WORKER_MIN_COMPLEXITY_SCORE",
            &mut self.manager_worker.min_complexity_score,
        );

        overlay_opt_string("AGENTIC_TENANT_POLICY_JSON", &mut self.tenant.policy_json);

        overlay("SEARCH_MAX_ATTEMPTS_SIMPLE", &mut self.search.max_attempts_simple);
        overlay("SEARCH_MAX_ATTEMPTS_COMPLEX", &mut self.search.max_attempts_complex);
        overlay("TIMEOUT_SEARCH_MS", &mut self.search.timeout_search_ms);
        overlay("TIMEOUT_SEARCH_SCRAPER_MS", &mut self.search.timeout_search_scraper_ms);
        overlay("SEARCH_MAX_OUTPUT_TOKENS", &mut self.search.max_output_tokens);

        overlay("TIMEOUT_CHAT_MS", &mut self.server.timeout_chat_ms);
        overlay("CHAT_MAX_OUTPUT_TOKENS", &mut self.server.chat_max_output_tokens);
        overlay("CODING_MAX_OUTPUT_TOKENS", &mut self.server.coding_max_output_tokens);

        overlay_bool("TRACE_ENABLED", &mut self.observability.trace_enabled);
        overlay_opt_string("AGENTIC_OTLP_ENDPOINT", &mut self.observability.otlp_endpoint);
    }

    /// Validate cross-field invariants not expressible as defaults alone.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.canary.enabled && !(0.0..=100.0).contains(&self.canary.percent) {
            issues.push(ConfigIssue::error(
                "canary.percent",
                format!("must be within [0, 100], got {}", self.canary.percent),
            ));
        }
        if self.canary.max_failure_rate < 0.0 || self.canary.max_failure_rate > 1.0 {
            issues.push(ConfigIssue::error(
                "canary.max_failure_rate",
                "must be within [0, 1]",
            ));
        }
        if self.tool.max_rounds == 0 {
            issues.push(ConfigIssue::warning(
                "tool.max_rounds",
                "0 disables the tool-call loop entirely; set tool.loop_enabled = false instead",
            ));
        }
        if self.critic.enabled && self.critic.max_loops == 0 {
            issues.push(ConfigIssue::warning(
                "critic.max_loops",
                "critic is enabled but max_loops is 0, so it will never run",
            ));
        }
        if self.manager_worker.enabled && self.manager_worker.max_workers == 0 {
            issues.push(ConfigIssue::error(
                "manager_worker.max_workers",
                "manager/worker mode is enabled but max_workers is 0",
            ));
        }
        if let Some(raw) = &self.tool.policy_json {
            if serde_json::from_str::<serde_json::Value>(raw).is_err() {
                issues.push(ConfigIssue::error("tool.policy_json", "not valid JSON"));
            }
        }
        if let Some(raw) = &self.validation.policy_json {
            if serde_json::from_str::<serde_json::Value>(raw).is_err() {
                issues.push(ConfigIssue::error("validation.policy_json", "not valid JSON"));
            }
        }
        if let Some(raw) = &self.tenant.policy_json {
            if serde_json::from_str::<serde_json::Value>(raw).is_err() {
                issues.push(ConfigIssue::error("tenant.policy_json", "not valid JSON"));
            }
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Error, field: field.into(), message: message.into() }
    }
    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Warning, field: field.into(), message: message.into() }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn overlay<T: FromStr>(var: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        if let Ok(parsed) = raw.parse() {
            *slot = parsed;
        }
    }
}

fn overlay_bool(var: &str, slot: &mut bool) {
    if let Ok(raw) = std::env::var(var) {
        *slot = matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
}

fn overlay_csv(var: &str, slot: &mut Vec<String>) {
    if let Ok(raw) = std::env::var(var) {
        *slot = raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    }
}

fn overlay_opt_string(var: &str, slot: &mut Option<String>) {
    if let Ok(raw) = std::env::var(var) {
        *slot = Some(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_clean() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error));
    }

    #[test]
    fn invalid_canary_percent_is_an_error() {
        let mut config = Config::default();
        config.canary.enabled = true;
        config.canary.percent = 150.0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.field == "canary.percent" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn malformed_policy_json_is_an_error() {
        let mut config = Config::default();
        config.tool.policy_json = Some("not json".into());
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.field == "tool.policy_json"));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let config = Config::load("/nonexistent/agentrt-config-test.toml").unwrap();
        assert_eq!(config.graph.max_parallel, 4);
    }
}
