//! Tool risk policy (§4.B): layered merge (legacy env defaults ← global JSON
//! ← tenant JSON) plus per-call risk-class gating and route-scoped
//! allowlisting of advertised tools.

use agentrt_domain::collab::TenantPolicyRepo;
use agentrt_domain::config::ToolConfig;
use agentrt_domain::error::{CoreError, Result};
use agentrt_domain::tool::RiskClass;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyCode {
    Allow,
    AllowUnconfigured,
    NetworkReadDisabled,
    DataExfiltrationRiskDisabled,
    ExternalWriteDisabled,
    HighRiskDisabled,
    ToolBlocked,
    MaxCallsPerRoundTruncated,
}

impl PolicyCode {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyCode::Allow => "allow",
            PolicyCode::AllowUnconfigured => "allow_unconfigured",
            PolicyCode::NetworkReadDisabled => "network_read_disabled",
            PolicyCode::DataExfiltrationRiskDisabled => "data_exfiltration_risk_disabled",
            PolicyCode::ExternalWriteDisabled => "external_write_disabled",
            PolicyCode::HighRiskDisabled => "high_risk_disabled",
            PolicyCode::ToolBlocked => "tool_blocked",
            PolicyCode::MaxCallsPerRoundTruncated => "max_calls_per_round_truncated",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub code: PolicyCode,
}

/// Raw shape of the global/tenant JSON policy overlay (§4.B). Every field is
/// optional so a layer may leave a flag untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyOverlay {
    #[serde(default)]
    allow_network_read: Option<bool>,
    #[serde(default)]
    allow_data_exfiltration_risk: Option<bool>,
    #[serde(default)]
    allow_external_write: Option<bool>,
    #[serde(default)]
    allow_high_risk: Option<bool>,
    #[serde(default)]
    blocked_tools: Vec<String>,
    #[serde(default)]
    risk_overrides: HashMap<String, RiskClass>,
    #[serde(default)]
    route_allowlists: HashMap<String, Vec<String>>,
}

/// Raw shape of the `tenant.policy_json` overlay (§4.B): a JSON map of
/// tenant id to `{allowlist, blocklist}`, configured at deploy time ahead of
/// the store-backed `TenantPolicyRepo` override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantPolicyOverlayEntry {
    #[serde(default)]
    allowlist: Vec<String>,
    #[serde(default)]
    blocklist: Vec<String>,
}

/// The fully merged policy in effect for one turn.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    allow_network_read: bool,
    allow_data_exfiltration_risk: bool,
    allow_external_write: bool,
    allow_high_risk: bool,
    blocked_tools: HashSet<String>,
    risk_overrides: HashMap<String, RiskClass>,
    route_allowlists: HashMap<String, Vec<String>>,
}

impl ToolPolicy {
    /// Merge legacy env defaults (`ToolConfig`) ← global JSON ← tenant JSON
    /// (`tenant.policy_json`) ← tenant store (`TenantPolicyRepo`), mirroring
    /// `domain::config::Config`'s TOML + env layering, scoped here to the
    /// tool policy. The store layer is authoritative and applied last.
    pub async fn resolve(
        tool_config: &ToolConfig,
        tenant_id: Option<&str>,
        tenant_repo: &dyn TenantPolicyRepo,
        tenant_policy_json: Option<&str>,
    ) -> Result<Self> {
        let mut policy = ToolPolicy {
            allow_network_read: tool_config.allow_network_read,
            allow_data_exfiltration_risk: true,
            allow_external_write: tool_config.allow_external_write,
            allow_high_risk: tool_config.allow_high_risk,
            blocked_tools: tool_config.blocklist.iter().cloned().collect(),
            risk_overrides: HashMap::new(),
            route_allowlists: HashMap::new(),
        };

        if let Some(raw) = &tool_config.policy_json {
            let overlay: PolicyOverlay = serde_json::from_str(raw)
                .map_err(|e| CoreError::Config(format!("tool.policy_json: {e}")))?;
            policy.apply_overlay(overlay);
        }

        let mut tenant_allow = Vec::new();
        let mut tenant_block = Vec::new();

        if let (Some(tenant_id), Some(raw)) = (tenant_id, tenant_policy_json) {
            let overlay: HashMap<String, TenantPolicyOverlayEntry> = serde_json::from_str(raw)
                .map_err(|e| CoreError::Config(format!("tenant.policy_json: {e}")))?;
            if let Some(entry) = overlay.get(tenant_id) {
                tenant_allow.extend(entry.allowlist.iter().cloned());
                tenant_block.extend(entry.blocklist.iter().cloned());
            }
        }

        if let Some(tenant_id) = tenant_id {
            tenant_allow.extend(tenant_repo.allowlist(tenant_id).await?);
            tenant_block.extend(tenant_repo.blocklist(tenant_id).await?);
        }

        if !tenant_allow.is_empty() {
            policy.route_allowlists.insert("__tenant_allowlist".into(), tenant_allow);
        }
        policy.blocked_tools.extend(tenant_block);

        Ok(policy)
    }

    fn apply_overlay(&mut self, overlay: PolicyOverlay) {
        if let Some(v) = overlay.allow_network_read {
            self.allow_network_read = v;
        }
        if let Some(v) = overlay.allow_data_exfiltration_risk {
            self.allow_data_exfiltration_risk = v;
        }
        if let Some(v) = overlay.allow_external_write {
            self.allow_external_write = v;
        }
        if let Some(v) = overlay.allow_high_risk {
            self.allow_high_risk = v;
        }
        self.blocked_tools.extend(overlay.blocked_tools);
        self.risk_overrides.extend(overlay.risk_overrides);
        self.route_allowlists.extend(overlay.route_allowlists);
    }

    fn effective_class(&self, tool_name: &str, def_class: RiskClass) -> (RiskClass, bool) {
        match self.risk_overrides.get(tool_name) {
            Some(class) => (*class, true),
            None => (def_class, false),
        }
    }

    /// The risk class actually in effect for `tool_name` once overrides are
    /// applied, used by the tool loop to decide read-only-concurrent vs.
    /// mutating-sequential dispatch.
    pub fn effective_risk_class(&self, tool_name: &str, def_class: RiskClass) -> RiskClass {
        self.effective_class(tool_name, def_class).0
    }

    /// `evaluate` (§4.B): blocklist first, then by class from most to least
    /// restrictive.
    pub fn evaluate(&self, tool_name: &str, def_class: RiskClass) -> PolicyDecision {
        if self.blocked_tools.contains(tool_name) {
            return PolicyDecision { allowed: false, code: PolicyCode::ToolBlocked };
        }

        let (class, explicit) = self.effective_class(tool_name, def_class);
        let deny_code = match class {
            RiskClass::HighRisk if !self.allow_high_risk => Some(PolicyCode::HighRiskDisabled),
            RiskClass::ExternalWrite if !self.allow_external_write => Some(PolicyCode::ExternalWriteDisabled),
            RiskClass::DataExfiltrationRisk if !self.allow_data_exfiltration_risk => {
                Some(PolicyCode::DataExfiltrationRiskDisabled)
            }
            RiskClass::NetworkRead if !self.allow_network_read => Some(PolicyCode::NetworkReadDisabled),
            _ => None,
        };

        match deny_code {
            Some(code) => PolicyDecision { allowed: false, code },
            None if explicit => PolicyDecision { allowed: true, code: PolicyCode::Allow },
            None => PolicyDecision { allowed: true, code: PolicyCode::AllowUnconfigured },
        }
    }

    /// Route-scoped allowlist: if no allowlist is configured for `route`,
    /// every tool is advertised; otherwise only members are.
    pub fn allowed_for_route(&self, route: &str, tool_name: &str) -> bool {
        let mut allowed = match self.route_allowlists.get(route) {
            Some(names) => names.iter().any(|n| n == tool_name),
            None => true,
        };
        if let Some(tenant_names) = self.route_allowlists.get("__tenant_allowlist") {
            allowed = allowed && tenant_names.iter().any(|n| n == tool_name);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

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

    #[tokio::test]
    async fn blocklist_takes_precedence_over_risk_class() {
        let mut config = ToolConfig::default();
        config.blocklist = vec!["exec".into()];
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();
        let decision = policy.evaluate("exec", RiskClass::Benign);
        assert!(!decision.allowed);
        assert_eq!(decision.code.as_str(), "tool_blocked");
    }

    #[tokio::test]
    async fn high_risk_denied_by_default() {
        let config = ToolConfig::default();
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();
        let decision = policy.evaluate("shell", RiskClass::HighRisk);
        assert!(!decision.allowed);
        assert_eq!(decision.code.as_str(), "high_risk_disabled");
    }

    #[tokio::test]
    async fn benign_tool_is_allowed_unconfigured() {
        let config = ToolConfig::default();
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();
        let decision = policy.evaluate("read_doc", RiskClass::Benign);
        assert!(decision.allowed);
        assert_eq!(decision.code.as_str(), "allow_unconfigured");
    }

    #[tokio::test]
    async fn global_json_overlay_raises_risk_class() {
        let mut config = ToolConfig::default();
        config.policy_json = Some(
            serde_json::json!({"riskOverrides": {"fetch": "high_risk"}}).to_string(),
        );
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();
        let decision = policy.evaluate("fetch", RiskClass::Benign);
        assert!(!decision.allowed);
        assert_eq!(decision.code.as_str(), "high_risk_disabled");
    }

    #[tokio::test]
    async fn route_without_allowlist_permits_all_tools() {
        let config = ToolConfig::default();
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();
        assert!(policy.allowed_for_route("chat", "anything"));
    }

    #[tokio::test]
    async fn route_allowlist_restricts_membership() {
        let mut config = ToolConfig::default();
        config.policy_json = Some(
            serde_json::json!({"routeAllowlists": {"search": ["web_search"]}}).to_string(),
        );
        let policy = ToolPolicy::resolve(&config, None, &NoopTenantRepo, None).await.unwrap();
        assert!(policy.allowed_for_route("search", "web_search"));
        assert!(!policy.allowed_for_route("search", "exec"));
    }

    #[tokio::test]
    async fn tenant_json_overlay_blocks_tool_for_matching_tenant() {
        let config = ToolConfig::default();
        let tenant_policy = serde_json::json!({"acme": {"blocklist": ["exec"]}}).to_string();
        let policy = ToolPolicy::resolve(&config, Some("acme"), &NoopTenantRepo, Some(&tenant_policy))
            .await
            .unwrap();
        let decision = policy.evaluate("exec", RiskClass::Benign);
        assert!(!decision.allowed);
        assert_eq!(decision.code.as_str(), "tool_blocked");
    }

    #[tokio::test]
    async fn tenant_json_overlay_ignores_other_tenants() {
        let config = ToolConfig::default();
        let tenant_policy = serde_json::json!({"other": {"blocklist": ["exec"]}}).to_string();
        let policy = ToolPolicy::resolve(&config, Some("acme"), &NoopTenantRepo, Some(&tenant_policy))
            .await
            .unwrap();
        let decision = policy.evaluate("exec", RiskClass::Benign);
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn tenant_json_allowlist_restricts_route_membership() {
        let config = ToolConfig::default();
        let tenant_policy = serde_json::json!({"acme": {"allowlist": ["web_search"]}}).to_string();
        let policy = ToolPolicy::resolve(&config, Some("acme"), &NoopTenantRepo, Some(&tenant_policy))
            .await
            .unwrap();
        assert!(policy.allowed_for_route("search", "web_search"));
        assert!(!policy.allowed_for_route("search", "exec"));
    }
}
