use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Raw JSON map of tenant id to {allowlist, blocklist} overlay.
    #[serde(default)]
    pub policy_json: Option<String>,
}
