use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "d_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub policy_json: Option<String>,
    #[serde(default = "d_auto_repair_enabled")]
    pub auto_repair_enabled: bool,
    #[serde(default = "d_auto_repair_max_attempts")]
    pub auto_repair_max_attempts: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: d_enabled(),
            policy_json: None,
            auto_repair_enabled: d_auto_repair_enabled(),
            auto_repair_max_attempts: d_auto_repair_max_attempts(),
        }
    }
}

fn d_enabled() -> bool {
    true
}

fn d_auto_repair_enabled() -> bool {
    true
}

fn d_auto_repair_max_attempts() -> u32 {
    1
}
