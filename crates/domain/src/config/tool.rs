use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "d_loop_enabled")]
    pub loop_enabled: bool,
    #[serde(default = "d_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "d_max_calls_per_round")]
    pub max_calls_per_round: u32,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_result_max_chars")]
    pub result_max_chars: usize,
    #[serde(default = "d_parallel_read_only_enabled")]
    pub parallel_read_only_enabled: bool,
    #[serde(default = "d_max_parallel_read_only")]
    pub max_parallel_read_only: usize,
    #[serde(default = "d_hard_gate_enabled")]
    pub hard_gate_enabled: bool,
    #[serde(default = "d_hard_gate_min_successful_calls")]
    pub hard_gate_min_successful_calls: u32,
    #[serde(default = "d_allow_network_read")]
    pub allow_network_read: bool,
    #[serde(default = "d_allow_external_write")]
    pub allow_external_write: bool,
    #[serde(default = "d_allow_high_risk")]
    pub allow_high_risk: bool,
    #[serde(default)]
    pub blocklist: Vec<String>,
    /// Raw JSON risk-class policy overlay, merged by `ToolPolicy` at startup.
    #[serde(default)]
    pub policy_json: Option<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            loop_enabled: d_loop_enabled(),
            max_rounds: d_max_rounds(),
            max_calls_per_round: d_max_calls_per_round(),
            timeout_ms: d_timeout_ms(),
            result_max_chars: d_result_max_chars(),
            parallel_read_only_enabled: d_parallel_read_only_enabled(),
            max_parallel_read_only: d_max_parallel_read_only(),
            hard_gate_enabled: d_hard_gate_enabled(),
            hard_gate_min_successful_calls: d_hard_gate_min_successful_calls(),
            allow_network_read: d_allow_network_read(),
            allow_external_write: d_allow_external_write(),
            allow_high_risk: d_allow_high_risk(),
            blocklist: Vec::new(),
            policy_json: None,
        }
    }
}

fn d_loop_enabled() -> bool {
    true
}
fn d_max_rounds() -> u32 {
    6
}
fn d_max_calls_per_round() -> u32 {
    4
}
fn d_timeout_ms() -> u64 {
    20_000
}
fn d_result_max_chars() -> usize {
    4_000
}
fn d_parallel_read_only_enabled() -> bool {
    true
}
fn d_max_parallel_read_only() -> usize {
    4
}
fn d_hard_gate_enabled() -> bool {
    false
}
fn d_hard_gate_min_successful_calls() -> u32 {
    1
}
fn d_allow_network_read() -> bool {
    true
}
fn d_allow_external_write() -> bool {
    false
}
fn d_allow_high_risk() -> bool {
    false
}
