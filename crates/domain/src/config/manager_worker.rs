use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerWorkerConfig {
    #[serde(default = "d_enabled")]
    pub enabled: bool,
    #[serde(default = "d_max_workers")]
    pub max_workers: u32,
    #[serde(default = "d_max_planner_loops")]
    pub max_planner_loops: u32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_min_complexity_score")]
    pub min_complexity_score: f64,
}

impl Default for ManagerWorkerConfig {
    fn default() -> Self {
        Self {
            enabled: d_enabled(),
            max_workers: d_max_workers(),
            max_planner_loops: d_max_planner_loops(),
            max_tokens: d_max_tokens(),
            max_input_chars: d_max_input_chars(),
            timeout_ms: d_timeout_ms(),
            min_complexity_score: d_min_complexity_score(),
        }
    }
}

fn d_enabled() -> bool {
    false
}
fn d_max_workers() -> u32 {
    3
}
fn d_max_planner_loops() -> u32 {
    2
}
fn d_max_tokens() -> u32 {
    2_000
}
fn d_max_input_chars() -> usize {
    8_000
}
fn d_timeout_ms() -> u64 {
    60_000
}
fn d_min_complexity_score() -> f64 {
    0.6
}
