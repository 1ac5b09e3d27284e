use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryConfig {
    #[serde(default = "d_enabled")]
    pub enabled: bool,
    #[serde(default = "d_percent")]
    pub percent: f64,
    #[serde(default)]
    pub route_allowlist: Vec<String>,
    #[serde(default = "d_max_failure_rate")]
    pub max_failure_rate: f64,
    #[serde(default = "d_min_samples")]
    pub min_samples: usize,
    #[serde(default = "d_cooldown_sec")]
    pub cooldown_sec: u64,
    #[serde(default = "d_window_size")]
    pub window_size: usize,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            enabled: d_enabled(),
            percent: d_percent(),
            route_allowlist: Vec::new(),
            max_failure_rate: d_max_failure_rate(),
            min_samples: d_min_samples(),
            cooldown_sec: d_cooldown_sec(),
            window_size: d_window_size(),
        }
    }
}

fn d_enabled() -> bool {
    false
}

fn d_percent() -> f64 {
    5.0
}

fn d_max_failure_rate() -> f64 {
    0.2
}

fn d_min_samples() -> usize {
    20
}

fn d_cooldown_sec() -> u64 {
    300
}

fn d_window_size() -> usize {
    100
}
