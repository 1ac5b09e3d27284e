use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticConfig {
    #[serde(default = "d_enabled")]
    pub enabled: bool,
    #[serde(default = "d_max_loops")]
    pub max_loops: u32,
    #[serde(default = "d_min_score")]
    pub min_score: f64,
    #[serde(default = "d_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            enabled: d_enabled(),
            max_loops: d_max_loops(),
            min_score: d_min_score(),
            max_output_tokens: d_max_output_tokens(),
        }
    }
}

fn d_enabled() -> bool {
    true
}

fn d_max_loops() -> u32 {
    2
}

fn d_min_score() -> f64 {
    0.7
}

fn d_max_output_tokens() -> u32 {
    512
}
