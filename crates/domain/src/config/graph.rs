use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "d_parallel_enabled")]
    pub parallel_enabled: bool,
    #[serde(default = "d_max_parallel")]
    pub max_parallel: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            parallel_enabled: d_parallel_enabled(),
            max_parallel: d_max_parallel(),
        }
    }
}

fn d_parallel_enabled() -> bool {
    true
}

fn d_max_parallel() -> usize {
    4
}
