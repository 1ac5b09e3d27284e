use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "d_max_attempts_simple")]
    pub max_attempts_simple: u32,
    #[serde(default = "d_max_attempts_complex")]
    pub max_attempts_complex: u32,
    #[serde(default = "d_timeout_search_ms")]
    pub timeout_search_ms: u64,
    #[serde(default = "d_timeout_search_scraper_ms")]
    pub timeout_search_scraper_ms: u64,
    #[serde(default = "d_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_attempts_simple: d_max_attempts_simple(),
            max_attempts_complex: d_max_attempts_complex(),
            timeout_search_ms: d_timeout_search_ms(),
            timeout_search_scraper_ms: d_timeout_search_scraper_ms(),
            max_output_tokens: d_max_output_tokens(),
        }
    }
}

fn d_max_attempts_simple() -> u32 {
    2
}
fn d_max_attempts_complex() -> u32 {
    4
}
fn d_timeout_search_ms() -> u64 {
    15_000
}
fn d_timeout_search_scraper_ms() -> u64 {
    10_000
}
fn d_max_output_tokens() -> u32 {
    1_024
}
