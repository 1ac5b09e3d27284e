use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_timeout_chat_ms")]
    pub timeout_chat_ms: u64,
    #[serde(default = "d_chat_max_output_tokens")]
    pub chat_max_output_tokens: u32,
    #[serde(default = "d_coding_max_output_tokens")]
    pub coding_max_output_tokens: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeout_chat_ms: d_timeout_chat_ms(),
            chat_max_output_tokens: d_chat_max_output_tokens(),
            coding_max_output_tokens: d_coding_max_output_tokens(),
        }
    }
}

fn d_timeout_chat_ms() -> u64 {
    30_000
}
fn d_chat_max_output_tokens() -> u32 {
    1_024
}
fn d_coding_max_output_tokens() -> u32 {
    4_096
}
