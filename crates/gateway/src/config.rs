//! Gateway-level config: the behavioral `AGENTIC_*` surface owned by
//! `agentrt_domain::config::Config`, plus the deployment/ambient config the
//! core deliberately treats as out of scope (§1's "CLI/transport glue" —
//! the LLM provider wiring and the HTTP bind address).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub core: agentrt_domain::config::Config,

    #[serde(default)]
    pub llm: agentrt_providers::LlmConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { host: d_host(), port: d_port(), api_token_env: d_api_token_env() }
    }
}

fn d_host() -> String {
    "0.0.0.0".to_string()
}
fn d_port() -> u16 {
    8080
}
fn d_api_token_env() -> String {
    "AGENTRT_API_TOKEN".to_string()
}

/// Where the state stores (canary, trace, transcript, ...) persist to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "d_state_path")]
    pub state_path: std::path::PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { state_path: d_state_path() }
    }
}

fn d_state_path() -> std::path::PathBuf {
    std::path::PathBuf::from("./state")
}

impl GatewayConfig {
    /// Load from `path` if it exists (TOML), falling back to defaults, then
    /// overlay the `AGENTIC_*`/legacy env surface on the embedded core config.
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config: GatewayConfig = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading {path:?}: {e}"))?;
            toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path:?}: {e}"))?
        } else {
            GatewayConfig::default()
        };
        config.core.apply_env_overrides();
        Ok(config)
    }
}
