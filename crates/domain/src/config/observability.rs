use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "d_trace_enabled")]
    pub trace_enabled: bool,
    /// OTLP collector endpoint (e.g. `http://localhost:4317`). When unset,
    /// tracing stays on the plain JSON-formatted subscriber with no
    /// exporter, even in builds compiled with the `otlp` feature.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            trace_enabled: d_trace_enabled(),
            otlp_endpoint: None,
        }
    }
}

fn d_trace_enabled() -> bool {
    true
}
