use serde::{Deserialize, Serialize};

/// Per-packet report within a context pack build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub name: String,
    pub raw_chars: usize,
    pub injected_chars: usize,
    pub truncated_per_file: bool,
    pub truncated_total_cap: bool,
    pub included: bool,
    /// True if the node was expected to contribute a packet but produced none.
    pub missing: bool,
}

/// Full report of a context pack build -- returned alongside the assembled
/// text, and serialized into the trace for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextReport {
    pub files: Vec<FileReport>,
    pub total_injected_chars: usize,
    pub total_token_estimate: u32,
}
