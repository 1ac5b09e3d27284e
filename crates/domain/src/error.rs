//! The shared error taxonomy.
//!
//! Every fallible operation in the core eventually maps onto one of these
//! variants. `validation` and `policy` are recoverable (surfaced back to the
//! model or caller for self-correction); the rest either retry under budget
//! or terminate the turn with one of the [`sentinels`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    /// Schema, size, or protocol violation (tool args, envelope shape, graph shape).
    #[error("validation: {0}")]
    Validation(String),

    /// A per-call or per-node deadline was exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Tool/risk policy denied a call.
    #[error("policy: {0}")]
    Policy(String),

    /// A tool executed but failed at runtime.
    #[error("execution: {0}")]
    Execution(String),

    /// The LLM call itself failed (transport, rate limit, malformed response).
    #[error("model: {0}")]
    Model(String),

    /// An external collaborator (trace repo, context provider, ...) failed.
    #[error("dependency: {0}")]
    Dependency(String),

    /// The context graph is unreachable or invalid.
    #[error("graph: {0}")]
    Graph(String),

    /// The hard-evidence gate was not satisfied.
    #[error("hard_gate: {0}")]
    HardGate(String),

    /// The canary state store is unavailable.
    #[error("persistence: {0}")]
    Persistence(String),

    #[error("io: {0}")]
    Io(String),

    #[error("config: {0}")]
    Config(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Validation(format!("json: {e}"))
    }
}

/// Canonical user-visible failure strings. Never inline these at call sites —
/// every emission site and every test assertion references these constants so
/// the wording can only drift in one place.
pub mod sentinels {
    pub const TRANSPORT_FAILURE: &str =
        "I'm having trouble connecting right now. Please try again later.";

    pub const HARD_GATE_REFUSAL: &str = "I couldn't verify this with tools right now, so I won't \
         provide an unverified answer. Please try again.";

    pub const TOOL_LOOP_FINALIZATION_FAILURE: &str =
        "I could not finalize a plain-text answer after tool execution. Please try again.";

    pub const VALIDATOR_BLOCK: &str = "I couldn't safely validate this response against runtime \
         checks, so I won't provide a potentially incorrect answer right now. Please try again.";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_lowercase_tagged() {
        assert_eq!(
            CoreError::Validation("bad arg".into()).to_string(),
            "validation: bad arg"
        );
        assert_eq!(
            CoreError::HardGate("unmet".into()).to_string(),
            "hard_gate: unmet"
        );
    }

    #[test]
    fn sentinels_are_stable() {
        assert!(sentinels::HARD_GATE_REFUSAL.contains("won't"));
        assert!(sentinels::TOOL_LOOP_FINALIZATION_FAILURE.ends_with("try again."));
    }
}
