//! Tool registry (§4.B, §3.1): catalog of available tools plus per-call
//! argument validation (size + JSON schema).

use agentrt_domain::error::{CoreError, Result};
use agentrt_domain::tool::ToolDefinition;
use async_trait::async_trait;
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-call execution context threaded through to every tool executor.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub trace_id: String,
    pub tenant_id: Option<String>,
    pub route: String,
}

#[derive(Debug, Clone)]
pub struct ToolExecResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ToolExecResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: Some(output.into()), error: None }
    }
    pub fn err(message: impl Into<String>) -> Self {
        Self { success: false, output: None, error: Some(message.into()) }
    }
}

/// Modeled as a capability (validate implicit via the registry's schema,
/// execute here) rather than via inheritance, matching the teacher's
/// `LlmProvider`-style trait-over-base-class idiom.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolExecResult;
}

const MAX_ARGS_BYTES: usize = 10 * 1024;

struct RegisteredTool {
    definition: ToolDefinition,
    schema: Validator,
    executor: Arc<dyn ToolExecutor>,
}

/// Effectively immutable after startup (§5): built once, then only read.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

#[derive(Debug, Clone)]
pub struct ValidatedCall {
    pub name: String,
    pub args: Value,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Fails with `CoreError::Validation("duplicate_tool: ...")` if `def.name`
    /// is already registered (§4.B registry contract).
    pub fn register(&mut self, def: ToolDefinition, executor: Arc<dyn ToolExecutor>) -> Result<()> {
        if self.tools.contains_key(&def.name) {
            return Err(CoreError::Validation(format!("duplicate_tool: {}", def.name)));
        }
        let schema = jsonschema::validator_for(&def.parameters)
            .map_err(|e| CoreError::Validation(format!("invalid schema for tool '{}': {e}", def.name)))?;
        let name = def.name.clone();
        self.tools.insert(name, RegisteredTool { definition: def, schema, executor });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn executor(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.tools.get(name).map(|t| t.executor.clone())
    }

    /// `validateCall` (§4.B): name known, args serializable and ≤ 10 KiB,
    /// args pass the tool's JSON schema.
    pub fn validate_call(&self, name: &str, args: &Value) -> Result<ValidatedCall> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| CoreError::Validation(format!("unknown tool: {name}")))?;

        let serialized = serde_json::to_vec(args)?;
        if serialized.len() > MAX_ARGS_BYTES {
            return Err(CoreError::Validation(format!(
                "tool '{name}' arguments exceed {MAX_ARGS_BYTES} bytes after serialization"
            )));
        }

        if let Err(e) = tool.schema.validate(args) {
            return Err(CoreError::Validation(format!("tool '{name}' arguments failed schema: {e}")));
        }

        Ok(ValidatedCall { name: name.to_string(), args: args.clone() })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::tool::RiskClass;

    struct EchoExecutor;
    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolExecResult {
            ToolExecResult::ok(args.to_string())
        }
    }

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: "test tool".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
            risk_class: RiskClass::Benign,
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(def("search"), Arc::new(EchoExecutor)).unwrap();
        let err = registry.register(def("search"), Arc::new(EchoExecutor)).unwrap_err();
        assert!(err.to_string().contains("duplicate_tool"));
    }

    #[test]
    fn validate_call_rejects_unknown_tool() {
        let registry = ToolRegistry::new();
        assert!(registry.validate_call("ghost", &serde_json::json!({})).is_err());
    }

    #[test]
    fn validate_call_rejects_schema_violation() {
        let mut registry = ToolRegistry::new();
        registry.register(def("search"), Arc::new(EchoExecutor)).unwrap();
        let err = registry.validate_call("search", &serde_json::json!({})).unwrap_err();
        assert!(err.to_string().contains("schema"));
    }

    #[test]
    fn validate_call_accepts_matching_args() {
        let mut registry = ToolRegistry::new();
        registry.register(def("search"), Arc::new(EchoExecutor)).unwrap();
        let validated = registry.validate_call("search", &serde_json::json!({"query": "rust"})).unwrap();
        assert_eq!(validated.name, "search");
    }

    #[test]
    fn oversized_args_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(def("search"), Arc::new(EchoExecutor)).unwrap();
        let huge = "x".repeat(MAX_ARGS_BYTES + 1);
        let args = serde_json::json!({"query": huge});
        let err = registry.validate_call("search", &args).unwrap_err();
        assert!(err.to_string().contains("exceed"));
    }
}
