//! External collaborator contracts (§6.1). The core depends only on these
//! traits; gateway/store/providers crates supply the concrete implementations.

use crate::blackboard::{Artifact, ContextPacket};
use crate::canary::CanaryStateRecord;
use crate::error::Result;
use crate::graph::AgentGraph;
use crate::tool::{Message, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<crate::tool::ToolCall>,
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
}

/// The sole collaborator the core calls to talk to a model (§6.1).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;
}

/// Resolves a logical model role (planner, critic, searcher, ...) to a
/// concrete provider/model pair, honoring the guarded fallback chain.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    async fn resolve(&self, role: &str) -> Result<(String, String)>;
}

/// Runs one context-graph node's underlying agent logic and returns the
/// context packets it produced, given the upstream artifacts it depends on.
/// The executor (§4.C) records one `Artifact` per returned packet.
#[async_trait]
pub trait ContextProviderRunner: Send + Sync {
    async fn run_node(
        &self,
        graph: &AgentGraph,
        node_id: &str,
        upstream: Vec<Artifact>,
    ) -> Result<Vec<ContextPacket>>;
}

/// Append-only structured trace sink (§4, every component).
#[async_trait]
pub trait TraceRepo: Send + Sync {
    async fn append(&self, trace_id: &str, event_json: String) -> Result<()>;
}

/// Persistence for canary rollout state, keyed by route (§4.A).
#[async_trait]
pub trait CanaryStateRepo: Send + Sync {
    async fn load(&self, route: &str) -> Result<Option<CanaryStateRecord>>;
    async fn save(&self, state: &CanaryStateRecord) -> Result<()>;
}

/// Stores compacted summaries produced by the search pipeline / critic loop.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn put(&self, key: &str, summary: String) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Fixed-capacity, append-only transcript ring per conversation (§3).
#[async_trait]
pub trait TranscriptRingBuffer: Send + Sync {
    async fn append(&self, conversation_id: &str, message: Message) -> Result<()>;
    async fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>>;
}

/// Per-tenant tool policy overlay (§4.B).
#[async_trait]
pub trait TenantPolicyRepo: Send + Sync {
    async fn allowlist(&self, tenant_id: &str) -> Result<Vec<String>>;
    async fn blocklist(&self, tenant_id: &str) -> Result<Vec<String>>;
}

/// Per-guild/workspace settings overlay (response formatting, routing hints).
#[async_trait]
pub trait GuildSettingsRepo: Send + Sync {
    async fn setting(&self, guild_id: &str, key: &str) -> Result<Option<String>>;
}
