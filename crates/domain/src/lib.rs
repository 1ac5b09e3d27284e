//! Shared types for the agent runtime: data model, error taxonomy, trace
//! events, and the collaborator trait contracts the core depends on.

pub mod blackboard;
pub mod canary;
pub mod capability;
pub mod collab;
pub mod config;
pub mod error;
pub mod graph;
pub mod stream;
pub mod tool;
pub mod trace;

pub use blackboard::{Artifact, ArtifactKind, Blackboard, BlackboardCounters, BinaryAttachment, ContextPacket};
pub use canary::{CanaryOutcome, CanaryStateRecord, CanaryWindowEntry};
pub use capability::{LlmCapabilities, ModelRole, ToolSupport};
pub use collab::{
    CanaryStateRepo, ChatRequest, ChatResponse, ContextProviderRunner, GuildSettingsRepo,
    LlmClient, ModelResolver, SummaryStore, TenantPolicyRepo, TraceRepo, TranscriptRingBuffer,
};
pub use config::Config;
pub use error::{CoreError, Result};
pub use graph::{AgentGraph, GraphEdge, GraphIssue, GraphNode, NodeBudget};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tool::{
    ContentPart, EnvelopeCall, EnvelopeKind, Message, MessageContent, RiskClass, Role, ToolCall,
    ToolCallEnvelope, ToolDefinition, ToolResult,
};
pub use trace::TraceEvent;
