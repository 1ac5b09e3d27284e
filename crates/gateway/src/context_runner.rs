//! The context graph's sole collaborator (§6.1 `ContextProviderRunner`):
//! dispatches one graph node by calling the LLM with the node's objective
//! and its upstream artifacts folded in as context, then wraps the reply in
//! a single `ContextPacket` via the shared `contextpack` builder.
//!
//! Individual tool-backed context providers (web search, scraping, package
//! lookups) are out of scope (§1) — every node here resolves to one LLM
//! call, addressed by `node.agent` as a role, exactly like the core's main
//! pass addresses a role through `orchestrator::main_pass_role`.

use agentrt_contextpack::build_packet;
use agentrt_domain::blackboard::{Artifact, ContextPacket};
use agentrt_domain::collab::{ChatRequest, ContextProviderRunner, LlmClient};
use agentrt_domain::error::Result;
use agentrt_domain::graph::AgentGraph;
use agentrt_domain::tool::Message;
use async_trait::async_trait;

const PACKET_MAX_CHARS: usize = 16_000;

pub struct LlmContextProviderRunner<'a> {
    llm: &'a dyn LlmClient,
}

impl<'a> LlmContextProviderRunner<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl<'a> ContextProviderRunner for LlmContextProviderRunner<'a> {
    async fn run_node(
        &self,
        graph: &AgentGraph,
        node_id: &str,
        upstream: Vec<Artifact>,
    ) -> Result<Vec<ContextPacket>> {
        let node = graph
            .nodes
            .iter()
            .find(|n| n.id == node_id)
            .ok_or_else(|| agentrt_domain::error::CoreError::Graph(format!("unknown node: {node_id}")))?;

        let mut prompt = format!("Objective: {}\n", node.objective);
        if !node.success_criteria.is_empty() {
            prompt.push_str(&format!("Success criteria: {}\n", node.success_criteria));
        }
        for artifact in &upstream {
            prompt.push_str(&format!("\n--- upstream: {} ---\n{}\n", artifact.label, artifact.content));
        }

        let resp = self
            .llm
            .chat(ChatRequest {
                model: node.agent.clone(),
                messages: vec![Message::user(prompt)],
                tools: vec![],
                temperature: Some(0.2),
                max_tokens: node.budget.max_output_tokens,
            })
            .await?;

        let (packet, _truncated) = build_packet(&node.id, &resp.content, PACKET_MAX_CHARS);
        Ok(vec![packet])
    }
}
