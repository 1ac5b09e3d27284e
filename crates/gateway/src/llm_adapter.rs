//! Adapts the role-aware [`agentrt_providers::LlmRouter`] to the core's
//! narrow, role-agnostic `LlmClient` contract (§6.1) — the core addresses a
//! model purely by the role string it puts in `ChatRequest.model`
//! (`orchestrator::main_pass_role`'s `"executor"`/`"reasoning"`/caller-chosen
//! role), and the router resolves that role to a provider/model pair.

use agentrt_domain::collab::{ChatRequest as CoreChatRequest, ChatResponse as CoreChatResponse, LlmClient};
use agentrt_domain::error::Result;
use agentrt_providers::LlmRouter;
use async_trait::async_trait;

pub struct RouterLlmClient {
    router: LlmRouter,
}

impl RouterLlmClient {
    pub fn new(router: LlmRouter) -> Self {
        Self { router }
    }
}

#[async_trait]
impl LlmClient for RouterLlmClient {
    async fn chat(&self, req: CoreChatRequest) -> Result<CoreChatResponse> {
        let role = req.model.clone();
        let provider_req = agentrt_providers::ChatRequest {
            messages: req.messages,
            tools: req.tools,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            json_mode: false,
            model: None,
        };
        let resp = self.router.chat_for_role(&role, provider_req).await?;
        Ok(CoreChatResponse {
            content: resp.content,
            tool_calls: resp.tool_calls,
            prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
        })
    }
}
