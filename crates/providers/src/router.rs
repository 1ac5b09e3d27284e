//! Capability-driven LLM router.
//!
//! The router selects providers and models based on role requirements
//! (tools, JSON mode, streaming) and handles automatic fallback when the
//! primary model fails with a timeout or transport error. "Role" here is any
//! logical label the caller defines — a config role (`planner`, `critic`)
//! or a guarded search candidate — not a fixed enum.

use crate::config::{LlmConfig, RoleConfig};
use crate::registry::ProviderRegistry;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use agentrt_domain::capability::{LlmCapabilities, ToolSupport};
use agentrt_domain::error::{CoreError, Result};
use agentrt_domain::trace::TraceEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub struct LlmRouter {
    registry: ProviderRegistry,
    role_configs: HashMap<String, RoleConfig>,
    default_timeout_ms: u64,
}

impl LlmRouter {
    pub fn from_config(llm_config: &LlmConfig) -> Result<Self> {
        let registry = ProviderRegistry::from_config(llm_config)?;
        Ok(Self {
            registry,
            role_configs: llm_config.roles.clone(),
            default_timeout_ms: llm_config.default_timeout_ms,
        })
    }

    pub fn new(
        registry: ProviderRegistry,
        role_configs: HashMap<String, RoleConfig>,
        default_timeout_ms: u64,
    ) -> Self {
        Self { registry, role_configs, default_timeout_ms }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Send a chat request for a given role. The router:
    ///
    /// 1. Resolves the primary model from the role config.
    /// 2. Validates that the provider satisfies the required capabilities.
    /// 3. Sends the request.
    /// 4. On timeout or provider error, falls back to the next configured
    ///    fallback model.
    /// 5. Emits `TraceEvent::LlmRequest` and `TraceEvent::LlmFallback`.
    pub async fn chat_for_role(&self, role: &str, mut req: ChatRequest) -> Result<ChatResponse> {
        let role_cfg = self
            .role_configs
            .get(role)
            .ok_or_else(|| CoreError::Config(format!("no role config for '{role}'")))?;

        let (provider_id, model_name) = resolve_model(&role_cfg.model);
        if let Some(provider) = self.registry.get(provider_id) {
            if Self::check_capabilities(provider.capabilities(), role_cfg) {
                req.model = Some(model_name.to_string());
                let start = Instant::now();
                let result = self.try_chat(&provider, &req).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match &result {
                    Ok(resp) => {
                        emit_request(provider_id, model_name, role, duration_ms, resp);
                        return result;
                    }
                    Err(e) if Self::is_retriable(e) => {
                        tracing::warn!(provider = %provider_id, model = %model_name, error = %e, "primary model failed, trying fallbacks");
                    }
                    Err(_) => {
                        emit_request_failed(provider_id, model_name, role, duration_ms);
                        return result;
                    }
                }
            } else {
                tracing::warn!(provider = %provider_id, model = %model_name, "primary model does not satisfy required capabilities, trying fallbacks");
            }
        } else {
            tracing::warn!(provider = %provider_id, "primary provider not found in registry, trying fallbacks");
        }

        for (idx, fallback) in role_cfg.fallbacks.iter().enumerate() {
            let (fb_provider_id, fb_model_name) = resolve_model(&fallback.model);
            let fb_provider = match self.registry.get(fb_provider_id) {
                Some(p) => p,
                None => {
                    tracing::warn!(provider = %fb_provider_id, "fallback provider not found, skipping");
                    continue;
                }
            };

            let cap = fb_provider.capabilities();
            if fallback.require_tools && cap.supports_tools == ToolSupport::None {
                tracing::warn!(provider = %fb_provider_id, "fallback does not support tools, skipping");
                continue;
            }
            if fallback.require_json && !cap.supports_json_mode {
                tracing::warn!(provider = %fb_provider_id, "fallback does not support JSON mode, skipping");
                continue;
            }

            TraceEvent::LlmFallback {
                from_provider: provider_id.to_string(),
                from_model: model_name.to_string(),
                to_provider: fb_provider_id.to_string(),
                to_model: fb_model_name.to_string(),
                reason: "primary model failed or unavailable".to_string(),
            }
            .emit();

            req.model = Some(fb_model_name.to_string());
            let start = Instant::now();
            let result = self.try_chat(&fb_provider, &req).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(resp) => {
                    emit_request(fb_provider_id, fb_model_name, role, duration_ms, resp);
                    return result;
                }
                Err(e) if Self::is_retriable(e) => {
                    tracing::warn!(provider = %fb_provider_id, model = %fb_model_name, error = %e, fallback_index = %idx, "fallback model failed, trying next");
                    continue;
                }
                Err(_) => {
                    emit_request_failed(fb_provider_id, fb_model_name, role, duration_ms);
                    return result;
                }
            }
        }

        Err(CoreError::Model(format!(
            "all models for role '{role}' failed or were unavailable"
        )))
    }

    async fn try_chat(&self, provider: &Arc<dyn LlmProvider>, req: &ChatRequest) -> Result<ChatResponse> {
        let timeout = std::time::Duration::from_millis(self.default_timeout_ms);
        match tokio::time::timeout(timeout, provider.chat(req.clone())).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout(format!(
                "provider '{}' timed out after {}ms",
                provider.provider_id(),
                self.default_timeout_ms
            ))),
        }
    }

    fn check_capabilities(cap: &LlmCapabilities, role_cfg: &RoleConfig) -> bool {
        if role_cfg.require_tools && cap.supports_tools == ToolSupport::None {
            return false;
        }
        if role_cfg.require_json && !cap.supports_json_mode {
            return false;
        }
        if role_cfg.require_streaming && !cap.supports_streaming {
            return false;
        }
        true
    }

    fn is_retriable(err: &CoreError) -> bool {
        matches!(err, CoreError::Timeout(_) | CoreError::Model(_))
    }
}

fn emit_request(provider: &str, model: &str, role: &str, duration_ms: u64, resp: &ChatResponse) {
    TraceEvent::LlmRequest {
        provider: provider.to_string(),
        model: model.to_string(),
        role: role.to_string(),
        streaming: false,
        duration_ms,
        prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
        completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
    }
    .emit();
}

fn emit_request_failed(provider: &str, model: &str, role: &str, duration_ms: u64) {
    TraceEvent::LlmRequest {
        provider: provider.to_string(),
        model: model.to_string(),
        role: role.to_string(),
        streaming: false,
        duration_ms,
        prompt_tokens: None,
        completion_tokens: None,
    }
    .emit();
}

/// Split a `"provider_id/model_name"` string into its two components.
pub fn resolve_model(model_str: &str) -> (&str, &str) {
    match model_str.split_once('/') {
        Some((provider, model)) => (provider, model),
        None => (model_str, ""),
    }
}

/// The default `LlmClient` implementation the core depends on (§6.1):
/// the caller's `model` field is treated as a role label, resolved through
/// the guarded fallback chain above.
#[async_trait]
impl agentrt_domain::collab::LlmClient for LlmRouter {
    async fn chat(&self, req: agentrt_domain::collab::ChatRequest) -> Result<agentrt_domain::collab::ChatResponse> {
        let role = req.model.clone();
        let provider_req = ChatRequest {
            messages: req.messages,
            tools: req.tools,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            json_mode: false,
            model: None,
        };
        let resp = self.chat_for_role(&role, provider_req).await?;
        Ok(agentrt_domain::collab::ChatResponse {
            content: resp.content,
            tool_calls: resp.tool_calls,
            prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
        })
    }
}
