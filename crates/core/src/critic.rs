//! Critic / revision loop (§4.F): scores a draft reply, and either accepts it
//! or drives a bounded number of targeted revision passes.
//!
//! Grounded on `runtime/compact.rs::generate_summary`'s single non-streaming
//! LLM call shape, adapted to a scored verdict response instead of free text.
//! The lenient JSON parsing reuses the tool loop's `strip_code_fence` helper
//! (§4.D) since both are "strip an optional ```json fence, then parse" parsers
//! over model output, just over different target shapes.

use crate::search::{self, SearchOutcome, SearchRequest};
use crate::toolloop::{self, strip_code_fence};
use crate::tools::{ToolContext, ToolPolicy, ToolRegistry};
use agentrt_domain::collab::{ChatRequest, ContextProviderRunner, LlmClient};
use agentrt_domain::config::{CriticConfig, SearchConfig, ToolConfig};
use agentrt_domain::error::Result;
use agentrt_domain::graph::AgentGraph;
use agentrt_domain::tool::Message;
use agentrt_domain::trace::TraceEvent;
use serde::Deserialize;

const CRITIC_SYSTEM_PROMPT: &str = "You are a strict quality critic reviewing a draft reply \
     before it is sent. Return ONLY a JSON object: {\"score\": 0.0-1.0, \"verdict\": \"pass\" or \
     \"revise\", \"issues\": [string], \"rewritePrompt\": string, \"model\": string}. Be \
     skeptical of unverified claims, missing citations, and stale freshness dates.";

const FACTUALITY_KEYWORDS: &[&str] = &["factual", "freshness", "stale", "outdated", "citation", "source"];
const VERIFIABILITY_KEYWORDS: &[&str] = &["verify", "unverified", "evidence", "hallucinat"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticAssessment {
    pub score: f64,
    pub verdict: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub rewrite_prompt: String,
    #[serde(default)]
    pub model: String,
}

impl CriticAssessment {
    fn is_pass(&self) -> bool {
        self.verdict == "pass"
    }
}

pub struct CriticRequest<'a> {
    pub trace_id: &'a str,
    pub route: &'a str,
    pub voice_active: bool,
    pub files_attached: bool,
    pub search_fallback_terminal: bool,
    pub graph: Option<&'a AgentGraph>,
    pub runner: Option<&'a dyn ContextProviderRunner>,
    pub search_req_base: Option<SearchRequest<'a>>,
    pub search_config: &'a SearchConfig,
    pub tool_config: &'a ToolConfig,
    pub registry: Option<&'a ToolRegistry>,
    pub policy: Option<&'a ToolPolicy>,
    pub ctx: Option<&'a ToolContext>,
}

pub struct CriticOutcome {
    pub final_text: String,
    pub iterations_run: u32,
    pub last_assessment: Option<CriticAssessment>,
    pub events: Vec<TraceEvent>,
}

fn is_eligible(req: &CriticRequest, draft: &str) -> bool {
    if !matches!(req.route, "chat" | "coding" | "search") {
        return false;
    }
    if req.voice_active || req.files_attached {
        return false;
    }
    if draft.trim().is_empty() || draft.contains("[SILENCE]") {
        return false;
    }
    if req.search_fallback_terminal {
        return false;
    }
    true
}

/// Strip an optional ```json fence and trailing commas before parsing, then
/// require `verdict == "pass" ⇒ score >= 0.85` so a lenient parse can never
/// manufacture a pass the model didn't actually earn.
fn parse_assessment(raw: &str) -> Option<CriticAssessment> {
    let stripped = strip_code_fence(raw);
    let cleaned = strip_trailing_commas(stripped);
    let assessment: CriticAssessment = serde_json::from_str(&cleaned).ok()?;
    if assessment.is_pass() && assessment.score < 0.85 {
        return None;
    }
    Some(assessment)
}

fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn matches_factuality_issue(issues: &[String]) -> bool {
    issues.iter().any(|issue| {
        let lower = issue.to_lowercase();
        FACTUALITY_KEYWORDS.iter().any(|kw| lower.contains(kw))
    })
}

fn matches_verifiability_issue(issues: &[String]) -> bool {
    issues.iter().any(|issue| {
        let lower = issue.to_lowercase();
        VERIFIABILITY_KEYWORDS.iter().any(|kw| lower.contains(kw))
    })
}

/// Providers (graph node agents) whose name or objective mentions a word
/// appearing in the critic's issue list — the targeted re-dispatch set.
fn providers_matching_issues<'a>(graph: &'a AgentGraph, issues: &[String]) -> Vec<&'a str> {
    let issue_words: Vec<String> = issues.iter().map(|i| i.to_lowercase()).collect();
    graph
        .nodes
        .iter()
        .filter(|node| {
            let haystack = format!("{} {}", node.agent, node.objective).to_lowercase();
            issue_words.iter().any(|w| haystack.split_whitespace().any(|word| w.contains(word)))
        })
        .map(|node| node.id.as_str())
        .collect()
}

async fn critique(
    client: &dyn LlmClient,
    route: &str,
    draft: &str,
    iteration: u32,
) -> Result<Option<CriticAssessment>> {
    let prompt = format!(
        "Route: {route}\nIteration: {iteration}\n\nDRAFT REPLY:\n{draft}\n\n\
         Score this draft and decide whether it needs revision."
    );
    let response = client
        .chat(ChatRequest {
            model: "reasoning".to_string(),
            messages: vec![Message::system(CRITIC_SYSTEM_PROMPT), Message::user(&prompt)],
            tools: vec![],
            temperature: Some(0.1),
            max_tokens: Some(512),
        })
        .await?;
    Ok(parse_assessment(&response.content))
}

async fn run_route_typed_revision(
    client: &dyn LlmClient,
    route: &str,
    draft: &str,
    assessment: &CriticAssessment,
    refreshed_context: Option<&str>,
) -> Result<String> {
    let model = if assessment.model.is_empty() { "reasoning" } else { assessment.model.as_str() };
    let mut prompt = format!(
        "Revise the following {route} draft reply.\n\nPRIOR DRAFT:\n{draft}\n\n\
         CRITIC INSTRUCTIONS:\n{}\n",
        assessment.rewrite_prompt
    );
    if let Some(ctx) = refreshed_context {
        prompt.push_str(&format!("\nREFRESHED CONTEXT:\n{ctx}\n"));
    }
    let response = client
        .chat(ChatRequest {
            model: model.to_string(),
            messages: vec![Message::user(&prompt)],
            tools: vec![],
            temperature: Some(0.3),
            max_tokens: Some(1024),
        })
        .await?;
    Ok(response.content)
}

/// Run the critic loop over `draft`, returning the final accepted text.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    client: &dyn LlmClient,
    draft: String,
    req: &CriticRequest<'_>,
    config: &CriticConfig,
) -> Result<CriticOutcome> {
    let mut events = Vec::new();
    if !config.enabled || !is_eligible(req, &draft) {
        return Ok(CriticOutcome { final_text: draft, iterations_run: 0, last_assessment: None, events });
    }

    let mut current = draft;
    let mut last_assessment: Option<CriticAssessment> = None;
    let mut iterations_run = 0u32;

    for iteration in 0..config.max_loops {
        let assessment = match critique(client, req.route, &current, iteration).await {
            Ok(Some(a)) => a,
            Ok(None) if req.route == "search" => {
                // Unparseable assessment on the search route: treat as a
                // freshness miss and force one refresh pass.
                CriticAssessment {
                    score: 0.0,
                    verdict: "revise".to_string(),
                    issues: vec!["freshness grounding could not be assessed".to_string()],
                    rewrite_prompt: "Refresh the search findings and re-ground the answer.".to_string(),
                    model: String::new(),
                }
            }
            Ok(None) => break,
            Err(_) => break,
        };

        iterations_run += 1;
        let event = TraceEvent::CriticAssessed {
            trace_id: req.trace_id.to_string(),
            iteration,
            score: assessment.score,
            verdict: assessment.verdict.clone(),
        };
        event.emit();
        events.push(event);

        let needs_search_refresh =
            req.route == "search" && matches_factuality_issue(&assessment.issues);

        if assessment.is_pass() && !needs_search_refresh {
            last_assessment = Some(assessment);
            break;
        }

        let revised = if needs_search_refresh {
            match refresh_via_search(client, req).await? {
                Some(outcome) => outcome,
                None => {
                    last_assessment = Some(assessment);
                    break;
                }
            }
        } else {
            let matched = req
                .graph
                .map(|g| providers_matching_issues(g, &assessment.issues))
                .unwrap_or_default();
            let refreshed_context = if !matched.is_empty() {
                re_dispatch_providers(req, &matched).await
            } else {
                None
            };

            if matches_verifiability_issue(&assessment.issues) {
                match run_tool_backed_revision(client, req, &current, &assessment).await? {
                    Some(text) => text,
                    None => {
                        last_assessment = Some(assessment);
                        break;
                    }
                }
            } else {
                match run_route_typed_revision(
                    client,
                    req.route,
                    &current,
                    &assessment,
                    refreshed_context.as_deref(),
                )
                .await
                {
                    Ok(text) => text,
                    Err(_) => {
                        last_assessment = Some(assessment);
                        break;
                    }
                }
            }
        };

        current = revised;
        last_assessment = Some(assessment);
    }

    Ok(CriticOutcome { final_text: current, iterations_run, last_assessment, events })
}

async fn refresh_via_search(client: &dyn LlmClient, req: &CriticRequest<'_>) -> Result<Option<String>> {
    let Some(base) = req.search_req_base else { return Ok(None) };
    let search_req = SearchRequest { critic_revision_focus: Some("refresh stale or unverified facts"), ..base };
    let tool_pass = match (req.registry, req.policy, req.ctx) {
        (Some(registry), Some(policy), Some(ctx)) if req.tool_config.loop_enabled => {
            Some(search::SearchToolPass { registry, policy, ctx, tool_config: req.tool_config, model_role: "search_native" })
        }
        _ => None,
    };
    let outcome: SearchOutcome = search::run(client, Vec::new(), &search_req, req.search_config, tool_pass).await?;
    Ok(outcome.reply_text)
}

async fn re_dispatch_providers(req: &CriticRequest<'_>, node_ids: &[&str]) -> Option<String> {
    let graph = req.graph?;
    let runner = req.runner?;
    let mut out = String::new();
    for node_id in node_ids {
        if !graph.nodes.iter().any(|n| n.id == *node_id) {
            continue;
        }
        if let Ok(packets) = runner.run_node(graph, node_id, Vec::new()).await {
            for packet in packets {
                out.push_str(&packet.content);
                out.push('\n');
            }
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

async fn run_tool_backed_revision(
    client: &dyn LlmClient,
    req: &CriticRequest<'_>,
    draft: &str,
    assessment: &CriticAssessment,
) -> Result<Option<String>> {
    let (Some(registry), Some(policy), Some(ctx)) = (req.registry, req.policy, req.ctx) else {
        return Ok(None);
    };
    let prompt = format!(
        "Revise the following draft, using tools to verify any claim flagged below.\n\n\
         PRIOR DRAFT:\n{draft}\n\nCRITIC INSTRUCTIONS:\n{}\n",
        assessment.rewrite_prompt
    );
    let model = if assessment.model.is_empty() { "reasoning" } else { assessment.model.as_str() };
    let outcome = toolloop::run(
        client,
        model,
        vec![Message::user(&prompt)],
        registry,
        policy,
        ctx,
        req.tool_config,
    )
    .await?;
    Ok(Some(outcome.reply_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::collab::ChatResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        replies: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let content = self.replies.get(idx).cloned().unwrap_or_else(|| self.replies.last().cloned().unwrap());
            Ok(ChatResponse { content, tool_calls: vec![], prompt_tokens: None, completion_tokens: None })
        }
    }

    fn base_req<'a>(tool_config: &'a ToolConfig, search_config: &'a SearchConfig) -> CriticRequest<'a> {
        CriticRequest {
            trace_id: "t1",
            route: "chat",
            voice_active: false,
            files_attached: false,
            search_fallback_terminal: false,
            graph: None,
            runner: None,
            search_req_base: None,
            search_config,
            tool_config,
            registry: None,
            policy: None,
            ctx: None,
        }
    }

    #[tokio::test]
    async fn pass_on_first_iteration_stops_immediately() {
        let client = ScriptedClient {
            replies: vec![r#"{"score":0.95,"verdict":"pass","issues":[],"rewritePrompt":"","model":""}"#.into()],
            calls: AtomicUsize::new(0),
        };
        let tool_config = ToolConfig::default();
        let search_config = SearchConfig::default();
        let req = base_req(&tool_config, &search_config);
        let config = CriticConfig::default();
        let outcome = run(&client, "a draft".into(), &req, &config).await.unwrap();
        assert_eq!(outcome.iterations_run, 1);
        assert_eq!(outcome.final_text, "a draft");
    }

    #[tokio::test]
    async fn ineligible_route_skips_critic_entirely() {
        let client = ScriptedClient { replies: vec!["unused".into()], calls: AtomicUsize::new(0) };
        let tool_config = ToolConfig::default();
        let search_config = SearchConfig::default();
        let mut req = base_req(&tool_config, &search_config);
        req.route = "creative";
        let config = CriticConfig::default();
        let outcome = run(&client, "draft".into(), &req, &config).await.unwrap();
        assert_eq!(outcome.iterations_run, 0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_draft_is_ineligible() {
        let client = ScriptedClient { replies: vec!["unused".into()], calls: AtomicUsize::new(0) };
        let tool_config = ToolConfig::default();
        let search_config = SearchConfig::default();
        let req = base_req(&tool_config, &search_config);
        let config = CriticConfig::default();
        let outcome = run(&client, "   ".into(), &req, &config).await.unwrap();
        assert_eq!(outcome.iterations_run, 0);
    }

    #[tokio::test]
    async fn max_loops_bounds_revision_count() {
        let client = ScriptedClient {
            replies: vec![
                r#"{"score":0.2,"verdict":"revise","issues":["tone is off"],"rewritePrompt":"tighten tone","model":""}"#.into(),
                "revised once".into(),
                r#"{"score":0.2,"verdict":"revise","issues":["tone is off"],"rewritePrompt":"tighten tone","model":""}"#.into(),
                "revised twice".into(),
            ],
            calls: AtomicUsize::new(0),
        };
        let tool_config = ToolConfig::default();
        let search_config = SearchConfig::default();
        let req = base_req(&tool_config, &search_config);
        let mut config = CriticConfig::default();
        config.max_loops = 2;
        let outcome = run(&client, "draft".into(), &req, &config).await.unwrap();
        assert_eq!(outcome.iterations_run, 2);
        assert_eq!(outcome.final_text, "revised twice");
    }

    #[test]
    fn parse_assessment_rejects_pass_below_score_floor() {
        let raw = r#"{"score":0.5,"verdict":"pass","issues":[],"rewritePrompt":"","model":""}"#;
        assert!(parse_assessment(raw).is_none());
    }

    #[test]
    fn parse_assessment_strips_fence_and_trailing_commas() {
        let raw = "```json\n{\"score\":0.9,\"verdict\":\"pass\",\"issues\":[],\"rewritePrompt\":\"\",\"model\":\"\",}\n```";
        let parsed = parse_assessment(raw).unwrap();
        assert_eq!(parsed.score, 0.9);
        assert_eq!(parsed.verdict, "pass");
    }

    #[test]
    fn factuality_keyword_detection_is_case_insensitive() {
        assert!(matches_factuality_issue(&["Stale Citation needed".to_string()]));
        assert!(!matches_factuality_issue(&["tone is too casual".to_string()]));
    }
}
