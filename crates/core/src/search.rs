//! Search pipeline (§4.E): guarded fallback chain over a closed model-role
//! allowlist, a preferred tool-loop pass, dual-source cross-check for
//! complex time-sensitive queries, and a summarizer pass.
//!
//! Grounded on `runtime/compact.rs::generate_summary`'s single
//! non-streaming synthesis call (the summarizer pass) and
//! `resolve_compaction_provider`'s role-fallback chain (the guarded chain,
//! generalized from role names to this module's closed search-role list).

use crate::toolloop::{self, ToolLoopOutcome};
use crate::tools::{ToolContext, ToolPolicy, ToolRegistry};
use agentrt_domain::collab::{ChatRequest, LlmClient};
use agentrt_domain::config::{SearchConfig, ToolConfig};
use agentrt_domain::error::Result;
use agentrt_domain::tool::Message;
use agentrt_domain::trace::TraceEvent;
use once_cell::sync::Lazy;
use regex::Regex;

/// Closed search-role allowlist, tried in order (scraper prepended when the
/// user supplied a URL). Each name is a routing role, not a concrete model —
/// the configured `LlmClient` resolves role → provider/model and its own
/// guarded fallbacks internally (§6.1).
const SEARCH_ROLES: &[&str] = &["search_native", "reasoning", "executor"];

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s)>\]]+").unwrap());
static CHECKED_ON_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)checked on[:\s]+(\d{4}-\d{2}-\d{2})").unwrap());
static SOURCE_URLS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)source urls?\s*:").unwrap());

const SEARCH_SYSTEM_PROMPT: &str = "Answer in plain text only. Cite at least one source URL. \
If the question is freshness-sensitive, include a line \"Checked on: YYYY-MM-DD\". Prefer primary \
sources over aggregators.";

const SUMMARIZER_SYSTEM_PROMPT: &str = "Treat the findings below as ground truth. Prefer primary \
sources, preserve any \"Checked on:\" line verbatim, and eliminate contradictions between sources.";

#[derive(Clone, Copy)]
pub struct SearchRequest<'a> {
    pub trace_id: &'a str,
    pub retrieved_context: &'a str,
    pub recent_turns: &'a [Message],
    pub current_date: &'a str,
    pub prior_draft: Option<&'a str>,
    pub critic_revision_focus: Option<&'a str>,
    pub complex_mode: bool,
    pub user_has_url: bool,
    pub requires_freshness: bool,
    pub original_request: &'a str,
}

pub struct SearchToolPass<'a> {
    pub registry: &'a ToolRegistry,
    pub policy: &'a ToolPolicy,
    pub ctx: &'a ToolContext,
    pub tool_config: &'a ToolConfig,
    pub model_role: &'a str,
}

pub struct SearchOutcome {
    pub reply_text: Option<String>,
    pub used_tool_loop: bool,
    pub successful_tool_calls: u32,
    pub events: Vec<TraceEvent>,
}

fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = URL_PATTERN.find_iter(text).map(|m| m.as_str().to_string()).collect();
    urls.sort();
    urls.dedup();
    urls
}

fn has_checked_on(text: &str) -> bool {
    CHECKED_ON_PATTERN.is_match(text)
}

fn has_source_urls_line(text: &str) -> bool {
    SOURCE_URLS_PATTERN.is_match(text)
}

fn min_required_sources(complex_mode: bool) -> usize {
    if complex_mode { 2 } else { 1 }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

fn build_search_prompt(req: &SearchRequest<'_>) -> String {
    let mut sections = Vec::new();
    sections.push(format!("Request:\n{}", req.original_request));
    if !req.retrieved_context.is_empty() {
        sections.push(format!("Retrieved context:\n{}", truncate_chars(req.retrieved_context, 3_000)));
    }
    if !req.recent_turns.is_empty() {
        let recent: Vec<String> = req
            .recent_turns
            .iter()
            .rev()
            .take(6)
            .rev()
            .map(|m| format!("{:?}: {}", m.role, m.content.extract_all_text()))
            .collect();
        sections.push(format!("Recent conversation:\n{}", recent.join("\n")));
    }
    sections.push(format!("Current date: {}", req.current_date));
    if let Some(draft) = req.prior_draft {
        sections.push(format!("Prior draft:\n{draft}"));
    }
    if let Some(focus) = req.critic_revision_focus {
        sections.push(format!("Critic revision focus:\n{focus}"));
    }
    sections.join("\n\n")
}

/// Append Source URLs/Checked-on bookkeeping the model omitted, without
/// fabricating citations it never produced. `urls` is the set already known
/// to back this reply; an explicit "Source URLs:" line is only added when
/// the text doesn't already carry one.
fn normalize_reply(text: &str, urls: &[String], current_date: &str, requires_freshness: bool) -> String {
    let mut out = text.to_string();
    if !urls.is_empty() && !has_source_urls_line(&out) {
        out.push_str(&format!("\n\nSource URLs: {}", urls.join(" ")));
    }
    if requires_freshness && !has_checked_on(&out) {
        out.push_str(&format!("\nChecked on: {current_date}"));
    }
    out
}

struct AttemptOutcome {
    role: String,
    text: String,
    #[allow(dead_code)]
    urls: Vec<String>,
}

async fn try_attempt(
    client: &dyn LlmClient,
    role: &str,
    req: &SearchRequest<'_>,
    config: &SearchConfig,
) -> Result<Option<AttemptOutcome>> {
    let response = client
        .chat(ChatRequest {
            model: role.to_string(),
            messages: vec![Message::system(SEARCH_SYSTEM_PROMPT), Message::user(build_search_prompt(req))],
            tools: Vec::new(),
            temperature: Some(0.2),
            max_tokens: Some(config.max_output_tokens),
        })
        .await?;

    let urls = extract_urls(&response.content);
    let normalized = normalize_reply(&response.content, &urls, req.current_date, req.requires_freshness);

    if urls.is_empty() {
        TraceEvent::SearchAttempt {
            trace_id: req.trace_id.to_string(),
            model: role.to_string(),
            accepted: false,
            rejection_reason: Some("missing_sources".to_string()),
        }
        .emit();
        return Ok(None);
    }

    if req.requires_freshness && (!has_checked_on(&normalized) || urls.len() < min_required_sources(req.complex_mode))
    {
        TraceEvent::SearchAttempt {
            trace_id: req.trace_id.to_string(),
            model: role.to_string(),
            accepted: false,
            rejection_reason: Some("freshness_grounding_failed".to_string()),
        }
        .emit();
        return Ok(None);
    }

    TraceEvent::SearchAttempt {
        trace_id: req.trace_id.to_string(),
        model: role.to_string(),
        accepted: true,
        rejection_reason: None,
    }
    .emit();
    Ok(Some(AttemptOutcome { role: role.to_string(), text: normalized, urls }))
}

/// The guarded fallback chain (§4.E): tries each candidate role in order,
/// accepting the first that clears both rejection guards.
async fn run_guarded_chain(
    client: &dyn LlmClient,
    req: &SearchRequest<'_>,
    config: &SearchConfig,
) -> Result<Option<AttemptOutcome>> {
    let mut roles: Vec<&str> = Vec::new();
    if req.user_has_url {
        roles.push("scraper");
    }
    roles.extend_from_slice(SEARCH_ROLES);
    roles.dedup();

    let max_attempts = if req.complex_mode { config.max_attempts_complex } else { config.max_attempts_simple };

    for role in roles.into_iter().take(max_attempts as usize) {
        if let Some(accepted) = try_attempt(client, role, req, config).await? {
            return Ok(Some(accepted));
        }
    }
    Ok(None)
}

/// Dual-source cross-check (§4.E): for complex, time-sensitive queries,
/// query one more role with a shorter deadline after the first accept.
async fn cross_check(
    client: &dyn LlmClient,
    already_tried_role: &str,
    req: &SearchRequest<'_>,
    config: &SearchConfig,
) -> Result<Option<AttemptOutcome>> {
    let candidate = SEARCH_ROLES.iter().find(|r| **r != already_tried_role);
    let Some(role) = candidate else { return Ok(None) };

    let call = try_attempt(client, role, req, config);
    let outcome = match tokio::time::timeout(std::time::Duration::from_millis(config.timeout_search_scraper_ms), call).await {
        Ok(result) => result?,
        Err(_elapsed) => None,
    };
    TraceEvent::SearchCrossCheck {
        trace_id: req.trace_id.to_string(),
        model: role.to_string(),
        accepted: outcome.is_some(),
    }
    .emit();
    Ok(outcome)
}

async fn run_summarizer(
    client: &dyn LlmClient,
    findings: &str,
    req: &SearchRequest<'_>,
    config: &SearchConfig,
) -> Result<String> {
    let prompt = format!(
        "Original request:\n{}\n\nPrior draft:\n{}\n\nFindings:\n{findings}",
        req.original_request,
        req.prior_draft.unwrap_or("(none)"),
    );
    let response = client
        .chat(ChatRequest {
            model: "summarizer".to_string(),
            messages: vec![Message::system(SUMMARIZER_SYSTEM_PROMPT), Message::user(prompt)],
            tools: Vec::new(),
            temperature: Some(0.1),
            max_tokens: Some(config.max_output_tokens),
        })
        .await?;
    let mut merged_urls = extract_urls(findings);
    merged_urls.extend(extract_urls(&response.content));
    merged_urls.sort();
    merged_urls.dedup();
    Ok(normalize_reply(&response.content, &merged_urls, req.current_date, req.requires_freshness))
}

/// `run` (§4.E): prefers the tool-loop pass when tools are enabled; falls
/// back to the guarded model chain on fewer than one successful tool call.
pub async fn run(
    client: &dyn LlmClient,
    history: Vec<Message>,
    req: &SearchRequest<'_>,
    config: &SearchConfig,
    tool_pass: Option<SearchToolPass<'_>>,
) -> Result<SearchOutcome> {
    let mut events = Vec::new();

    if let Some(pass) = &tool_pass {
        if pass.tool_config.loop_enabled {
            let mut messages = history.clone();
            messages.push(Message::user(build_search_prompt(req)));
            let ToolLoopOutcome { reply_text, tool_results, events: loop_events, .. } =
                toolloop::run(client, pass.model_role, messages, pass.registry, pass.policy, pass.ctx, pass.tool_config)
                    .await?;
            let successful = toolloop::successful_tool_count(&tool_results);
            events.extend(loop_events);
            if successful >= 1 {
                let urls = extract_urls(&reply_text);
                let normalized = normalize_reply(&reply_text, &urls, req.current_date, req.requires_freshness);
                return Ok(SearchOutcome {
                    reply_text: Some(normalized),
                    used_tool_loop: true,
                    successful_tool_calls: successful,
                    events,
                });
            }
        }
    }

    let primary = run_guarded_chain(client, req, config).await?;
    let Some(primary) = primary else {
        return Ok(SearchOutcome { reply_text: None, used_tool_loop: false, successful_tool_calls: 0, events });
    };

    let mut findings = format!("## Primary search findings\n{}", primary.text);
    let time_sensitive = req.requires_freshness && req.complex_mode;
    if time_sensitive {
        if let Some(secondary) = cross_check(client, &primary.role, req, config).await? {
            findings.push_str(&format!("\n\n## Secondary cross-check\n{}", secondary.text));
        }
    }

    if req.complex_mode {
        let summarized = run_summarizer(client, &findings, req, config).await?;
        return Ok(SearchOutcome { reply_text: Some(summarized), used_tool_loop: false, successful_tool_calls: 0, events });
    }

    Ok(SearchOutcome { reply_text: Some(primary.text), used_tool_loop: false, successful_tool_calls: 0, events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::collab::ChatResponse;
    use async_trait::async_trait;

    struct ScriptedClient {
        responses: std::sync::Mutex<Vec<String>>,
    }
    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            let mut r = self.responses.lock().unwrap();
            let content = r.remove(0);
            Ok(ChatResponse { content, tool_calls: vec![], prompt_tokens: None, completion_tokens: None })
        }
    }

    fn req() -> SearchRequest<'static> {
        SearchRequest {
            trace_id: "t1",
            retrieved_context: "",
            recent_turns: &[],
            current_date: "2026-07-30",
            prior_draft: None,
            critic_revision_focus: None,
            complex_mode: false,
            user_has_url: false,
            requires_freshness: false,
            original_request: "what's new in rust",
        }
    }

    #[tokio::test]
    async fn reply_without_url_is_rejected_and_chain_continues() {
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec!["no citations here".into(), "see https://rust-lang.org for details".into()]),
        };
        let config = SearchConfig::default();
        let outcome = run(&client, vec![], &req(), &config, None).await.unwrap();
        assert_eq!(outcome.reply_text.unwrap(), "see https://rust-lang.org for details");
    }

    #[tokio::test]
    async fn exhausted_chain_returns_none() {
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec!["no url".into(), "still no url".into(), "nope".into()]),
        };
        let config = SearchConfig::default();
        let outcome = run(&client, vec![], &req(), &config, None).await.unwrap();
        assert!(outcome.reply_text.is_none());
    }

    #[tokio::test]
    async fn freshness_requires_checked_on_and_min_sources() {
        let mut r = req();
        r.requires_freshness = true;
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec![
                "see https://a.example only, no date".into(),
                "see https://b.example — Checked on: 2026-07-30".into(),
            ]),
        };
        let config = SearchConfig::default();
        let outcome = run(&client, vec![], &r, &config, None).await.unwrap();
        assert!(outcome.reply_text.unwrap().contains("b.example"));
    }

    #[tokio::test]
    async fn summarizer_merges_urls_from_findings_into_output() {
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec!["the summarized answer, no links here".into()]),
        };
        let config = SearchConfig::default();
        let findings = "## Primary search findings\nsee https://a.example for details";
        let out = run_summarizer(&client, findings, &req(), &config).await.unwrap();
        assert!(out.contains("Source URLs: https://a.example"));
    }

    #[test]
    fn extract_urls_dedupes_and_sorts() {
        let text = "see https://a.example and https://a.example again, also https://b.example";
        let urls = extract_urls(text);
        assert_eq!(urls, vec!["https://a.example".to_string(), "https://b.example".to_string()]);
    }

    #[test]
    fn normalize_reply_appends_checked_on_when_missing_and_required() {
        let urls = extract_urls("see https://a.example");
        let out = normalize_reply("see https://a.example", &urls, "2026-07-30", true);
        assert!(out.contains("Checked on: 2026-07-30"));
    }

    #[test]
    fn normalize_reply_leaves_existing_checked_on_untouched() {
        let text = "see https://a.example — Checked on: 2020-01-01";
        let urls = extract_urls(text);
        let out = normalize_reply(text, &urls, "2026-07-30", true);
        assert_eq!(out.matches("Checked on").count(), 1);
    }

    #[test]
    fn normalize_reply_appends_source_urls_line_when_missing() {
        let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let out = normalize_reply("the answer is foo", &urls, "2026-07-30", false);
        assert!(out.contains("Source URLs: https://a.example https://b.example"));
    }

    #[test]
    fn normalize_reply_leaves_existing_source_urls_line_untouched() {
        let text = "the answer is foo\nSource URLs: https://a.example";
        let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let out = normalize_reply(text, &urls, "2026-07-30", false);
        assert_eq!(out.matches("Source URLs").count(), 1);
    }
}
