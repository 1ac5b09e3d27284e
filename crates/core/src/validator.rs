//! Response validator (§4.G): a pure check function plus a thin repair-dispatch
//! wrapper around it.
//!
//! Grounded on `agentrt-contextpack`'s `ContextPackBuilder::build` shape —
//! deterministic pure builder returning `(assembled text, report)` — adapted
//! here to `(repaired text, report of issues found)`.

use crate::search::{self, SearchOutcome, SearchRequest};
use crate::toolloop::strip_code_fence;
use agentrt_domain::collab::{ChatRequest, LlmClient};
use agentrt_domain::config::SearchConfig;
use agentrt_domain::error::{sentinels, CoreError, Result};
use agentrt_domain::tool::Message;
use agentrt_domain::trace::TraceEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    EmptyReply,
    ToolEnvelopeLeak,
    UnsupportedCertaintyPhrase,
    MissingSourceUrls,
    MissingCheckedOnDate,
    InvalidCheckedOnDate,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::EmptyReply => "empty_reply",
            CheckKind::ToolEnvelopeLeak => "tool_envelope_leak",
            CheckKind::UnsupportedCertaintyPhrase => "unsupported_certainty_phrase",
            CheckKind::MissingSourceUrls => "missing_source_urls",
            CheckKind::MissingCheckedOnDate => "missing_checked_on_date",
            CheckKind::InvalidCheckedOnDate => "invalid_checked_on_date",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "empty_reply" => Some(CheckKind::EmptyReply),
            "tool_envelope_leak" => Some(CheckKind::ToolEnvelopeLeak),
            "unsupported_certainty_phrase" => Some(CheckKind::UnsupportedCertaintyPhrase),
            "missing_source_urls" => Some(CheckKind::MissingSourceUrls),
            "missing_checked_on_date" => Some(CheckKind::MissingCheckedOnDate),
            "invalid_checked_on_date" => Some(CheckKind::InvalidCheckedOnDate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Off,
    Warn,
    Enforce,
}

impl Strictness {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Strictness::Off),
            "warn" => Some(Strictness::Warn),
            "enforce" => Some(Strictness::Enforce),
            _ => None,
        }
    }
}

/// Which checks apply to a route, and how strictly, before any
/// `validation.policy_json` overlay is applied.
pub fn route_policy(route: &str) -> (&'static [CheckKind], Strictness) {
    use CheckKind::*;
    match route {
        "chat" => (
            &[EmptyReply, ToolEnvelopeLeak, UnsupportedCertaintyPhrase],
            Strictness::Enforce,
        ),
        "coding" => (&[EmptyReply, ToolEnvelopeLeak], Strictness::Enforce),
        "search" => (
            &[
                EmptyReply,
                ToolEnvelopeLeak,
                MissingSourceUrls,
                MissingCheckedOnDate,
                InvalidCheckedOnDate,
            ],
            Strictness::Enforce,
        ),
        "creative" => (&[EmptyReply, ToolEnvelopeLeak], Strictness::Warn),
        _ => (&[EmptyReply], Strictness::Warn),
    }
}

/// Raw shape of the `validation.policy_json` overlay (§4.G): a per-route
/// override of which checks run and how strictly, layered on top of
/// `route_policy`'s closed default table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationPolicyOverlay {
    #[serde(default)]
    routes: HashMap<String, RoutePolicyOverlay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutePolicyOverlay {
    #[serde(default)]
    checks: Option<Vec<String>>,
    #[serde(default)]
    strictness: Option<String>,
}

/// `route_policy`, overlaid with `policy_json` when one is configured.
/// Unknown check names in the overlay are dropped; an unknown strictness
/// value leaves the default in place.
fn resolve_route_policy(route: &str, policy_json: Option<&str>) -> Result<(Vec<CheckKind>, Strictness)> {
    let (base_checks, base_strictness) = route_policy(route);
    let mut checks = base_checks.to_vec();
    let mut strictness = base_strictness;

    if let Some(raw) = policy_json {
        let overlay: ValidationPolicyOverlay = serde_json::from_str(raw)
            .map_err(|e| CoreError::Config(format!("validation.policy_json: {e}")))?;
        if let Some(route_overlay) = overlay.routes.get(route) {
            if let Some(names) = &route_overlay.checks {
                checks = names.iter().filter_map(|n| CheckKind::from_str(n)).collect();
            }
            if let Some(s) = &route_overlay.strictness {
                if let Some(parsed) = Strictness::from_str(s) {
                    strictness = parsed;
                }
            }
        }
    }

    Ok((checks, strictness))
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub kind: CheckKind,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub strictness: Strictness,
}

impl ValidationReport {
    pub fn is_blocking(&self) -> bool {
        self.strictness == Strictness::Enforce && !self.issues.is_empty()
    }

    pub fn issue_strings(&self) -> Vec<String> {
        self.issues.iter().map(|i| format!("{}: {}", i.kind.as_str(), i.detail)).collect()
    }
}

static ENVELOPE_LEAK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)"type"\s*:\s*"tool_calls""#).unwrap());
static CERTAINTY_PHRASE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(guaranteed|always true|100% certain|never fails|impossible to be wrong)\b").unwrap()
});
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s)>\]]+").unwrap());
static CHECKED_ON_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)checked on[:\s]+(\d{4}-\d{2}-\d{2})").unwrap());

/// `check` (§4.G): deterministic, never touches the network. Fallible only
/// because `policy_json` may fail to parse.
pub fn check(route: &str, text: &str, policy_json: Option<&str>) -> Result<ValidationReport> {
    let (checks, strictness) = resolve_route_policy(route, policy_json)?;
    let mut issues = Vec::new();

    for kind in &checks {
        match kind {
            CheckKind::EmptyReply => {
                if text.trim().is_empty() {
                    issues.push(ValidationIssue { kind: *kind, detail: "reply text is empty".into() });
                }
            }
            CheckKind::ToolEnvelopeLeak => {
                let stripped = strip_code_fence(text);
                if ENVELOPE_LEAK_PATTERN.is_match(stripped) {
                    issues.push(ValidationIssue {
                        kind: *kind,
                        detail: "reply contains a raw tool-call envelope".into(),
                    });
                }
            }
            CheckKind::UnsupportedCertaintyPhrase => {
                if CERTAINTY_PHRASE_PATTERN.is_match(text) {
                    issues.push(ValidationIssue {
                        kind: *kind,
                        detail: "reply asserts unsupported certainty".into(),
                    });
                }
            }
            CheckKind::MissingSourceUrls => {
                if !URL_PATTERN.is_match(text) {
                    issues.push(ValidationIssue { kind: *kind, detail: "no source URL present".into() });
                }
            }
            CheckKind::MissingCheckedOnDate => {
                if !CHECKED_ON_PATTERN.is_match(text) {
                    issues.push(ValidationIssue {
                        kind: *kind,
                        detail: "no \"Checked on:\" date present".into(),
                    });
                }
            }
            CheckKind::InvalidCheckedOnDate => {
                if let Some(caps) = CHECKED_ON_PATTERN.captures(text) {
                    let date = &caps[1];
                    if !is_plausible_date(date) {
                        issues.push(ValidationIssue {
                            kind: *kind,
                            detail: format!("\"Checked on: {date}\" is not a plausible date"),
                        });
                    }
                }
            }
        }
    }

    Ok(ValidationReport { issues, strictness })
}

fn is_plausible_date(date: &str) -> bool {
    let parts: Vec<&str> = date.split('-').collect();
    if parts.len() != 3 {
        return false;
    }
    let (Ok(year), Ok(month), Ok(day)) =
        (parts[0].parse::<u32>(), parts[1].parse::<u32>(), parts[2].parse::<u32>())
    else {
        return false;
    };
    (1..=12).contains(&month) && (1..=31).contains(&day) && (2000..=2100).contains(&year)
}

pub struct ValidatorRequest<'a> {
    pub trace_id: &'a str,
    pub route: &'a str,
    pub search_req_base: Option<SearchRequest<'a>>,
    pub search_config: &'a SearchConfig,
    pub validation_policy_json: Option<&'a str>,
}

/// Run `check`, and if blocking issues remain after `max_repair_attempts`
/// repair passes, replace the draft with the canonical safe-refusal sentinel.
pub async fn validate_and_repair(
    client: &dyn LlmClient,
    mut text: String,
    req: &ValidatorRequest<'_>,
    auto_repair_enabled: bool,
    max_repair_attempts: u32,
) -> Result<String> {
    let mut report = check(req.route, &text, req.validation_policy_json)?;

    if !report.is_blocking() {
        emit_if_warned(req, &report);
        return Ok(text);
    }

    if !auto_repair_enabled {
        emit_failure(req, &report, true);
        return Ok(sentinels::VALIDATOR_BLOCK.to_string());
    }

    for _ in 0..max_repair_attempts {
        let repaired = repair(client, req, &text, &report).await;
        match repaired {
            Ok(Some(next)) => {
                text = next;
                report = check(req.route, &text, req.validation_policy_json)?;
                if !report.is_blocking() {
                    emit_failure(req, &report, false);
                    return Ok(text);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    emit_failure(req, &report, true);
    Ok(sentinels::VALIDATOR_BLOCK.to_string())
}

fn emit_if_warned(req: &ValidatorRequest<'_>, report: &ValidationReport) {
    if report.strictness == Strictness::Warn && !report.issues.is_empty() {
        TraceEvent::ValidationFailed {
            trace_id: req.trace_id.to_string(),
            route: req.route.to_string(),
            issues: report.issue_strings(),
            repaired: false,
        }
        .emit();
    }
}

fn emit_failure(req: &ValidatorRequest<'_>, report: &ValidationReport, replaced: bool) {
    TraceEvent::ValidationFailed {
        trace_id: req.trace_id.to_string(),
        route: req.route.to_string(),
        issues: report.issue_strings(),
        repaired: !replaced,
    }
    .emit();
}

async fn repair(
    client: &dyn LlmClient,
    req: &ValidatorRequest<'_>,
    text: &str,
    report: &ValidationReport,
) -> Result<Option<String>> {
    if req.route == "search" {
        let Some(base) = req.search_req_base else { return Ok(None) };
        let focus = format!("repair validation issues: {}", report.issue_strings().join("; "));
        let search_req =
            SearchRequest { critic_revision_focus: Some(&focus), prior_draft: Some(text), ..base };
        let outcome: SearchOutcome = search::run(client, Vec::new(), &search_req, req.search_config, None).await?;
        return Ok(outcome.reply_text);
    }

    let issue_list = report.issue_strings().join("\n- ");
    let prompt = format!(
        "The following reply failed runtime validation checks. Rewrite it to fix every issue \
         below while preserving its meaning and intent.\n\nISSUES:\n- {issue_list}\n\n\
         ORIGINAL REPLY:\n{text}"
    );
    let response = client
        .chat(ChatRequest {
            model: "reasoning".to_string(),
            messages: vec![Message::user(&prompt)],
            tools: vec![],
            temperature: Some(0.2),
            max_tokens: Some(1024),
        })
        .await?;
    Ok(Some(response.content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::collab::ChatResponse;
    use async_trait::async_trait;

    struct EchoClient {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for EchoClient {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: self.reply.clone(),
                tool_calls: vec![],
                prompt_tokens: None,
                completion_tokens: None,
            })
        }
    }

    #[test]
    fn empty_reply_is_blocking_on_chat_route() {
        let report = check("chat", "   ", None).unwrap();
        assert!(report.is_blocking());
        assert!(report.issues.iter().any(|i| i.kind == CheckKind::EmptyReply));
    }

    #[test]
    fn envelope_leak_is_detected_through_code_fence() {
        let text = "```json\n{\"type\":\"tool_calls\",\"calls\":[]}\n```";
        let report = check("chat", text, None).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == CheckKind::ToolEnvelopeLeak));
    }

    #[test]
    fn search_route_requires_source_url_and_checked_on() {
        let report = check("search", "The answer is 42 with no citations.", None).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == CheckKind::MissingSourceUrls));
        assert!(report.issues.iter().any(|i| i.kind == CheckKind::MissingCheckedOnDate));
    }

    #[test]
    fn valid_search_reply_passes_clean() {
        let report =
            check("search", "See https://example.com/a for details. Checked on: 2026-01-15", None).unwrap();
        assert!(!report.is_blocking());
    }

    #[test]
    fn invalid_checked_on_date_is_flagged() {
        let report = check("search", "See https://example.com. Checked on: 2026-13-40", None).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == CheckKind::InvalidCheckedOnDate));
    }

    #[test]
    fn creative_route_only_warns_never_blocks() {
        let report = check("creative", "", None).unwrap();
        assert!(!report.is_blocking());
        assert_eq!(report.strictness, Strictness::Warn);
    }

    #[test]
    fn policy_json_overlay_tightens_creative_route_to_enforce() {
        let policy = r#"{"routes":{"creative":{"strictness":"enforce"}}}"#;
        let report = check("creative", "", Some(policy)).unwrap();
        assert!(report.is_blocking());
        assert_eq!(report.strictness, Strictness::Enforce);
    }

    #[test]
    fn policy_json_overlay_narrows_checks_for_route() {
        let policy = r#"{"routes":{"chat":{"checks":["empty_reply"]}}}"#;
        let text = "```json\n{\"type\":\"tool_calls\",\"calls\":[]}\n```";
        let report = check("chat", text, Some(policy)).unwrap();
        assert!(!report.issues.iter().any(|i| i.kind == CheckKind::ToolEnvelopeLeak));
    }

    #[test]
    fn malformed_policy_json_is_rejected() {
        let err = check("chat", "hello", Some("not json")).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[tokio::test]
    async fn repair_that_fixes_issue_avoids_sentinel_replacement() {
        let client = EchoClient { reply: "fixed, no envelope here".into() };
        let tool_config_search = SearchConfig::default();
        let req = ValidatorRequest {
            trace_id: "t1",
            route: "chat",
            search_req_base: None,
            search_config: &tool_config_search,
            validation_policy_json: None,
        };
        let broken = "```json\n{\"type\":\"tool_calls\",\"calls\":[]}\n```";
        let result = validate_and_repair(&client, broken.to_string(), &req, true, 1).await.unwrap();
        assert_eq!(result, "fixed, no envelope here");
    }

    #[tokio::test]
    async fn exhausted_repairs_replace_draft_with_sentinel() {
        let client = EchoClient { reply: "```json\n{\"type\":\"tool_calls\"}\n```".into() };
        let tool_config_search = SearchConfig::default();
        let req = ValidatorRequest {
            trace_id: "t1",
            route: "chat",
            search_req_base: None,
            search_config: &tool_config_search,
            validation_policy_json: None,
        };
        let broken = "```json\n{\"type\":\"tool_calls\",\"calls\":[]}\n```";
        let result = validate_and_repair(&client, broken.to_string(), &req, true, 1).await.unwrap();
        assert_eq!(result, sentinels::VALIDATOR_BLOCK);
    }
}
