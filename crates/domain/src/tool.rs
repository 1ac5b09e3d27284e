use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
/// Every adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
    pub risk_class: RiskClass,
}

/// Risk classification used by the tool policy (§4.B) to gate calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    Benign,
    NetworkRead,
    DataExfiltrationRisk,
    ExternalWrite,
    HighRisk,
}

impl RiskClass {
    /// Ordering from most to least restrictive, used for deny evaluation.
    pub fn restrictiveness_rank(self) -> u8 {
        match self {
            RiskClass::HighRisk => 0,
            RiskClass::ExternalWrite => 1,
            RiskClass::DataExfiltrationRisk => 2,
            RiskClass::NetworkRead => 3,
            RiskClass::Benign => 4,
        }
    }

    /// Whether a tool of this class is allowed to run concurrently with
    /// other read-only tools in the same round (§4.D step 4).
    pub fn is_read_only(self) -> bool {
        matches!(self, RiskClass::Benign | RiskClass::NetworkRead)
    }
}

/// The sole structured control channel between model and runtime (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub calls: Vec<EnvelopeCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    #[serde(rename = "tool_calls")]
    ToolCalls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Result of executing (or denying) a single tool call within a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub deduplicated: bool,
}

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "image")]
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error: false,
            }]),
        }
    }
}

impl MessageContent {
    /// Extract the plain-text content (first text part, or the full text).
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Extract and join all text content, returning an owned String.
    ///
    /// For `Text` variant, returns the string directly.
    /// For `Parts` variant, joins all `Text` parts with `"\n"`.
    /// Non-text parts (ToolUse, ToolResult, Image) are skipped.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_from_text_variant() {
        let content = MessageContent::Text("hello world".into());
        assert_eq!(content.extract_all_text(), "hello world");
    }

    #[test]
    fn extract_all_text_from_parts_joins_with_newline() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "line one".into() },
            ContentPart::ToolUse {
                id: "c1".into(),
                name: "exec".into(),
                input: serde_json::json!({}),
            },
            ContentPart::Text { text: "line two".into() },
        ]);
        assert_eq!(content.extract_all_text(), "line one\nline two");
    }

    #[test]
    fn extract_all_text_empty_parts() {
        let content = MessageContent::Parts(vec![]);
        assert_eq!(content.extract_all_text(), "");
    }

    #[test]
    fn risk_class_restrictiveness_ranks_high_risk_first() {
        assert!(RiskClass::HighRisk.restrictiveness_rank() < RiskClass::ExternalWrite.restrictiveness_rank());
        assert!(RiskClass::ExternalWrite.restrictiveness_rank() < RiskClass::DataExfiltrationRisk.restrictiveness_rank());
        assert!(RiskClass::DataExfiltrationRisk.restrictiveness_rank() < RiskClass::NetworkRead.restrictiveness_rank());
        assert!(RiskClass::NetworkRead.restrictiveness_rank() < RiskClass::Benign.restrictiveness_rank());
    }

    #[test]
    fn only_benign_and_network_read_are_read_only() {
        assert!(RiskClass::Benign.is_read_only());
        assert!(RiskClass::NetworkRead.is_read_only());
        assert!(!RiskClass::DataExfiltrationRisk.is_read_only());
        assert!(!RiskClass::ExternalWrite.is_read_only());
        assert!(!RiskClass::HighRisk.is_read_only());
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = ToolCallEnvelope {
            kind: EnvelopeKind::ToolCalls,
            calls: vec![EnvelopeCall {
                name: "npm_package_lookup".into(),
                args: serde_json::json!({"package": "foo"}),
            }],
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"type\":\"tool_calls\""));
        let back: ToolCallEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.calls[0].name, "npm_package_lookup");
    }
}
