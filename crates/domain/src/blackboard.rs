//! The `Blackboard` -- per-turn mutable state shared across the context
//! graph, tool loop, critic, and validator (§3). Owned exclusively by the
//! orchestrator for the duration of one turn; every other component
//! receives a read-only view and hands back artifacts rather than mutating
//! this directly, so ownership is enforced by the borrow checker.

use serde::{Deserialize, Serialize};

/// A packet of context produced by a provider node (§3). Binary-bearing
/// packets contribute files to the final reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPacket {
    pub name: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinaryAttachment>,
    pub token_estimate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryAttachment {
    pub data: Vec<u8>,
    pub filename: String,
}

/// The kind of artifact written to the blackboard (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ContextPacket,
    ToolResult,
    Diagnostic,
    AnswerDraft,
    FinalAnswer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub label: String,
    pub content: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub source_agent: String,
    #[serde(default)]
    pub provenance: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet: Option<ContextPacket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

/// Running per-turn counters (§3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BlackboardCounters {
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub total_estimated_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blackboard {
    artifacts: Vec<Artifact>,
    counters: BlackboardCounters,
    unresolved_questions: Vec<String>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an artifact in write order. Blackboard is append-only: once
    /// written, an artifact is never mutated or removed.
    pub fn push_artifact(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
    }

    /// Record the outcome of one graph task against the running counters,
    /// and add its token estimate (if any) to the running total.
    pub fn record_task_result(&mut self, succeeded: bool, estimated_tokens: u64) {
        if succeeded {
            self.counters.completed_tasks += 1;
        } else {
            self.counters.failed_tasks += 1;
        }
        self.counters.total_estimated_tokens += estimated_tokens;
    }

    pub fn add_unresolved_question(&mut self, question: impl Into<String>) {
        self.unresolved_questions.push(question.into());
    }

    pub fn counters(&self) -> BlackboardCounters {
        self.counters
    }

    pub fn unresolved_questions(&self) -> &[String] {
        &self.unresolved_questions
    }

    /// All artifacts written by a given source agent / node id, in write order.
    pub fn by_source_agent(&self, source_agent: &str) -> Vec<&Artifact> {
        self.artifacts.iter().filter(|a| a.source_agent == source_agent).collect()
    }

    /// All artifacts written by any of the given source agents, in write order.
    pub fn by_source_agents(&self, source_agents: &[String]) -> Vec<&Artifact> {
        self.artifacts
            .iter()
            .filter(|a| source_agents.iter().any(|n| n == &a.source_agent))
            .collect()
    }

    pub fn by_kind(&self, kind: ArtifactKind) -> Vec<&Artifact> {
        self.artifacts.iter().filter(|a| a.kind == kind).collect()
    }

    pub fn all(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(id: &str, source_agent: &str, kind: ArtifactKind) -> Artifact {
        Artifact {
            id: id.into(),
            kind,
            label: id.into(),
            content: "result".into(),
            confidence: 0.9,
            source_agent: source_agent.into(),
            provenance: Vec::new(),
            packet: None,
            json: None,
        }
    }

    #[test]
    fn push_then_read_by_source_agent() {
        let mut bb = Blackboard::new();
        bb.push_artifact(artifact("a1", "node-a", ArtifactKind::ContextPacket));
        bb.push_artifact(artifact("a2", "node-b", ArtifactKind::ToolResult));
        bb.push_artifact(artifact("a3", "node-a", ArtifactKind::FinalAnswer));

        let from_a = bb.by_source_agent("node-a");
        assert_eq!(from_a.len(), 2);
        assert_eq!(from_a[0].id, "a1");
        assert_eq!(from_a[1].id, "a3");
    }

    #[test]
    fn by_source_agents_preserves_write_order_across_multiple_nodes() {
        let mut bb = Blackboard::new();
        bb.push_artifact(artifact("a1", "node-a", ArtifactKind::ContextPacket));
        bb.push_artifact(artifact("a2", "node-b", ArtifactKind::ContextPacket));
        bb.push_artifact(artifact("a3", "node-c", ArtifactKind::ContextPacket));

        let upstream = bb.by_source_agents(&["node-a".into(), "node-c".into()]);
        let ids: Vec<&str> = upstream.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
    }

    #[test]
    fn unknown_source_agent_returns_empty() {
        let bb = Blackboard::new();
        assert!(bb.by_source_agent("ghost").is_empty());
    }

    #[test]
    fn record_task_result_updates_counters_and_tokens() {
        let mut bb = Blackboard::new();
        bb.record_task_result(true, 120);
        bb.record_task_result(false, 30);
        let c = bb.counters();
        assert_eq!(c.completed_tasks, 1);
        assert_eq!(c.failed_tasks, 1);
        assert_eq!(c.total_estimated_tokens, 150);
    }

    #[test]
    fn unresolved_questions_accumulate_in_order() {
        let mut bb = Blackboard::new();
        bb.add_unresolved_question("what timezone?");
        bb.add_unresolved_question("which repo?");
        assert_eq!(bb.unresolved_questions(), &["what timezone?", "which repo?"]);
    }
}
