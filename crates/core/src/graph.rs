//! Context graph executor (§4.C): dependency-ordered, bounded-parallel
//! scheduling of context-provider nodes over an `AgentGraph`.

use agentrt_domain::blackboard::{Artifact, ArtifactKind, Blackboard, ContextPacket};
use agentrt_domain::collab::ContextProviderRunner;
use agentrt_domain::error::{CoreError, Result};
use agentrt_domain::graph::{AgentGraph, GraphNode};
use agentrt_domain::trace::TraceEvent;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NodeRun {
    pub node_id: String,
    pub attempts: u32,
    pub succeeded: bool,
    pub confidence: f64,
}

pub struct GraphExecutionResult {
    pub blackboard: Blackboard,
    pub events: Vec<TraceEvent>,
    pub packets: Vec<ContextPacket>,
    pub node_runs: Vec<NodeRun>,
}

/// `execute` (§4.C contract). Pre-validates the graph, then schedules waves
/// of ready nodes (all `dependsOn` settled), dispatching up to
/// `max_parallel` node attempts concurrently per wave via `join_all`,
/// chunked exactly like `runtime/turn.rs`'s concurrent tool dispatch.
pub async fn execute(
    trace_id: &str,
    graph: &AgentGraph,
    runner: &dyn ContextProviderRunner,
    max_parallel: usize,
) -> Result<GraphExecutionResult> {
    let mut events = Vec::new();

    let issues = graph.validate();
    if !issues.is_empty() {
        let detail: Vec<String> = issues.iter().map(|i| format!("{i:?}")).collect();
        let event = TraceEvent::GraphValidationFailed { trace_id: trace_id.to_string(), issues: detail.clone() };
        event.emit();
        events.push(event);
        return Err(CoreError::Graph(format!("graph failed validation: {}", detail.join("; "))));
    }

    let start_event = TraceEvent::GraphStarted { trace_id: trace_id.to_string(), node_count: graph.nodes.len() };
    start_event.emit();
    events.push(start_event);

    let mut blackboard = Blackboard::new();
    let mut packets = Vec::new();
    let mut node_runs = Vec::new();

    let mut settled: HashSet<String> = HashSet::new();
    let mut pending: HashSet<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
    let mut produced: HashMap<String, Vec<Artifact>> = HashMap::new();

    while !pending.is_empty() {
        let wave: Vec<&GraphNode> = graph
            .nodes
            .iter()
            .filter(|n| pending.contains(&n.id) && n.depends_on.iter().all(|d| settled.contains(d)))
            .collect();

        if wave.is_empty() {
            blackboard.add_unresolved_question(format!(
                "unreachable dependency among pending nodes: {}",
                pending.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
            break;
        }

        for chunk in wave.chunks(max_parallel.max(1)) {
            let futures = chunk.iter().map(|node| {
                let upstream: Vec<Artifact> =
                    node.depends_on.iter().flat_map(|d| produced.get(d).cloned().unwrap_or_default()).collect();
                run_node_with_retry(trace_id, graph, *node, runner, upstream)
            });
            let results = futures_util::future::join_all(futures).await;

            for (node, outcome) in chunk.iter().zip(results.into_iter()) {
                for event in &outcome.events {
                    event.emit();
                }
                events.extend(outcome.events);
                node_runs.push(NodeRun {
                    node_id: node.id.clone(),
                    attempts: outcome.attempts,
                    succeeded: outcome.succeeded,
                    confidence: outcome.confidence,
                });

                let mut node_artifacts = Vec::new();
                for packet in &outcome.packets {
                    let artifact = Artifact {
                        id: Uuid::new_v4().to_string(),
                        kind: ArtifactKind::ContextPacket,
                        label: packet.name.clone(),
                        content: packet.content.clone(),
                        confidence: outcome.confidence,
                        source_agent: node.id.clone(),
                        provenance: vec![node.id.clone()],
                        packet: Some(packet.clone()),
                        json: packet.json.clone(),
                    };
                    let written = TraceEvent::ArtifactWritten {
                        trace_id: trace_id.to_string(),
                        artifact_id: artifact.id.clone(),
                        kind: "context_packet".to_string(),
                    };
                    written.emit();
                    events.push(written);
                    node_artifacts.push(artifact);
                }

                let estimated_tokens: u64 = outcome.packets.iter().map(|p| p.token_estimate as u64).sum();
                blackboard.record_task_result(outcome.succeeded, estimated_tokens);
                for artifact in &node_artifacts {
                    blackboard.push_artifact(artifact.clone());
                }
                packets.extend(outcome.packets.clone());
                produced.insert(node.id.clone(), node_artifacts);

                settled.insert(node.id.clone());
                pending.remove(&node.id);
            }
        }
    }

    let counters = blackboard.counters();
    let completed_event = TraceEvent::GraphCompleted {
        trace_id: trace_id.to_string(),
        completed_tasks: counters.completed_tasks,
        failed_tasks: counters.failed_tasks,
    };
    completed_event.emit();
    events.push(completed_event);

    Ok(GraphExecutionResult { blackboard, events, packets, node_runs })
}

struct NodeOutcome {
    events: Vec<TraceEvent>,
    packets: Vec<ContextPacket>,
    attempts: u32,
    succeeded: bool,
    confidence: f64,
}

async fn run_node_with_retry(
    trace_id: &str,
    graph: &AgentGraph,
    node: &GraphNode,
    runner: &dyn ContextProviderRunner,
    upstream: Vec<Artifact>,
) -> NodeOutcome {
    let mut events = Vec::new();
    let max_attempts = node.budget.max_retries + 1;
    let deadline = Duration::from_millis(node.budget.max_latency_ms);

    for attempt in 1..=max_attempts {
        let event = if attempt == 1 {
            TraceEvent::NodeStarted { trace_id: trace_id.to_string(), node_id: node.id.clone(), attempt }
        } else {
            TraceEvent::NodeRetry { trace_id: trace_id.to_string(), node_id: node.id.clone(), attempt }
        };
        events.push(event);

        let call = runner.run_node(graph, &node.id, upstream.clone());
        let result = tokio::time::timeout(deadline, call).await;

        match result {
            Ok(Ok(packets)) => {
                let confidence = if packets.iter().any(|p| p.json.as_ref().and_then(|j| j.get("error")).is_some()) {
                    0.4
                } else {
                    0.8
                };
                events.push(TraceEvent::NodeCompleted { trace_id: trace_id.to_string(), node_id: node.id.clone(), confidence });
                return NodeOutcome { events, packets, attempts: attempt, succeeded: true, confidence };
            }
            Ok(Err(e)) => {
                if attempt == max_attempts {
                    events.push(TraceEvent::NodeFailed {
                        trace_id: trace_id.to_string(),
                        node_id: node.id.clone(),
                        error: e.to_string(),
                    });
                    return NodeOutcome { events, packets: Vec::new(), attempts: attempt, succeeded: false, confidence: 0.0 };
                }
            }
            Err(_elapsed) => {
                if attempt == max_attempts {
                    events.push(TraceEvent::NodeFailed {
                        trace_id: trace_id.to_string(),
                        node_id: node.id.clone(),
                        error: format!("timeout after {}ms", node.budget.max_latency_ms),
                    });
                    return NodeOutcome { events, packets: Vec::new(), attempts: attempt, succeeded: false, confidence: 0.0 };
                }
            }
        }
    }

    unreachable!("loop always returns by max_attempts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::graph::{GraphEdge, NodeBudget};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn node(id: &str, depends_on: &[&str]) -> GraphNode {
        GraphNode {
            id: id.into(),
            agent: "provider".into(),
            objective: "gather context".into(),
            inputs: serde_json::Value::Null,
            success_criteria: String::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            budget: NodeBudget { max_latency_ms: 1_000, max_retries: 1, max_input_tokens: None, max_output_tokens: None },
            metadata: serde_json::Value::Null,
        }
    }

    fn edge(from: &str, to: &str) -> GraphEdge {
        GraphEdge { from: from.into(), to: to.into() }
    }

    struct AlwaysSucceeds;
    #[async_trait]
    impl ContextProviderRunner for AlwaysSucceeds {
        async fn run_node(&self, _graph: &AgentGraph, node_id: &str, _upstream: Vec<Artifact>) -> Result<Vec<ContextPacket>> {
            Ok(vec![ContextPacket {
                name: node_id.to_string(),
                content: format!("content from {node_id}"),
                json: None,
                binary: None,
                token_estimate: 10,
            }])
        }
    }

    struct AlwaysFails {
        attempts: AtomicU32,
    }
    #[async_trait]
    impl ContextProviderRunner for AlwaysFails {
        async fn run_node(&self, _graph: &AgentGraph, _node_id: &str, _upstream: Vec<Artifact>) -> Result<Vec<ContextPacket>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::Dependency("provider unavailable".into()))
        }
    }

    #[tokio::test]
    async fn linear_graph_executes_in_dependency_order() {
        let graph = AgentGraph {
            version: "v1".into(),
            nodes: vec![node("a", &[]), node("b", &["a"])],
            edges: vec![edge("a", "b")],
        };
        let result = execute("trace-1", &graph, &AlwaysSucceeds, 4).await.unwrap();
        assert_eq!(result.node_runs.len(), 2);
        assert!(result.node_runs.iter().all(|r| r.succeeded));
        assert_eq!(result.blackboard.counters().completed_tasks, 2);
        assert_eq!(result.packets.len(), 2);
    }

    #[tokio::test]
    async fn invalid_graph_is_rejected_before_execution() {
        let graph = AgentGraph { version: "v2".into(), nodes: vec![], edges: vec![] };
        let err = execute("trace-1", &graph, &AlwaysSucceeds, 4).await.unwrap_err();
        assert!(err.to_string().contains("graph"));
    }

    #[tokio::test]
    async fn exhausted_retries_produce_one_failed_node_and_no_artifacts() {
        let graph = AgentGraph { version: "v1".into(), nodes: vec![node("a", &[])], edges: vec![] };
        let runner = AlwaysFails { attempts: AtomicU32::new(0) };
        let result = execute("trace-1", &graph, &runner, 4).await.unwrap();
        assert_eq!(result.node_runs.len(), 1);
        assert!(!result.node_runs[0].succeeded);
        assert!(result.packets.is_empty());
        assert_eq!(result.blackboard.counters().failed_tasks, 1);
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 2); // max_retries + 1
    }

    #[tokio::test]
    async fn dependents_of_failed_node_still_run() {
        let graph = AgentGraph {
            version: "v1".into(),
            nodes: vec![node("a", &[]), node("b", &["a"])],
            edges: vec![edge("a", "b")],
        };
        let runner = Arc::new(AlwaysFails { attempts: AtomicU32::new(0) });
        let result = execute("trace-1", &graph, runner.as_ref(), 4).await.unwrap();
        assert_eq!(result.node_runs.len(), 2);
        assert!(result.node_runs.iter().all(|r| !r.succeeded));
    }
}
