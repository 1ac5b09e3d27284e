//! The `AgentGraph` data model (§3) and its pre-execution validator (§4.C).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const GRAPH_VERSION: &str = "v1";

/// Policy ceilings a node's budget may never exceed (§3).
pub const MAX_LATENCY_MS_CEILING: u64 = 5 * 60 * 1000;
pub const MAX_RETRIES_CEILING: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentGraph {
    pub version: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub agent: String,
    pub objective: String,
    #[serde(default)]
    pub inputs: serde_json::Value,
    #[serde(default)]
    pub success_criteria: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub budget: NodeBudget,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeBudget {
    pub max_latency_ms: u64,
    pub max_retries: u32,
    #[serde(default)]
    pub max_input_tokens: Option<u32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GraphIssue {
    DuplicateId(String),
    SelfEdge(String),
    UnknownEdgeEndpoint { edge: GraphEdgeRef, endpoint: String },
    BudgetCeilingViolated { node_id: String, detail: String },
    MissingDependsOnEdge { node_id: String, dependency: String },
    MissingEdgeDependsOn { from: String, to: String },
    Cycle(Vec<String>),
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdgeRef {
    pub from: String,
    pub to: String,
}

impl AgentGraph {
    /// Validate every invariant named in §3/§4.C. Returns an empty vec iff the
    /// graph is safe to execute. Never panics on malformed input.
    pub fn validate(&self) -> Vec<GraphIssue> {
        let mut issues = Vec::new();

        if self.version != GRAPH_VERSION {
            issues.push(GraphIssue::UnsupportedVersion(self.version.clone()));
        }

        let mut seen_ids: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            if !seen_ids.insert(node.id.as_str()) {
                issues.push(GraphIssue::DuplicateId(node.id.clone()));
            }
        }
        let node_ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();

        for edge in &self.edges {
            if edge.from == edge.to {
                issues.push(GraphIssue::SelfEdge(edge.from.clone()));
            }
            if !node_ids.contains(edge.from.as_str()) {
                issues.push(GraphIssue::UnknownEdgeEndpoint {
                    edge: GraphEdgeRef { from: edge.from.clone(), to: edge.to.clone() },
                    endpoint: edge.from.clone(),
                });
            }
            if !node_ids.contains(edge.to.as_str()) {
                issues.push(GraphIssue::UnknownEdgeEndpoint {
                    edge: GraphEdgeRef { from: edge.from.clone(), to: edge.to.clone() },
                    endpoint: edge.to.clone(),
                });
            }
        }

        let edge_set: HashSet<(&str, &str)> =
            self.edges.iter().map(|e| (e.from.as_str(), e.to.as_str())).collect();

        for node in &self.nodes {
            if node.depends_on.contains(&node.id) {
                issues.push(GraphIssue::SelfEdge(node.id.clone()));
            }
            for dep in &node.depends_on {
                if !edge_set.contains((dep.as_str(), node.id.as_str())) {
                    issues.push(GraphIssue::MissingDependsOnEdge {
                        node_id: node.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            if node.budget.max_latency_ms > MAX_LATENCY_MS_CEILING {
                issues.push(GraphIssue::BudgetCeilingViolated {
                    node_id: node.id.clone(),
                    detail: format!(
                        "max_latency_ms {} exceeds ceiling {}",
                        node.budget.max_latency_ms, MAX_LATENCY_MS_CEILING
                    ),
                });
            }
            if node.budget.max_retries > MAX_RETRIES_CEILING {
                issues.push(GraphIssue::BudgetCeilingViolated {
                    node_id: node.id.clone(),
                    detail: format!(
                        "max_retries {} exceeds ceiling {}",
                        node.budget.max_retries, MAX_RETRIES_CEILING
                    ),
                });
            }
        }

        // Every edge must mirror a depends_on entry on the `to` node.
        let depends_on_by_node: HashMap<&str, &Vec<String>> =
            self.nodes.iter().map(|n| (n.id.as_str(), &n.depends_on)).collect();
        for edge in &self.edges {
            if let Some(deps) = depends_on_by_node.get(edge.to.as_str()) {
                if !deps.iter().any(|d| d == &edge.from) {
                    issues.push(GraphIssue::MissingEdgeDependsOn {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            issues.push(GraphIssue::Cycle(cycle));
        }

        issues
    }

    /// Iterative DFS with temporary/permanent marks; returns the first cycle found.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Temp,
            Perm,
        }

        let adjacency: HashMap<&str, Vec<&str>> = {
            let mut m: HashMap<&str, Vec<&str>> = HashMap::new();
            for edge in &self.edges {
                m.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
            }
            m
        };

        let mut marks: HashMap<&str, Mark> = HashMap::new();

        for node in &self.nodes {
            if marks.contains_key(node.id.as_str()) {
                continue;
            }
            // Explicit stack of (node, child-index) frames — no recursion.
            let mut stack: Vec<(&str, usize)> = vec![(node.id.as_str(), 0)];
            marks.insert(node.id.as_str(), Mark::Temp);
            let mut path: Vec<&str> = vec![node.id.as_str()];

            while let Some((current, idx)) = stack.last().copied() {
                let children = adjacency.get(current).map(|v| v.as_slice()).unwrap_or(&[]);
                if idx >= children.len() {
                    marks.insert(current, Mark::Perm);
                    stack.pop();
                    path.pop();
                    continue;
                }
                let child = children[idx];
                stack.last_mut().unwrap().1 += 1;

                match marks.get(child) {
                    Some(Mark::Perm) => continue,
                    Some(Mark::Temp) => {
                        let start = path.iter().position(|n| *n == child).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|s| s.to_string()).collect();
                        cycle.push(child.to_string());
                        return Some(cycle);
                    }
                    None => {
                        marks.insert(child, Mark::Temp);
                        path.push(child);
                        stack.push((child, 0));
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, depends_on: &[&str]) -> GraphNode {
        GraphNode {
            id: id.into(),
            agent: "planner".into(),
            objective: "do work".into(),
            inputs: serde_json::Value::Null,
            success_criteria: String::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            budget: NodeBudget {
                max_latency_ms: 10_000,
                max_retries: 1,
                max_input_tokens: None,
                max_output_tokens: None,
            },
            metadata: serde_json::Value::Null,
        }
    }

    fn edge(from: &str, to: &str) -> GraphEdge {
        GraphEdge { from: from.into(), to: to.into() }
    }

    #[test]
    fn empty_graph_is_valid() {
        let g = AgentGraph { version: "v1".into(), nodes: vec![], edges: vec![] };
        assert!(g.validate().is_empty());
    }

    #[test]
    fn linear_graph_is_valid() {
        let g = AgentGraph {
            version: "v1".into(),
            nodes: vec![node("a", &[]), node("b", &["a"])],
            edges: vec![edge("a", "b")],
        };
        assert!(g.validate().is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let g = AgentGraph {
            version: "v1".into(),
            nodes: vec![node("a", &[]), node("a", &[])],
            edges: vec![],
        };
        assert!(g.validate().contains(&GraphIssue::DuplicateId("a".into())));
    }

    #[test]
    fn self_loop_is_rejected() {
        let g = AgentGraph {
            version: "v1".into(),
            nodes: vec![node("a", &["a"])],
            edges: vec![edge("a", "a")],
        };
        let issues = g.validate();
        assert!(issues.iter().any(|i| matches!(i, GraphIssue::SelfEdge(n) if n == "a")));
    }

    #[test]
    fn cycle_is_rejected() {
        let g = AgentGraph {
            version: "v1".into(),
            nodes: vec![node("a", &["c"]), node("b", &["a"]), node("c", &["b"])],
            edges: vec![edge("c", "a"), edge("a", "b"), edge("b", "c")],
        };
        let issues = g.validate();
        assert!(issues.iter().any(|i| matches!(i, GraphIssue::Cycle(_))));
    }

    #[test]
    fn depends_on_without_matching_edge_is_rejected() {
        let g = AgentGraph {
            version: "v1".into(),
            nodes: vec![node("a", &[]), node("b", &["a"])],
            edges: vec![],
        };
        let issues = g.validate();
        assert!(issues
            .iter()
            .any(|i| matches!(i, GraphIssue::MissingDependsOnEdge { node_id, .. } if node_id == "b")));
    }

    #[test]
    fn budget_ceiling_violation_is_rejected() {
        let mut n = node("a", &[]);
        n.budget.max_latency_ms = MAX_LATENCY_MS_CEILING + 1;
        let g = AgentGraph { version: "v1".into(), nodes: vec![n], edges: vec![] };
        assert!(g
            .validate()
            .iter()
            .any(|i| matches!(i, GraphIssue::BudgetCeilingViolated { .. })));
    }

    #[test]
    fn unknown_edge_endpoint_is_rejected() {
        let g = AgentGraph {
            version: "v1".into(),
            nodes: vec![node("a", &[])],
            edges: vec![edge("a", "ghost")],
        };
        assert!(g
            .validate()
            .iter()
            .any(|i| matches!(i, GraphIssue::UnknownEdgeEndpoint { .. })));
    }
}
