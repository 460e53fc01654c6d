//! Whole-graph validation.
//!
//! [`WorkflowGraph::validate`] never mutates the graph. It returns every
//! issue found, each either blocking (save must be refused) or a warning
//! (shown, but does not block save).

use crate::graph::WorkflowGraph;
use flowdeck_core::{EdgeId, NodeId};
use std::collections::HashMap;
use std::fmt;

/// How serious a validation issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Blocking,
}

/// A problem found by validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// The workflow has no name.
    MissingName,
    /// An edge points at a node that does not exist.
    DanglingEdge { edge_id: EdgeId, missing: NodeId },
    /// A start node has an inbound edge.
    InboundToStart { edge_id: EdgeId, node_id: NodeId },
    /// An end node has an outbound edge.
    OutboundFromEnd { edge_id: EdgeId, node_id: NodeId },
    /// A branching node has more than one default edge.
    DuplicateDefaultBranch {
        node_id: NodeId,
        edge_ids: Vec<EdgeId>,
    },
    /// A branching node has two edges with the same label and condition.
    DuplicateBranch {
        node_id: NodeId,
        edge_ids: Vec<EdgeId>,
    },
    /// The graph contains a cycle.
    CycleDetected,
    /// The graph has nodes but no start node.
    NoStartNode,
    /// No path leads from a start node to this node.
    UnreachableNode { node_id: NodeId },
    /// A field the node type requires is absent or empty.
    MissingRequiredConfig { node_id: NodeId, field: String },
}

impl ValidationIssue {
    /// Returns how serious the issue is.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::NoStartNode | Self::UnreachableNode { .. } | Self::MissingRequiredConfig { .. } => {
                Severity::Warning
            }
            _ => Severity::Blocking,
        }
    }

    /// Returns true if the issue must block save.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.severity() == Severity::Blocking
    }

    /// Returns the node the issue is about, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::InboundToStart { node_id, .. }
            | Self::OutboundFromEnd { node_id, .. }
            | Self::DuplicateDefaultBranch { node_id, .. }
            | Self::DuplicateBranch { node_id, .. }
            | Self::UnreachableNode { node_id }
            | Self::MissingRequiredConfig { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingName => write!(f, "workflow name is empty"),
            Self::DanglingEdge { edge_id, missing } => {
                write!(f, "edge {edge_id} references missing node {missing}")
            }
            Self::InboundToStart { edge_id, node_id } => {
                write!(f, "edge {edge_id} enters start node {node_id}")
            }
            Self::OutboundFromEnd { edge_id, node_id } => {
                write!(f, "edge {edge_id} leaves end node {node_id}")
            }
            Self::DuplicateDefaultBranch { node_id, edge_ids } => write!(
                f,
                "node {node_id} has {} default branches",
                edge_ids.len()
            ),
            Self::DuplicateBranch { node_id, edge_ids } => write!(
                f,
                "node {node_id} has {} edges for the same branch",
                edge_ids.len()
            ),
            Self::CycleDetected => write!(f, "graph contains cycles"),
            Self::NoStartNode => write!(f, "workflow has no start node"),
            Self::UnreachableNode { node_id } => {
                write!(f, "node {node_id} is not reachable from any start node")
            }
            Self::MissingRequiredConfig { node_id, field } => {
                write!(f, "node {node_id} is missing required field '{field}'")
            }
        }
    }
}

/// The issues found by one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Records an issue.
    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Returns every issue, in discovery order.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Returns the issues that block save.
    pub fn blocking(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| issue.is_blocking())
    }

    /// Returns the issues that do not block save.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| !issue.is_blocking())
    }

    /// Returns true if any issue blocks save.
    #[must_use]
    pub fn has_blocking(&self) -> bool {
        self.blocking().next().is_some()
    }

    /// Returns true if nothing was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns true if the given issue was found.
    #[must_use]
    pub fn contains(&self, issue: &ValidationIssue) -> bool {
        self.issues.contains(issue)
    }

    /// Counts issues per node, for badge display.
    #[must_use]
    pub fn counts_by_node(&self) -> HashMap<NodeId, usize> {
        let mut counts = HashMap::new();
        for node_id in self.issues.iter().filter_map(ValidationIssue::node_id) {
            *counts.entry(node_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl IntoIterator for ValidationReport {
    type Item = ValidationIssue;
    type IntoIter = std::vec::IntoIter<ValidationIssue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.into_iter()
    }
}

impl WorkflowGraph {
    /// Checks the whole graph and reports every issue found.
    ///
    /// The workflow name is not part of the graph; callers holding a
    /// definition add [`ValidationIssue::MissingName`] themselves.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for edge in self.dangling_edges() {
            let missing = if self.contains_node(&edge.source) {
                edge.target.clone()
            } else {
                edge.source.clone()
            };
            report.push(ValidationIssue::DanglingEdge {
                edge_id: edge.id.clone(),
                missing,
            });
        }

        for edge in self.edges() {
            if self.node(&edge.target).is_some_and(|n| n.kind().is_start()) {
                report.push(ValidationIssue::InboundToStart {
                    edge_id: edge.id.clone(),
                    node_id: edge.target.clone(),
                });
            }
            if self.node(&edge.source).is_some_and(|n| n.kind().is_end()) {
                report.push(ValidationIssue::OutboundFromEnd {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.clone(),
                });
            }
        }

        for node in self.nodes().filter(|node| node.kind().is_branching()) {
            let outgoing = self.outgoing(&node.id);

            let defaults: Vec<EdgeId> = outgoing
                .iter()
                .filter(|edge| edge.is_default_branch())
                .map(|edge| edge.id.clone())
                .collect();
            if defaults.len() > 1 {
                report.push(ValidationIssue::DuplicateDefaultBranch {
                    node_id: node.id.clone(),
                    edge_ids: defaults,
                });
            }

            // Conditions are not hashable; group by label and condition JSON text.
            let mut groups: Vec<((Option<&str>, String), Vec<EdgeId>)> = Vec::new();
            for edge in &outgoing {
                if edge.is_default_branch() {
                    continue;
                }
                let condition = edge
                    .condition
                    .as_ref()
                    .and_then(|condition| serde_json::to_string(condition).ok())
                    .unwrap_or_default();
                let key = (edge.branch_label(), condition);
                match groups.iter_mut().find(|(existing, _)| *existing == key) {
                    Some((_, ids)) => ids.push(edge.id.clone()),
                    None => groups.push((key, vec![edge.id.clone()])),
                }
            }
            for (_, edge_ids) in groups.into_iter().filter(|(_, ids)| ids.len() > 1) {
                report.push(ValidationIssue::DuplicateBranch {
                    node_id: node.id.clone(),
                    edge_ids,
                });
            }
        }

        if self.has_cycle() {
            report.push(ValidationIssue::CycleDetected);
        }

        if self.node_count() > 0 && self.start_nodes().is_empty() {
            report.push(ValidationIssue::NoStartNode);
        } else {
            let reachable = self.reachable_from_starts();
            for node in self.nodes().filter(|node| !reachable.contains(&node.id)) {
                report.push(ValidationIssue::UnreachableNode {
                    node_id: node.id.clone(),
                });
            }
        }

        for node in self.nodes() {
            for field in node.config.missing_required() {
                report.push(ValidationIssue::MissingRequiredConfig {
                    node_id: node.id.clone(),
                    field: field.to_string(),
                });
            }
        }

        report
    }
}
