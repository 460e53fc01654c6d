//! Edge types for workflow graphs.
//!
//! An edge is a directed link from one node to another. Edges leaving a
//! branching node are told apart by their label and [`EdgeCondition`]
//! together; an edge with neither is that node's default branch.

use crate::node::JsonMap;
use flowdeck_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One condition evaluated by a `condition` node, also used to tag edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCondition {
    /// Condition type, e.g. `equals`, `contains`, `regex`, `branch`.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Field of the upstream output to inspect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Value to compare against.
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub value: JsonValue,
    /// Comparison operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl EdgeCondition {
    /// Creates an equality condition on a field.
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            condition_type: "equals".to_string(),
            field: Some(field.into()),
            value: value.into(),
            operator: Some("equals".to_string()),
            extra: JsonMap::new(),
        }
    }

    /// Creates a condition that selects a named branch.
    #[must_use]
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            condition_type: "branch".to_string(),
            field: None,
            value: JsonValue::String(name.into()),
            operator: None,
            extra: JsonMap::new(),
        }
    }
}

/// A directed edge in a workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Unique identifier for this edge within the workflow.
    pub id: EdgeId,
    /// The node the edge leaves.
    pub source: NodeId,
    /// The node the edge enters.
    pub target: NodeId,
    /// Branch name the source routes on, e.g. `true` or `command`.
    pub label: Option<String>,
    /// Extra branch discriminator.
    pub condition: Option<EdgeCondition>,
    /// Persisted fields outside the known edge shape.
    pub extra: JsonMap,
}

impl Edge {
    /// Creates an unconditional edge with a fresh ID.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: EdgeId::generate(),
            source,
            target,
            label: None,
            condition: None,
            extra: JsonMap::new(),
        }
    }

    /// Sets the branch discriminator.
    #[must_use]
    pub fn with_condition(mut self, condition: EdgeCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Sets the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns the label, treating an empty one as absent.
    #[must_use]
    pub fn branch_label(&self) -> Option<&str> {
        self.label.as_deref().filter(|label| !label.is_empty())
    }

    /// Returns true if this edge is its source's default branch.
    #[must_use]
    pub fn is_default_branch(&self) -> bool {
        self.branch_label().is_none() && self.condition.is_none()
    }

    /// Returns true if both edges select the same branch of their source.
    #[must_use]
    pub fn same_branch(&self, label: Option<&str>, condition: Option<&EdgeCondition>) -> bool {
        self.branch_label() == label.filter(|label| !label.is_empty())
            && self.condition.as_ref() == condition
    }

    /// Returns true if the edge touches the given node at either end.
    #[must_use]
    pub fn touches(&self, node_id: &NodeId) -> bool {
        &self.source == node_id || &self.target == node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_edge_is_default_branch() {
        let edge = Edge::new(NodeId::new("a"), NodeId::new("b"));
        assert!(edge.is_default_branch());
        assert!(edge.id.as_str().starts_with("edge_"));
    }

    #[test]
    fn conditioned_edge_is_not_default() {
        let edge = Edge::new(NodeId::new("a"), NodeId::new("b"))
            .with_condition(EdgeCondition::branch("command"));
        assert!(!edge.is_default_branch());
    }

    #[test]
    fn labelled_edge_is_not_default() {
        let edge = Edge::new(NodeId::new("a"), NodeId::new("b")).with_label("true");
        assert!(!edge.is_default_branch());
        assert!(edge.same_branch(Some("true"), None));
        assert!(!edge.same_branch(Some("false"), None));

        let blank = Edge::new(NodeId::new("a"), NodeId::new("b")).with_label("");
        assert!(blank.is_default_branch());
        assert!(blank.same_branch(None, None));
    }

    #[test]
    fn condition_without_value_stays_without_value() {
        let raw = json!({"type": "branch", "field": "kind"});
        let condition: EdgeCondition = serde_json::from_value(raw.clone()).expect("parse");
        assert!(condition.value.is_null());
        assert_eq!(serde_json::to_value(&condition).expect("serialize"), raw);
    }

    #[test]
    fn touches_checks_both_ends() {
        let edge = Edge::new(NodeId::new("a"), NodeId::new("b"));
        assert!(edge.touches(&NodeId::new("a")));
        assert!(edge.touches(&NodeId::new("b")));
        assert!(!edge.touches(&NodeId::new("c")));
    }

    #[test]
    fn condition_keeps_unknown_fields() {
        let raw = json!({
            "type": "contains",
            "field": "message",
            "value": "hello",
            "case_sensitive": false
        });
        let condition: EdgeCondition = serde_json::from_value(raw.clone()).expect("parse");
        assert_eq!(condition.operator, None);
        assert_eq!(condition.extra.get("case_sensitive"), Some(&json!(false)));
        assert_eq!(serde_json::to_value(&condition).expect("serialize"), raw);
    }

    #[test]
    fn equal_conditions_compare_equal() {
        assert_eq!(
            EdgeCondition::equals("intent", "greet"),
            EdgeCondition::equals("intent", "greet")
        );
        assert_ne!(EdgeCondition::branch("a"), EdgeCondition::branch("b"));
    }
}
