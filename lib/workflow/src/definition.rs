//! Workflow definition types.
//!
//! A [`WorkflowDefinition`] is the persisted form of a workflow:
//! - Metadata (name, description, status, triggers, version, timestamps)
//! - The node and edge lists, as plain payloads
//! - Anything else the server sent, kept verbatim in `extra`
//!
//! Conversion between payloads and a [`WorkflowGraph`] goes through
//! [`WorkflowGraph::from_definition_payload`] and
//! [`WorkflowGraph::to_definition_payload`], which round-trip losslessly.

use crate::edge::{Edge, EdgeCondition};
use crate::error::{ConfigError, GraphError};
use crate::graph::WorkflowGraph;
use crate::node::{JsonMap, Node, NodeConfig, NodeKind, Position};
use chrono::{DateTime, NaiveDateTime, Utc};
use flowdeck_core::{EdgeId, NodeId, WorkflowId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Being edited; never triggered.
    #[default]
    #[serde(alias = "DRAFT")]
    Draft,
    /// Can be triggered.
    #[serde(alias = "ACTIVE")]
    Active,
    /// Disabled.
    #[serde(alias = "INACTIVE")]
    Inactive,
    /// Kept for reference only.
    #[serde(alias = "ARCHIVED")]
    Archived,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// What can start a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    PersonMessage,
    GroupMessage,
    #[serde(alias = "schedule")]
    Scheduled,
    Manual,
    Api,
}

impl TriggerType {
    /// Returns the wire name of this trigger.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonMessage => "person_message",
            Self::GroupMessage => "group_message",
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(JsonValue::String(s.to_string()))
            .map_err(|_| format!("unknown trigger type: {s}"))
    }
}

/// Declared workflow variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub var_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl VariableDefinition {
    /// Value the variable holds when a run starts.
    #[must_use]
    pub fn initial_value(&self) -> JsonValue {
        self.default
            .clone()
            .or_else(|| self.value.clone())
            .unwrap_or(JsonValue::Null)
    }
}

/// A node as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub config: JsonValue,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// An edge as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgePayload {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EdgeCondition>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// The node and edge lists of a definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<NodePayload>,
    #[serde(default)]
    pub edges: Vec<EdgePayload>,
}

/// A complete persisted workflow definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Server-assigned ID; absent until first saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<WorkflowId>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default, deserialize_with = "lenient_triggers")]
    pub trigger_types: Vec<TriggerType>,
    #[serde(flatten)]
    pub graph: GraphPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, VariableDefinition>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    /// Fields this build does not model, preserved for the next save.
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl WorkflowDefinition {
    /// Creates an empty, unsaved definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the initial value of every declared variable.
    #[must_use]
    pub fn variable_defaults(&self) -> BTreeMap<String, JsonValue> {
        self.variables
            .iter()
            .map(|(name, def)| (name.clone(), def.initial_value()))
            .collect()
    }

    /// Adds any trigger implied by a start node that is not yet declared.
    pub fn merge_implied_triggers(&mut self, graph: &WorkflowGraph) {
        for node in graph.start_nodes() {
            let Some(trigger) = node.config.implied_trigger() else {
                continue;
            };
            if !self.trigger_types.contains(&trigger) {
                self.trigger_types.push(trigger);
            }
        }
    }
}

/// Drops unknown trigger names instead of rejecting the whole definition.
fn lenient_triggers<'de, D>(deserializer: D) -> Result<Vec<TriggerType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<JsonValue>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<TriggerType>(value.clone()) {
            Ok(trigger) => Some(trigger),
            Err(_) => {
                warn!(trigger = %value, "ignoring unknown trigger type");
                None
            }
        })
        .collect())
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DDTHH:MM:SS[.f]` taken as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, format) {
            return Ok(Some(naive.and_utc()));
        }
    }
    warn!(timestamp = %raw, "ignoring unparseable timestamp");
    Ok(None)
}

impl WorkflowGraph {
    /// Builds a graph from persisted node and edge payloads.
    ///
    /// Edges whose endpoints are missing are kept as dangling edges and
    /// reported by validation.
    ///
    /// # Errors
    ///
    /// Returns an error if two nodes or two edges share an ID, or a node
    /// config does not fit its kind.
    pub fn from_definition_payload(payload: &GraphPayload) -> Result<Self, GraphError> {
        let mut graph = Self::new();

        for node in &payload.nodes {
            let kind = NodeKind::from(node.node_type.as_str());
            let config = match &node.config {
                JsonValue::Null => Ok(NodeConfig::empty(&kind)),
                JsonValue::Object(map) => NodeConfig::from_json(&kind, map.clone()),
                _ => Err(ConfigError::NotAnObject {
                    node_type: kind.to_string(),
                }),
            }
            .map_err(|error| GraphError::InvalidConfig {
                node_id: node.id.clone(),
                error,
            })?;

            graph.insert_node(Node {
                id: node.id.clone(),
                name: node.name.clone(),
                description: node.description.clone(),
                position: node.position,
                config,
                extra: node.extra.clone(),
            })?;
        }

        for edge in &payload.edges {
            graph.insert_edge(Edge {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                label: edge.label.clone(),
                condition: edge.condition.clone(),
                extra: edge.extra.clone(),
            })?;
        }

        Ok(graph)
    }

    /// Writes the graph as persisted node and edge payloads.
    #[must_use]
    pub fn to_definition_payload(&self) -> GraphPayload {
        GraphPayload {
            nodes: self
                .nodes()
                .map(|node| NodePayload {
                    id: node.id.clone(),
                    node_type: node.kind().to_string(),
                    name: node.name.clone(),
                    description: node.description.clone(),
                    position: node.position,
                    config: JsonValue::Object(node.config.to_json()),
                    extra: node.extra.clone(),
                })
                .collect(),
            edges: self
                .all_edges()
                .map(|edge| EdgePayload {
                    id: edge.id.clone(),
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    label: edge.label.clone(),
                    condition: edge.condition.clone(),
                    extra: edge.extra.clone(),
                })
                .collect(),
        }
    }
}
