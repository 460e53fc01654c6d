//! Request and response bodies of the persistence service.

use flowdeck_core::{ExecutionId, NodeId};
use flowdeck_workflow::{JsonMap, TriggerType, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Field to order workflow listings by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortBy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

/// Direction of a workflow listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Body of an execute call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub trigger: TriggerType,
    #[serde(default)]
    pub trigger_data: JsonMap,
}

/// Answer to an execute call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub execution_id: ExecutionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Body of a debug call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugRequest {
    pub trigger: TriggerType,
    #[serde(default)]
    pub trigger_data: JsonMap,
    #[serde(default)]
    pub breakpoints: Vec<NodeId>,
    #[serde(default)]
    pub step_mode: bool,
}

/// Overall status the executor reports for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Running,
    Paused,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One error reported by a run, with or without a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub error: String,
}

/// The trace of a debug run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugResponse {
    pub execution_id: ExecutionId,
    pub status: RunStatus,
    /// Nodes the executor ran, in execution order.
    #[serde(default)]
    pub executed_nodes: Vec<NodeId>,
    #[serde(default)]
    pub final_variables: JsonMap,
    #[serde(default)]
    pub errors: Vec<RunError>,
    /// Output payload per node.
    #[serde(default)]
    pub outputs: BTreeMap<NodeId, JsonValue>,
    /// Nodes the executor did not run (branch not taken).
    #[serde(default)]
    pub skipped_nodes: Vec<NodeId>,
}

/// `{"workflows": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorkflowList {
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}

/// `{"workflow": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorkflowBody {
    pub workflow: WorkflowDefinition,
}

/// `{"nodes": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ManifestList {
    #[serde(default)]
    pub nodes: Vec<flowdeck_workflow::NodeManifest>,
}
