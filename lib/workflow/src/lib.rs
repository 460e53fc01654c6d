//! Workflow graph model for flowdeck.
//!
//! This crate provides the editing-side model of a workflow, including:
//!
//! - **Graph Model**: Directed graphs using petgraph with typed nodes and edges
//! - **Node Types**: Start, branching, action, variable, and end nodes, each
//!   with a typed config
//! - **Validation**: Blocking issues and warnings over a whole graph
//! - **Definitions**: The persisted payload and its lossless conversion
//! - **Codec**: YAML export and import
//! - **Execution**: Per-node execution records for debug runs

pub mod codec;
pub mod definition;
pub mod edge;
pub mod error;
pub mod execution;
pub mod graph;
pub mod manifest;
pub mod node;
pub mod validation;

pub use definition::{
    EdgePayload, GraphPayload, NodePayload, TriggerType, VariableDefinition, WorkflowDefinition,
    WorkflowStatus,
};
pub use edge::{Edge, EdgeCondition};
pub use error::{CodecError, ConfigError, GraphError, InvalidEdgeReason};
pub use execution::{ExecutionEvent, NodeExecutionRecord, NodeExecutionStatus, TransitionError};
pub use graph::WorkflowGraph;
pub use manifest::{LocalizedText, ManifestSpec, NodeManifest};
pub use node::{
    AdvancedSettings, ErrorHandler, FieldKind, FieldSpec, JsonMap, Node, NodeConfig, NodeKind,
    NodePatch, Position,
};
pub use validation::{Severity, ValidationIssue, ValidationReport};
