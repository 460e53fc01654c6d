//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ConfigError`: A node config that does not fit its kind
//! - `GraphError`: Graph mutations and definition loading
//! - `CodecError`: YAML export and import

use flowdeck_core::{EdgeId, NodeId};
use std::fmt;

/// Errors from reading a node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A declared field has the wrong shape or an unknown value.
    Malformed { node_type: String, reason: String },
    /// The persisted config is not a JSON object.
    NotAnObject { node_type: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { node_type, reason } => {
                write!(f, "invalid {node_type} config: {reason}")
            }
            Self::NotAnObject { node_type } => {
                write!(f, "{node_type} config must be an object")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Why a connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidEdgeReason {
    /// End nodes have no outputs.
    SourceIsEnd,
    /// Start nodes have no inputs.
    TargetIsStart,
}

impl fmt::Display for InvalidEdgeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceIsEnd => write!(f, "end nodes cannot have outgoing edges"),
            Self::TargetIsStart => write!(f, "start nodes cannot have incoming edges"),
        }
    }
}

/// Errors from graph operations.
///
/// These errors contain only information available at the graph layer.
/// Workflow-level context should be added by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// Edge with the given ID was not found in the graph.
    EdgeNotFound { edge_id: EdgeId },
    /// A node with this ID already exists.
    DuplicateNodeId { node_id: NodeId },
    /// An edge with this ID already exists.
    DuplicateEdgeId { edge_id: EdgeId },
    /// The connection breaks a start/end rule.
    InvalidEdge {
        source: NodeId,
        target: NodeId,
        reason: InvalidEdgeReason,
    },
    /// A branching node already has an edge with the same discriminator.
    DuplicateBranch { node_id: NodeId },
    /// A node config does not fit its kind.
    InvalidConfig { node_id: NodeId, error: ConfigError },
    /// Graph contains cycles.
    CycleDetected,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::EdgeNotFound { edge_id } => write!(f, "edge not found: {edge_id}"),
            Self::DuplicateNodeId { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::DuplicateEdgeId { edge_id } => write!(f, "duplicate edge id: {edge_id}"),
            Self::InvalidEdge {
                source,
                target,
                reason,
            } => write!(f, "cannot connect {source} -> {target}: {reason}"),
            Self::DuplicateBranch { node_id } => {
                write!(f, "node {node_id} already has an edge for this branch")
            }
            Self::InvalidConfig { node_id, error } => {
                write!(f, "node {node_id}: {error}")
            }
            Self::CycleDetected => write!(f, "graph contains cycles"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from encoding or decoding a workflow document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The definition could not be written.
    Encode { reason: String },
    /// The document could not be parsed as a definition.
    Decode { reason: String },
    /// The document bytes are not UTF-8.
    NotUtf8,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode { reason } => write!(f, "failed to encode workflow: {reason}"),
            Self::Decode { reason } => write!(f, "failed to decode workflow: {reason}"),
            Self::NotUtf8 => write!(f, "workflow document is not valid UTF-8"),
        }
    }
}

impl std::error::Error for CodecError {}
