//! Error types for the editor crate.
//!
//! Gateway failures are wrapped rather than replaced, so the underlying
//! [`GatewayError`](flowdeck_gateway::GatewayError) stays in the report chain.

use crate::debug::DebugState;
use crate::gate::Operation;
use flowdeck_workflow::{GraphError, ValidationReport};
use std::fmt;

/// Errors from editor operations.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorError {
    /// A graph mutation was refused.
    Graph(GraphError),
    /// Save was refused because validation found blocking issues.
    ValidationFailed { report: ValidationReport },
    /// The operation needs a saved workflow.
    NotPersisted { operation: Operation },
    /// An import file was refused before anything was sent.
    ImportRejected { reason: String },
    /// The persistence service call failed.
    Gateway {
        operation: &'static str,
        retryable: bool,
    },
    /// The same operation is already in flight.
    Busy { operation: Operation },
}

impl EditorError {
    /// Returns true if retrying may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway { retryable: true, .. })
    }
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph(error) => write!(f, "{error}"),
            Self::ValidationFailed { report } => {
                let count = report.blocking().count();
                write!(f, "workflow has {count} blocking issue(s)")
            }
            Self::NotPersisted { operation } => {
                write!(f, "cannot {operation}: workflow has not been saved")
            }
            Self::ImportRejected { reason } => write!(f, "import rejected: {reason}"),
            Self::Gateway {
                operation,
                retryable,
            } => {
                if *retryable {
                    write!(f, "{operation} failed, try again")
                } else {
                    write!(f, "{operation} failed")
                }
            }
            Self::Busy { operation } => write!(f, "{operation} is already in progress"),
        }
    }
}

impl std::error::Error for EditorError {}

impl From<GraphError> for EditorError {
    fn from(error: GraphError) -> Self {
        Self::Graph(error)
    }
}

/// Errors from debug session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugError {
    /// `start` was called outside `idle`.
    AlreadyRunning { state: DebugState },
    /// `step` was called outside `paused`.
    NotPaused { state: DebugState },
    /// Breakpoints cannot change in this state.
    BreakpointsLocked { state: DebugState },
    /// The workflow must be saved before it can be debugged.
    NotPersisted,
    /// The saved definition could not be turned into a graph.
    InvalidWorkflow { reason: String },
    /// The debug call failed; the controller is idle again.
    Gateway { retryable: bool },
    /// A debug start is already in flight.
    Busy,
}

impl fmt::Display for DebugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning { state } => {
                write!(f, "a debug session is already {state}")
            }
            Self::NotPaused { state } => write!(f, "session is {state}, not paused"),
            Self::BreakpointsLocked { state } => {
                write!(f, "breakpoints cannot change while {state}")
            }
            Self::NotPersisted => write!(f, "workflow must be saved before debugging"),
            Self::InvalidWorkflow { reason } => write!(f, "cannot debug workflow: {reason}"),
            Self::Gateway { retryable } => {
                if *retryable {
                    write!(f, "debug request failed, try again")
                } else {
                    write!(f, "debug request failed")
                }
            }
            Self::Busy => write!(f, "a debug request is already in flight"),
        }
    }
}

impl std::error::Error for DebugError {}
