//! Per-node execution records and the execution event log.
//!
//! A record moves `pending → running → {success, failed, skipped}`, or
//! straight from `pending` to `skipped` when the executor never reached the
//! node. Once terminal, a record never changes again within one run.

use chrono::{DateTime, Utc};
use flowdeck_core::{ExecutionId, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The execution status of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    /// Node has not been reached yet.
    Pending,
    /// Node is executing (or paused at a breakpoint).
    Running,
    /// Node completed successfully.
    Success,
    /// Node failed.
    Failed,
    /// Node was skipped (branch not taken or error_handler=skip).
    Skipped,
}

impl NodeExecutionStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }

    fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped)
                | (Self::Running, Self::Success)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Skipped)
        )
    }
}

impl fmt::Display for NodeExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// A refused status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub node_id: NodeId,
    pub from: NodeExecutionStatus,
    pub to: NodeExecutionStatus,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node {} cannot move from {} to {}",
            self.node_id, self.from, self.to
        )
    }
}

impl std::error::Error for TransitionError {}

/// Execution record for a single node within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
    /// The node being executed.
    pub node_id: NodeId,
    /// Current status.
    pub status: NodeExecutionStatus,
    /// Output data produced.
    pub output: Option<JsonValue>,
    /// Error message if failed or skipped after an error.
    pub error: Option<String>,
    /// When the node started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeExecutionRecord {
    /// Creates a new record in pending state.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            status: NodeExecutionStatus::Pending,
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn advance(&mut self, to: NodeExecutionStatus) -> Result<(), TransitionError> {
        if !self.status.can_become(to) {
            return Err(TransitionError {
                node_id: self.node_id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to == NodeExecutionStatus::Running {
            self.started_at = Some(Utc::now());
        } else {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Starts execution of this node.
    ///
    /// # Errors
    ///
    /// Returns an error unless the node is pending.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.advance(NodeExecutionStatus::Running)
    }

    /// Marks the node as completed.
    ///
    /// # Errors
    ///
    /// Returns an error unless the node is running.
    pub fn succeed(&mut self, output: Option<JsonValue>) -> Result<(), TransitionError> {
        self.advance(NodeExecutionStatus::Success)?;
        self.output = output;
        Ok(())
    }

    /// Marks the node as failed.
    ///
    /// # Errors
    ///
    /// Returns an error unless the node is running.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.advance(NodeExecutionStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Marks the node as skipped, optionally keeping the error that caused it.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is already terminal.
    pub fn skip(&mut self, error: Option<String>) -> Result<(), TransitionError> {
        self.advance(NodeExecutionStatus::Skipped)?;
        self.error = error;
        Ok(())
    }

    /// Returns true once the node reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Entries in the debug event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A debug request was sent.
    RunRequested {
        breakpoints: Vec<NodeId>,
        step_mode: bool,
        timestamp: DateTime<Utc>,
    },
    /// The executor answered.
    RunStarted {
        execution_id: ExecutionId,
        timestamp: DateTime<Utc>,
    },
    /// Node started executing.
    NodeStarted {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    /// Node completed successfully.
    NodeCompleted {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    /// Node failed.
    NodeFailed {
        node_id: NodeId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Node was skipped.
    NodeSkipped {
        node_id: NodeId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Execution paused at a breakpoint.
    Paused {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    /// Execution resumed from a breakpoint.
    Resumed {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    /// The executor reported a node more than once; the repeat was ignored.
    NodeRevisited {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    /// Run completed.
    RunCompleted { timestamp: DateTime<Utc> },
    /// Run failed.
    RunFailed {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Returns the node this event is about, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::NodeSkipped { node_id, .. }
            | Self::Paused { node_id, .. }
            | Self::Resumed { node_id, .. }
            | Self::NodeRevisited { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// Returns the timestamp of this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RunRequested { timestamp, .. }
            | Self::RunStarted { timestamp, .. }
            | Self::NodeStarted { timestamp, .. }
            | Self::NodeCompleted { timestamp, .. }
            | Self::NodeFailed { timestamp, .. }
            | Self::NodeSkipped { timestamp, .. }
            | Self::Paused { timestamp, .. }
            | Self::Resumed { timestamp, .. }
            | Self::NodeRevisited { timestamp, .. }
            | Self::RunCompleted { timestamp }
            | Self::RunFailed { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NodeExecutionRecord {
        NodeExecutionRecord::new(NodeId::new("reply_node_1"))
    }

    #[test]
    fn terminal_states() {
        assert!(!NodeExecutionStatus::Pending.is_terminal());
        assert!(!NodeExecutionStatus::Running.is_terminal());
        assert!(NodeExecutionStatus::Success.is_terminal());
        assert!(NodeExecutionStatus::Failed.is_terminal());
        assert!(NodeExecutionStatus::Skipped.is_terminal());
    }

    #[test]
    fn record_lifecycle_success() {
        let mut rec = record();
        rec.start().expect("start");
        assert!(rec.started_at.is_some());
        rec.succeed(Some(serde_json::json!({"ok": true})))
            .expect("succeed");
        assert_eq!(rec.status, NodeExecutionStatus::Success);
        assert!(rec.finished_at.is_some());
        assert!(rec.output.is_some());
    }

    #[test]
    fn record_lifecycle_failure() {
        let mut rec = record();
        rec.start().expect("start");
        rec.fail("boom").expect("fail");
        assert_eq!(rec.status, NodeExecutionStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("boom"));
    }

    #[test]
    fn pending_node_may_be_skipped() {
        let mut rec = record();
        rec.skip(None).expect("skip");
        assert_eq!(rec.status, NodeExecutionStatus::Skipped);
    }

    #[test]
    fn terminal_record_cannot_move() {
        let mut rec = record();
        rec.start().expect("start");
        rec.succeed(None).expect("succeed");

        let err = rec.start().unwrap_err();
        assert_eq!(err.from, NodeExecutionStatus::Success);
        assert_eq!(err.to, NodeExecutionStatus::Running);
        assert!(rec.fail("late").is_err());
        assert!(rec.skip(None).is_err());
        assert_eq!(rec.status, NodeExecutionStatus::Success);
    }

    #[test]
    fn pending_node_cannot_finish_without_running() {
        let mut rec = record();
        assert!(rec.succeed(None).is_err());
        assert!(rec.fail("x").is_err());
    }

    #[test]
    fn execution_event_serde() {
        let event = ExecutionEvent::Paused {
            node_id: NodeId::new("reply_node_1"),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"paused\""));
        let parsed: ExecutionEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.node_id(), Some(&NodeId::new("reply_node_1")));
    }
}
