//! Core domain types and utilities for flowdeck.
//!
//! This crate provides the identifier types and error handling foundation
//! shared by the workflow model, the gateway client, and the editor.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{DebugSessionId, EdgeId, ExecutionId, NodeId, ParseIdError, WorkflowId};
