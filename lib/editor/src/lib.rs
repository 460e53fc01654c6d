//! Editing and debugging controllers for flowdeck workflows.
//!
//! - [`EditorController`] owns the open workflow: graph edits, validation,
//!   save, execute, import and export
//! - [`DebugSessionController`] runs a saved workflow in debug mode and
//!   steps through the recorded trace
//! - [`NodeTypeRegistry`] holds the node palette
//!
//! Both controllers share an [`OperationGate`] so a second click on a
//! button whose request is still in flight is refused instead of queued.

pub mod config;
pub mod debug;
pub mod editor;
pub mod error;
pub mod gate;
pub mod registry;

pub use config::{DebugConfig, EditorConfig};
pub use debug::{
    DebugSession, DebugSessionController, DebugState, DebugTarget, ResponseOutcome, StartTicket,
};
pub use editor::{EditorController, FieldEdit, check_definition};
pub use error::{DebugError, EditorError};
pub use gate::{GateGuard, Operation, OperationGate};
pub use registry::{CatalogSource, NodeTypeRegistry, builtin_manifests};
