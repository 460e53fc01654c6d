//! The persistence gateway seam.
//!
//! All traffic between the editor and the executor goes through a
//! [`PersistenceGateway`]. The HTTP implementation talks to a live service;
//! the in-memory one backs tests and offline use.

use crate::error::GatewayError;
use crate::types::{DebugRequest, DebugResponse, ExecuteRequest, ExecuteResponse, SortBy, SortOrder};
use async_trait::async_trait;
use flowdeck_core::WorkflowId;
use flowdeck_workflow::{NodeManifest, WorkflowDefinition};
use rootcause::prelude::Report;
use std::sync::Arc;

/// CRUD, execute, debug, and file transfer over workflow definitions.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Lists stored workflows.
    async fn list_workflows(
        &self,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<Vec<WorkflowDefinition>, Report<GatewayError>>;

    /// Fetches the node manifests the executor provides.
    async fn get_node_manifests(&self) -> Result<Vec<NodeManifest>, Report<GatewayError>>;

    /// Fetches one workflow.
    async fn get_workflow(&self, id: &WorkflowId)
    -> Result<WorkflowDefinition, Report<GatewayError>>;

    /// Stores a new workflow and returns it with its assigned ID.
    async fn create_workflow(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowDefinition, Report<GatewayError>>;

    /// Replaces a stored workflow.
    async fn update_workflow(
        &self,
        id: &WorkflowId,
        definition: &WorkflowDefinition,
    ) -> Result<(), Report<GatewayError>>;

    /// Deletes a stored workflow.
    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), Report<GatewayError>>;

    /// Runs the stored version of a workflow.
    async fn execute_workflow(
        &self,
        id: &WorkflowId,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse, Report<GatewayError>>;

    /// Runs the stored version of a workflow under the debugger.
    async fn start_debug(
        &self,
        id: &WorkflowId,
        request: &DebugRequest,
    ) -> Result<DebugResponse, Report<GatewayError>>;

    /// Returns the export file of a stored workflow.
    async fn export_workflow(&self, id: &WorkflowId) -> Result<Vec<u8>, Report<GatewayError>>;

    /// Stores the workflow in an export file under a fresh ID.
    async fn import_workflow(&self, bytes: &[u8])
    -> Result<WorkflowDefinition, Report<GatewayError>>;
}

#[async_trait]
impl<G: PersistenceGateway + ?Sized> PersistenceGateway for Arc<G> {
    async fn list_workflows(
        &self,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<Vec<WorkflowDefinition>, Report<GatewayError>> {
        (**self).list_workflows(sort_by, sort_order).await
    }

    async fn get_node_manifests(&self) -> Result<Vec<NodeManifest>, Report<GatewayError>> {
        (**self).get_node_manifests().await
    }

    async fn get_workflow(
        &self,
        id: &WorkflowId,
    ) -> Result<WorkflowDefinition, Report<GatewayError>> {
        (**self).get_workflow(id).await
    }

    async fn create_workflow(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowDefinition, Report<GatewayError>> {
        (**self).create_workflow(definition).await
    }

    async fn update_workflow(
        &self,
        id: &WorkflowId,
        definition: &WorkflowDefinition,
    ) -> Result<(), Report<GatewayError>> {
        (**self).update_workflow(id, definition).await
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), Report<GatewayError>> {
        (**self).delete_workflow(id).await
    }

    async fn execute_workflow(
        &self,
        id: &WorkflowId,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse, Report<GatewayError>> {
        (**self).execute_workflow(id, request).await
    }

    async fn start_debug(
        &self,
        id: &WorkflowId,
        request: &DebugRequest,
    ) -> Result<DebugResponse, Report<GatewayError>> {
        (**self).start_debug(id, request).await
    }

    async fn export_workflow(&self, id: &WorkflowId) -> Result<Vec<u8>, Report<GatewayError>> {
        (**self).export_workflow(id).await
    }

    async fn import_workflow(
        &self,
        bytes: &[u8],
    ) -> Result<WorkflowDefinition, Report<GatewayError>> {
        (**self).import_workflow(bytes).await
    }
}
