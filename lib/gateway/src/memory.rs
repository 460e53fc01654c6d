//! In-memory gateway.
//!
//! Stores definitions in a map, records every call it receives, and can be
//! scripted to fail the next call or to answer the next debug call with a
//! canned trace. Without a script, a debug call walks the stored graph in
//! execution order and reports every reachable node as executed.

use crate::error::GatewayError;
use crate::gateway::PersistenceGateway;
use crate::types::{
    DebugRequest, DebugResponse, ExecuteRequest, ExecuteResponse, RunStatus, SortBy, SortOrder,
};
use async_trait::async_trait;
use chrono::Utc;
use flowdeck_core::{ExecutionId, WorkflowId};
use flowdeck_workflow::{NodeConfig, NodeManifest, WorkflowDefinition, WorkflowGraph, codec};
use rootcause::prelude::Report;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// A call received by an [`InMemoryGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ListWorkflows,
    GetNodeManifests,
    GetWorkflow(WorkflowId),
    CreateWorkflow,
    UpdateWorkflow(WorkflowId),
    DeleteWorkflow(WorkflowId),
    ExecuteWorkflow(WorkflowId),
    StartDebug(WorkflowId),
    ExportWorkflow(WorkflowId),
    ImportWorkflow,
}

#[derive(Default)]
struct State {
    workflows: BTreeMap<WorkflowId, WorkflowDefinition>,
    manifests: Vec<NodeManifest>,
    calls: Vec<GatewayCall>,
    debug_requests: Vec<DebugRequest>,
    failures: VecDeque<GatewayError>,
    debug_scripts: VecDeque<DebugResponse>,
    next_id: u64,
}

impl State {
    fn fresh_id(&mut self) -> WorkflowId {
        self.next_id += 1;
        WorkflowId::new(format!("workflow_{}", self.next_id))
    }

    fn require(&self, id: &WorkflowId) -> Result<&WorkflowDefinition, GatewayError> {
        self.workflows.get(id).ok_or_else(|| GatewayError::NotFound {
            resource: format!("workflow {id}"),
        })
    }
}

/// Gateway that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<State>>,
}

impl InMemoryGateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway that serves the given node manifests.
    #[must_use]
    pub fn with_manifests(manifests: Vec<NodeManifest>) -> Self {
        let state = State {
            manifests,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Stores a definition directly, assigning an ID if it has none.
    pub async fn insert(&self, mut definition: WorkflowDefinition) -> WorkflowId {
        let mut state = self.state.lock().await;
        let id = match definition.id.clone() {
            Some(id) => id,
            None => state.fresh_id(),
        };
        definition.id = Some(id.clone());
        state.workflows.insert(id.clone(), definition);
        id
    }

    /// Returns the stored copy of a definition.
    pub async fn stored(&self, id: &WorkflowId) -> Option<WorkflowDefinition> {
        self.state.lock().await.workflows.get(id).cloned()
    }

    /// Makes the next call fail with `error`.
    pub async fn fail_next(&self, error: GatewayError) {
        self.state.lock().await.failures.push_back(error);
    }

    /// Answers the next debug call with `response` instead of simulating.
    pub async fn script_debug(&self, response: DebugResponse) {
        self.state.lock().await.debug_scripts.push_back(response);
    }

    /// Returns every call received so far, in order.
    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    /// Returns the bodies of every debug call received so far.
    pub async fn debug_requests(&self) -> Vec<DebugRequest> {
        self.state.lock().await.debug_requests.clone()
    }

    async fn record(
        &self,
        call: GatewayCall,
    ) -> Result<tokio::sync::MutexGuard<'_, State>, Report<GatewayError>> {
        let mut state = self.state.lock().await;
        debug!(?call, "gateway call");
        state.calls.push(call);
        if let Some(error) = state.failures.pop_front() {
            return Err(error.into());
        }
        Ok(state)
    }
}

/// Walks the stored graph in execution order.
fn simulate_debug(definition: &WorkflowDefinition) -> Result<DebugResponse, GatewayError> {
    let graph = WorkflowGraph::from_definition_payload(&definition.graph).map_err(|e| {
        GatewayError::Rejected {
            code: -1,
            message: e.to_string(),
        }
    })?;
    let order = graph.execution_order().map_err(|e| GatewayError::Rejected {
        code: -1,
        message: e.to_string(),
    })?;

    let mut outputs = BTreeMap::new();
    let mut variables = serde_json::Map::new();
    for (name, value) in definition.variable_defaults() {
        variables.insert(name, value);
    }

    for node_id in &order {
        let Some(node) = graph.node(node_id) else {
            continue;
        };
        let NodeConfig::SetVariable(config) = &node.config else {
            continue;
        };
        let Some(name) = &config.variable_name else {
            continue;
        };
        let value = config.value.clone().unwrap_or(serde_json::Value::Null);
        variables.insert(name.clone(), value.clone());
        outputs.insert(node_id.clone(), json!({"variable": name, "value": value}));
    }

    Ok(DebugResponse {
        execution_id: ExecutionId::new(format!(
            "exec_{}",
            ulid::Ulid::new().to_string().to_lowercase()
        )),
        status: RunStatus::Completed,
        executed_nodes: order,
        final_variables: variables,
        errors: Vec::new(),
        outputs,
        skipped_nodes: Vec::new(),
    })
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn list_workflows(
        &self,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<Vec<WorkflowDefinition>, Report<GatewayError>> {
        let state = self.record(GatewayCall::ListWorkflows).await?;
        let mut workflows: Vec<WorkflowDefinition> = state.workflows.values().cloned().collect();
        workflows.sort_by_key(|w| match sort_by {
            SortBy::CreatedAt => w.created_at,
            SortBy::UpdatedAt => w.updated_at,
        });
        if sort_order == SortOrder::Desc {
            workflows.reverse();
        }
        Ok(workflows)
    }

    async fn get_node_manifests(&self) -> Result<Vec<NodeManifest>, Report<GatewayError>> {
        let state = self.record(GatewayCall::GetNodeManifests).await?;
        Ok(state.manifests.clone())
    }

    async fn get_workflow(
        &self,
        id: &WorkflowId,
    ) -> Result<WorkflowDefinition, Report<GatewayError>> {
        let state = self.record(GatewayCall::GetWorkflow(id.clone())).await?;
        let definition = state.require(id)?.clone();
        Ok(definition)
    }

    async fn create_workflow(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowDefinition, Report<GatewayError>> {
        let mut state = self.record(GatewayCall::CreateWorkflow).await?;
        let mut stored = definition.clone();
        let id = match stored.id.clone() {
            Some(id) => id,
            None => state.fresh_id(),
        };
        let now = Utc::now();
        stored.id = Some(id.clone());
        stored.created_at = Some(now);
        stored.updated_at = Some(now);
        state.workflows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_workflow(
        &self,
        id: &WorkflowId,
        definition: &WorkflowDefinition,
    ) -> Result<(), Report<GatewayError>> {
        let mut state = self.record(GatewayCall::UpdateWorkflow(id.clone())).await?;
        let created_at = state.require(id)?.created_at;
        let mut stored = definition.clone();
        stored.id = Some(id.clone());
        stored.created_at = created_at;
        stored.updated_at = Some(Utc::now());
        state.workflows.insert(id.clone(), stored);
        Ok(())
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), Report<GatewayError>> {
        let mut state = self.record(GatewayCall::DeleteWorkflow(id.clone())).await?;
        state.require(id)?;
        state.workflows.remove(id);
        Ok(())
    }

    async fn execute_workflow(
        &self,
        id: &WorkflowId,
        _request: &ExecuteRequest,
    ) -> Result<ExecuteResponse, Report<GatewayError>> {
        let state = self.record(GatewayCall::ExecuteWorkflow(id.clone())).await?;
        state.require(id)?;
        Ok(ExecuteResponse {
            execution_id: ExecutionId::new(format!(
                "exec_{}",
                ulid::Ulid::new().to_string().to_lowercase()
            )),
            status: Some("running".to_string()),
            extra: serde_json::Map::new(),
        })
    }

    async fn start_debug(
        &self,
        id: &WorkflowId,
        request: &DebugRequest,
    ) -> Result<DebugResponse, Report<GatewayError>> {
        let mut state = self.record(GatewayCall::StartDebug(id.clone())).await?;
        state.debug_requests.push(request.clone());
        let definition = state.require(id)?.clone();
        if let Some(scripted) = state.debug_scripts.pop_front() {
            return Ok(scripted);
        }
        let response = simulate_debug(&definition)?;
        Ok(response)
    }

    async fn export_workflow(&self, id: &WorkflowId) -> Result<Vec<u8>, Report<GatewayError>> {
        let state = self.record(GatewayCall::ExportWorkflow(id.clone())).await?;
        let definition = state.require(id)?;
        let yaml = codec::to_yaml(definition).map_err(|report| GatewayError::Rejected {
            code: -1,
            message: report.current_context().to_string(),
        })?;
        Ok(yaml.into_bytes())
    }

    async fn import_workflow(
        &self,
        bytes: &[u8],
    ) -> Result<WorkflowDefinition, Report<GatewayError>> {
        let mut state = self.record(GatewayCall::ImportWorkflow).await?;
        let mut definition =
            codec::from_bytes(bytes).map_err(|report| GatewayError::Rejected {
                code: -1,
                message: report.current_context().to_string(),
            })?;
        let id = state.fresh_id();
        let now = Utc::now();
        definition.id = Some(id.clone());
        definition.created_at = Some(now);
        definition.updated_at = Some(now);
        state.workflows.insert(id, definition.clone());
        Ok(definition)
    }
}
