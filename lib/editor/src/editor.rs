//! Editor controller for one open workflow.
//!
//! The controller owns the working graph and the definition metadata, keeps
//! a copy of what was last saved, and tracks whether the two differ. Every
//! network-bound operation goes through the [`OperationGate`].

use crate::debug::DebugTarget;
use crate::error::{DebugError, EditorError};
use crate::gate::{GateGuard, Operation, OperationGate};
use crate::registry::NodeTypeRegistry;
use flowdeck_core::{EdgeId, NodeId, WorkflowId};
use flowdeck_gateway::{
    ExecuteRequest, ExecuteResponse, GatewayError, PersistenceGateway, SortBy, SortOrder,
};
use flowdeck_workflow::{
    Edge, EdgeCondition, FieldKind, GraphError, GraphPayload, JsonMap, Node, NodeKind, NodePatch,
    Position, TriggerType, ValidationIssue, ValidationReport, WorkflowDefinition, WorkflowGraph,
    WorkflowStatus, codec,
};
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Result of editing one config field from raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    /// The value was parsed and merged into the node config.
    Applied,
    /// The text does not parse yet; the config is unchanged.
    Pending { reason: String },
}

/// Wraps a gateway failure with the editor operation it broke.
fn gateway_failure(
    operation: &'static str,
) -> impl FnOnce(Report<GatewayError>) -> Report<EditorError> {
    move |report| {
        let retryable = report.current_context().is_retryable();
        report.context(EditorError::Gateway {
            operation,
            retryable,
        })
    }
}

/// Orchestrates the graph, the node registry, and the gateway for one
/// workflow.
pub struct EditorController<G> {
    gateway: G,
    gate: OperationGate,
    registry: NodeTypeRegistry,
    /// Metadata of the working copy; its node and edge lists stay empty.
    meta: WorkflowDefinition,
    graph: WorkflowGraph,
    saved: Option<WorkflowDefinition>,
    dirty: bool,
    pending_fields: HashMap<(NodeId, String), String>,
}

impl<G: PersistenceGateway> EditorController<G> {
    /// Creates a controller holding an empty draft.
    pub fn new(gateway: G, registry: NodeTypeRegistry, gate: OperationGate) -> Self {
        Self {
            gateway,
            gate,
            registry,
            meta: WorkflowDefinition::default(),
            graph: WorkflowGraph::new(),
            saved: None,
            dirty: false,
            pending_fields: HashMap::new(),
        }
    }

    fn acquire(&self, operation: Operation) -> Result<GateGuard, EditorError> {
        self.gate
            .try_acquire(operation)
            .ok_or(EditorError::Busy { operation })
    }

    fn reset_to_draft(&mut self) {
        self.meta = WorkflowDefinition::default();
        self.graph = WorkflowGraph::new();
        self.saved = None;
        self.dirty = false;
        self.pending_fields.clear();
    }

    fn load_definition(&mut self, mut definition: WorkflowDefinition, graph: WorkflowGraph) {
        self.saved = Some(definition.clone());
        definition.graph = GraphPayload::default();
        self.meta = definition;
        self.graph = graph;
        self.dirty = false;
        self.pending_fields.clear();
    }

    /// Opens a stored workflow, or an empty draft for `None`.
    ///
    /// On failure the editor is left holding an empty, unsaved draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails or the stored graph is unreadable.
    pub async fn open(&mut self, id: Option<&WorkflowId>) -> Result<(), Report<EditorError>> {
        self.reset_to_draft();
        let Some(id) = id else {
            debug!("opened empty draft");
            return Ok(());
        };

        let definition = self
            .gateway
            .get_workflow(id)
            .await
            .map_err(gateway_failure("open"))?;
        let graph = WorkflowGraph::from_definition_payload(&definition.graph)
            .map_err(EditorError::Graph)?;

        info!(
            workflow_id = %id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "workflow opened"
        );
        self.load_definition(definition, graph);
        Ok(())
    }

    #[must_use]
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    #[must_use]
    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn gate(&self) -> &OperationGate {
        &self.gate
    }

    /// Returns the persisted ID, if the workflow was ever saved.
    #[must_use]
    pub fn workflow_id(&self) -> Option<&WorkflowId> {
        self.meta.id.as_ref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        self.meta.status
    }

    /// True if there are edits the service has not seen.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The definition as last saved or opened.
    #[must_use]
    pub fn saved(&self) -> Option<&WorkflowDefinition> {
        self.saved.as_ref()
    }

    /// Raw text of a field edit that has not parsed yet.
    #[must_use]
    pub fn pending_field(&self, node_id: &NodeId, field: &str) -> Option<&str> {
        self.pending_fields
            .get(&(node_id.clone(), field.to_string()))
            .map(String::as_str)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.meta.name = name.into();
        self.dirty = true;
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.meta.description = description;
        self.dirty = true;
    }

    pub fn set_trigger_types(&mut self, trigger_types: Vec<TriggerType>) {
        self.meta.trigger_types = trigger_types;
        self.dirty = true;
    }

    fn set_status(&mut self, status: WorkflowStatus) {
        if self.meta.status != status {
            debug!(from = %self.meta.status, to = %status, "workflow status changed");
            self.meta.status = status;
            self.dirty = true;
        }
    }

    /// Marks the workflow active; takes effect on the next save.
    pub fn activate(&mut self) {
        self.set_status(WorkflowStatus::Active);
    }

    /// Marks the workflow inactive; takes effect on the next save.
    pub fn deactivate(&mut self) {
        self.set_status(WorkflowStatus::Inactive);
    }

    /// Marks the workflow archived; takes effect on the next save.
    pub fn archive(&mut self) {
        self.set_status(WorkflowStatus::Archived);
    }

    /// Adds a node from the palette. Without a label it takes the
    /// registry's label for its kind.
    pub fn add_node(&mut self, kind: &NodeKind, position: Position, label: Option<String>) -> Node {
        let label = label.unwrap_or_else(|| self.registry.label_for(kind));
        let node = self.graph.add_node(kind, position, Some(label)).clone();
        debug!(node_id = %node.id, node_type = %kind, "node added");
        self.dirty = true;
        node
    }

    /// Applies a partial update to a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is missing or the merged config is invalid.
    pub fn update_node(&mut self, node_id: &NodeId, patch: NodePatch) -> Result<(), EditorError> {
        self.graph.update_node(node_id, patch)?;
        debug!(node_id = %node_id, "node updated");
        self.dirty = true;
        Ok(())
    }

    /// Deletes a node and every edge touching it.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is missing.
    pub fn delete_node(&mut self, node_id: &NodeId) -> Result<Node, EditorError> {
        let node = self.graph.delete_node(node_id)?;
        self.pending_fields.retain(|(id, _), _| id != node_id);
        debug!(node_id = %node_id, "node deleted");
        self.dirty = true;
        Ok(node)
    }

    /// Connects two nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint is missing, the connection is not
    /// allowed between these node types, or it duplicates a branch.
    pub fn connect(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        condition: Option<EdgeCondition>,
        label: Option<String>,
    ) -> Result<EdgeId, EditorError> {
        let edge_id = self.graph.connect(source, target, condition, label)?.id.clone();
        debug!(edge_id = %edge_id, source = %source, target = %target, "nodes connected");
        self.dirty = true;
        Ok(edge_id)
    }

    /// Removes an edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge is missing.
    pub fn disconnect(&mut self, edge_id: &EdgeId) -> Result<Edge, EditorError> {
        let edge = self.graph.disconnect(edge_id)?;
        debug!(edge_id = %edge_id, "edge removed");
        self.dirty = true;
        Ok(edge)
    }

    /// Sets one config field from the text a user typed.
    ///
    /// Structured fields must parse as JSON, integer fields as a number, and
    /// choice fields must name an allowed option. Until they do, the text is
    /// kept as pending and the config is left alone. Empty text removes the
    /// field.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not exist.
    pub fn edit_config_field(
        &mut self,
        node_id: &NodeId,
        field: &str,
        raw: &str,
    ) -> Result<FieldEdit, EditorError> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })?;
        let kind = node.kind().field(field).map(|spec| spec.kind);

        let value = match parse_field(kind, raw) {
            Ok(value) => value,
            Err(reason) => return Ok(self.hold_pending(node_id, field, raw, reason)),
        };

        let mut changes = JsonMap::new();
        changes.insert(field.to_string(), value);
        let applied = self
            .graph
            .update_node(node_id, NodePatch::config(changes))
            .map(|_| ());
        match applied {
            Ok(()) => {}
            Err(GraphError::InvalidConfig { error, .. }) => {
                return Ok(self.hold_pending(node_id, field, raw, error.to_string()));
            }
            Err(error) => return Err(error.into()),
        }

        self.pending_fields
            .remove(&(node_id.clone(), field.to_string()));
        self.dirty = true;
        Ok(FieldEdit::Applied)
    }

    fn hold_pending(
        &mut self,
        node_id: &NodeId,
        field: &str,
        raw: &str,
        reason: String,
    ) -> FieldEdit {
        debug!(node_id = %node_id, field, %reason, "field edit pending");
        self.pending_fields
            .insert((node_id.clone(), field.to_string()), raw.to_string());
        FieldEdit::Pending { reason }
    }

    /// Validates the working copy, including the workflow name.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        if self.meta.name.trim().is_empty() {
            report.push(ValidationIssue::MissingName);
        }
        for issue in self.graph.validate() {
            report.push(issue);
        }
        report
    }

    /// Builds the definition that a save would send.
    #[must_use]
    pub fn to_definition(&self) -> WorkflowDefinition {
        let mut definition = self.meta.clone();
        definition.graph = self.graph.to_definition_payload();
        definition.merge_implied_triggers(&self.graph);
        definition
    }

    /// Validates and stores the working copy.
    ///
    /// Creates the workflow on first save and replaces it afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::ValidationFailed`] without any network call if
    /// validation finds a blocking issue, or an error if the gateway call fails.
    pub async fn save(&mut self) -> Result<WorkflowId, Report<EditorError>> {
        let _guard = self.acquire(Operation::Save)?;

        let report = self.validate();
        if report.has_blocking() {
            warn!(
                blocking = report.blocking().count(),
                "save refused by validation"
            );
            return Err(EditorError::ValidationFailed { report }.into());
        }

        let definition = self.to_definition();
        let stored = match definition.id.clone() {
            Some(id) => {
                self.gateway
                    .update_workflow(&id, &definition)
                    .await
                    .map_err(gateway_failure("save"))?;
                definition
            }
            None => self
                .gateway
                .create_workflow(&definition)
                .await
                .map_err(gateway_failure("save"))?,
        };

        let id = stored.id.clone().ok_or(EditorError::Gateway {
            operation: "save",
            retryable: false,
        })?;
        self.meta.id = Some(id.clone());
        self.meta.trigger_types = stored.trigger_types.clone();
        self.meta.created_at = stored.created_at.or(self.meta.created_at);
        self.meta.updated_at = stored.updated_at.or(self.meta.updated_at);
        self.saved = Some(stored);
        self.dirty = false;
        info!(workflow_id = %id, "workflow saved");
        Ok(id)
    }

    fn persisted_id(&self, operation: Operation) -> Result<WorkflowId, EditorError> {
        self.saved
            .as_ref()
            .and_then(|saved| saved.id.clone())
            .ok_or(EditorError::NotPersisted { operation })
    }

    /// Runs the saved version of the workflow.
    ///
    /// Unsaved edits are not part of the run; check [`is_dirty`] first to
    /// warn the user.
    ///
    /// [`is_dirty`]: Self::is_dirty
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow was never saved or the call fails.
    pub async fn execute(
        &self,
        trigger: TriggerType,
        trigger_data: JsonMap,
    ) -> Result<ExecuteResponse, Report<EditorError>> {
        let _guard = self.acquire(Operation::Execute)?;
        let id = self.persisted_id(Operation::Execute)?;
        if self.dirty {
            warn!(workflow_id = %id, "executing saved version; local edits are not included");
        }

        let request = ExecuteRequest {
            trigger,
            trigger_data,
        };
        let response = self
            .gateway
            .execute_workflow(&id, &request)
            .await
            .map_err(gateway_failure("execute"))?;
        info!(workflow_id = %id, execution_id = %response.execution_id, "workflow executed");
        Ok(response)
    }

    /// Prepares the saved version of the workflow for a debug run.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow was never saved.
    pub fn debug_target(&self, trigger: TriggerType) -> Result<DebugTarget, DebugError> {
        let saved = self.saved.as_ref().ok_or(DebugError::NotPersisted)?;
        if self.dirty {
            warn!("debugging saved version; local edits are not included");
        }
        DebugTarget::from_definition(saved, trigger)
    }

    /// Downloads the export file of the saved workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow was never saved or the call fails.
    pub async fn export(&self) -> Result<Vec<u8>, Report<EditorError>> {
        let _guard = self.acquire(Operation::Export)?;
        let id = self.persisted_id(Operation::Export)?;
        let bytes = self
            .gateway
            .export_workflow(&id)
            .await
            .map_err(gateway_failure("export"))?;
        info!(workflow_id = %id, size = bytes.len(), "workflow exported");
        Ok(bytes)
    }

    /// Imports an export file as a new workflow and opens it.
    ///
    /// The file is checked locally first. Nothing in the editor changes
    /// unless the check passes and the service accepts the file.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::ImportRejected`] if the file does not parse or
    /// has blocking issues, or an error if the gateway call fails.
    pub async fn import(&mut self, bytes: &[u8]) -> Result<WorkflowId, Report<EditorError>> {
        let _guard = self.acquire(Operation::Import)?;

        let parsed = codec::from_bytes(bytes).map_err(|report| EditorError::ImportRejected {
            reason: report.current_context().to_string(),
        })?;
        let (graph, report) =
            check_definition(&parsed).map_err(|error| EditorError::ImportRejected {
                reason: error.to_string(),
            })?;
        if let Some(issue) = report.blocking().next() {
            return Err(EditorError::ImportRejected {
                reason: issue.to_string(),
            }
            .into());
        }

        let stored = self
            .gateway
            .import_workflow(bytes)
            .await
            .map_err(gateway_failure("import"))?;
        let id = stored.id.clone().ok_or(EditorError::Gateway {
            operation: "import",
            retryable: false,
        })?;

        // Prefer the service's copy; fall back to the file if it cannot be read.
        let graph = match WorkflowGraph::from_definition_payload(&stored.graph) {
            Ok(stored_graph) => stored_graph,
            Err(error) => {
                warn!(workflow_id = %id, %error, "stored copy unreadable, using imported file");
                graph
            }
        };
        info!(workflow_id = %id, nodes = graph.node_count(), "workflow imported");
        self.load_definition(stored, graph);
        Ok(id)
    }

    /// Deletes the saved workflow and returns to an empty draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow was never saved or the call fails.
    pub async fn delete_workflow(&mut self) -> Result<(), Report<EditorError>> {
        let _guard = self.acquire(Operation::Save)?;
        let id = self.persisted_id(Operation::Save)?;
        self.gateway
            .delete_workflow(&id)
            .await
            .map_err(gateway_failure("delete"))?;
        info!(workflow_id = %id, "workflow deleted");
        self.reset_to_draft();
        Ok(())
    }

    /// Lists stored workflows.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    pub async fn list_workflows(
        &self,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<Vec<WorkflowDefinition>, Report<EditorError>> {
        let workflows = self
            .gateway
            .list_workflows(sort_by, sort_order)
            .await
            .map_err(gateway_failure("list"))?;
        Ok(workflows)
    }

    /// Reloads node manifests, keeping the current ones on failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    pub async fn refresh_registry(&mut self) -> Result<(), Report<EditorError>> {
        self.registry.refresh(&self.gateway).await
    }
}

/// Builds the graph of a definition and validates it as a save would.
///
/// # Errors
///
/// Returns an error if the node list cannot be turned into a graph.
pub fn check_definition(
    definition: &WorkflowDefinition,
) -> Result<(WorkflowGraph, ValidationReport), GraphError> {
    let graph = WorkflowGraph::from_definition_payload(&definition.graph)?;
    let mut report = ValidationReport::default();
    if definition.name.trim().is_empty() {
        report.push(ValidationIssue::MissingName);
    }
    for issue in graph.validate() {
        report.push(issue);
    }
    Ok((graph, report))
}

/// Turns typed text into a config value according to the field's kind.
/// Unknown fields accept JSON, falling back to plain text.
fn parse_field(kind: Option<FieldKind>, raw: &str) -> Result<JsonValue, String> {
    if raw.trim().is_empty() {
        return Ok(JsonValue::Null);
    }
    match kind {
        Some(FieldKind::Text) => Ok(JsonValue::String(raw.to_string())),
        Some(FieldKind::Integer) => raw
            .trim()
            .parse::<i64>()
            .map(JsonValue::from)
            .map_err(|e| e.to_string()),
        Some(FieldKind::Choice(options)) => {
            let choice = raw.trim();
            if options.iter().any(|option| *option == choice) {
                Ok(JsonValue::String(choice.to_string()))
            } else {
                Err(format!("expected one of {}", options.join(", ")))
            }
        }
        Some(FieldKind::Mapping) => match serde_json::from_str(raw) {
            Ok(value @ JsonValue::Object(_)) => Ok(value),
            Ok(_) => Err("expected a JSON object".to_string()),
            Err(e) => Err(e.to_string()),
        },
        Some(FieldKind::List) => match serde_json::from_str(raw) {
            Ok(value @ JsonValue::Array(_)) => Ok(value),
            Ok(_) => Err("expected a JSON array".to_string()),
            Err(e) => Err(e.to_string()),
        },
        Some(FieldKind::Any) => serde_json::from_str(raw).map_err(|e| e.to_string()),
        None => Ok(serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdeck_gateway::{GatewayCall, InMemoryGateway};
    use flowdeck_workflow::{InvalidEdgeReason, NodeConfig};
    use serde_json::json;

    fn editor(gateway: &InMemoryGateway) -> EditorController<InMemoryGateway> {
        EditorController::new(
            gateway.clone(),
            NodeTypeRegistry::builtin("en_US"),
            OperationGate::new(),
        )
    }

    /// event_start → reply_message → end
    fn build_greeter(editor: &mut EditorController<InMemoryGateway>) -> (NodeId, NodeId, NodeId) {
        editor.set_name("Greeter");
        let start = editor
            .add_node(&NodeKind::EventStart, Position::new(0.0, 0.0), None)
            .id;
        let reply = editor
            .add_node(&NodeKind::ReplyMessage, Position::new(200.0, 0.0), None)
            .id;
        let end = editor
            .add_node(&NodeKind::End, Position::new(400.0, 0.0), None)
            .id;
        assert_eq!(
            editor.edit_config_field(&start, "trigger_type", "person_message"),
            Ok(FieldEdit::Applied)
        );
        assert_eq!(
            editor.edit_config_field(&reply, "content", "Hello ${name}"),
            Ok(FieldEdit::Applied)
        );
        editor.connect(&start, &reply, None, None).expect("connect");
        editor.connect(&reply, &end, None, None).expect("connect");
        (start, reply, end)
    }

    #[test]
    fn greeter_graph_is_clean() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);

        let report = editor.validate();
        assert!(!report.has_blocking(), "{:?}", report.issues());

        let definition = editor.to_definition();
        assert_eq!(definition.graph.nodes.len(), 3);
        assert_eq!(definition.graph.edges.len(), 2);
        assert_eq!(definition.trigger_types, vec![TriggerType::PersonMessage]);
    }

    #[test]
    fn new_nodes_take_registry_labels() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        let node = editor.add_node(&NodeKind::ReplyMessage, Position::default(), None);
        assert_eq!(node.name, "Reply Message");
        assert!(editor.is_dirty());
    }

    #[test]
    fn end_node_cannot_have_outbound_edge() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        let (_, reply, end) = build_greeter(&mut editor);

        let err = editor.connect(&end, &reply, None, None).expect_err("should fail");
        assert!(matches!(
            err,
            EditorError::Graph(GraphError::InvalidEdge {
                reason: InvalidEdgeReason::SourceIsEnd,
                ..
            })
        ));
    }

    #[test]
    fn second_default_branch_is_refused() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        let condition = editor
            .add_node(&NodeKind::Condition, Position::default(), None)
            .id;
        let a = editor
            .add_node(&NodeKind::ReplyMessage, Position::default(), None)
            .id;
        let b = editor
            .add_node(&NodeKind::ReplyMessage, Position::default(), None)
            .id;

        editor.connect(&condition, &a, None, None).expect("first default");
        let err = editor
            .connect(&condition, &b, None, None)
            .expect_err("should fail");
        assert_eq!(
            err,
            EditorError::Graph(GraphError::DuplicateBranch { node_id: condition })
        );
    }

    #[test]
    fn malformed_structured_input_stays_pending() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        let http = editor
            .add_node(&NodeKind::HttpRequest, Position::default(), None)
            .id;
        editor
            .edit_config_field(&http, "headers", r#"{"Accept": "text/plain"}"#)
            .expect("edit");

        let edit = editor
            .edit_config_field(&http, "headers", r#"{"Accept": "#)
            .expect("edit");

        assert!(matches!(edit, FieldEdit::Pending { .. }));
        assert_eq!(editor.pending_field(&http, "headers"), Some(r#"{"Accept": "#));
        let NodeConfig::HttpRequest(config) = &editor.graph().node(&http).expect("node").config
        else {
            panic!("expected http_request config");
        };
        assert_eq!(
            config.headers.as_ref().and_then(|h| h.get("Accept")),
            Some(&json!("text/plain"))
        );

        editor
            .edit_config_field(&http, "headers", r#"{"Accept": "application/json"}"#)
            .expect("edit");
        assert!(editor.pending_field(&http, "headers").is_none());
    }

    #[test]
    fn choice_and_integer_fields_are_checked() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        let http = editor
            .add_node(&NodeKind::HttpRequest, Position::default(), None)
            .id;

        assert!(matches!(
            editor.edit_config_field(&http, "method", "FETCH"),
            Ok(FieldEdit::Pending { .. })
        ));
        assert_eq!(
            editor.edit_config_field(&http, "method", "POST"),
            Ok(FieldEdit::Applied)
        );
        assert!(matches!(
            editor.edit_config_field(&http, "timeout", "soon"),
            Ok(FieldEdit::Pending { .. })
        ));
        assert_eq!(
            editor.edit_config_field(&http, "timeout", "30"),
            Ok(FieldEdit::Applied)
        );
        let node = editor.graph().node(&http).expect("node");
        assert_eq!(node.config.advanced().timeout, Some(30));
    }

    #[test]
    fn editing_missing_node_fails() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        let err = editor
            .edit_config_field(&NodeId::new("ghost"), "content", "hi")
            .expect_err("should fail");
        assert!(matches!(err, EditorError::Graph(GraphError::NodeNotFound { .. })));
    }

    #[tokio::test]
    async fn blocked_save_makes_no_network_call() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        editor.add_node(&NodeKind::EventStart, Position::default(), None);

        let err = editor.save().await.expect_err("should fail");

        let EditorError::ValidationFailed { report } = err.current_context() else {
            panic!("expected validation failure");
        };
        assert!(report.contains(&ValidationIssue::MissingName));
        assert!(gateway.calls().await.is_empty());
        assert!(editor.workflow_id().is_none());
    }

    #[tokio::test]
    async fn first_save_creates_then_updates() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);

        let id = editor.save().await.expect("create");
        assert!(!editor.is_dirty());
        assert_eq!(editor.workflow_id(), Some(&id));

        editor.set_description(Some("says hello".to_string()));
        assert!(editor.is_dirty());
        let same = editor.save().await.expect("update");

        assert_eq!(same, id);
        assert_eq!(
            gateway.calls().await,
            vec![GatewayCall::CreateWorkflow, GatewayCall::UpdateWorkflow(id.clone())]
        );
        let stored = gateway.stored(&id).await.expect("stored");
        assert_eq!(stored.description.as_deref(), Some("says hello"));
        assert_eq!(stored.graph.nodes.len(), 3);
    }

    #[tokio::test]
    async fn failed_save_keeps_dirty_state() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);
        gateway
            .fail_next(GatewayError::Status {
                code: 503,
                message: "unavailable".to_string(),
            })
            .await;

        let err = editor.save().await.expect_err("should fail");

        assert!(err.current_context().is_retryable());
        assert!(editor.is_dirty());
        assert!(editor.workflow_id().is_none());
    }

    #[tokio::test]
    async fn open_loads_stored_workflow() {
        let gateway = InMemoryGateway::new();
        let mut author = editor(&gateway);
        build_greeter(&mut author);
        let id = author.save().await.expect("save");

        let mut reader = editor(&gateway);
        reader.open(Some(&id)).await.expect("open");

        assert_eq!(reader.name(), "Greeter");
        assert_eq!(
            reader.graph().to_definition_payload(),
            author.graph().to_definition_payload()
        );
        assert!(!reader.is_dirty());
    }

    #[tokio::test]
    async fn failed_open_leaves_empty_draft() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);

        let err = editor
            .open(Some(&WorkflowId::new("missing")))
            .await
            .expect_err("should fail");

        assert!(matches!(
            err.current_context(),
            EditorError::Gateway {
                operation: "open",
                retryable: false
            }
        ));
        assert!(editor.graph().is_empty());
        assert!(editor.workflow_id().is_none());
        assert!(editor.saved().is_none());
    }

    #[tokio::test]
    async fn execute_needs_saved_workflow() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);

        let err = editor
            .execute(TriggerType::PersonMessage, JsonMap::new())
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &EditorError::NotPersisted {
                operation: Operation::Execute
            }
        );

        let id = editor.save().await.expect("save");
        editor.set_name("Renamed but unsaved");
        let response = editor
            .execute(TriggerType::PersonMessage, JsonMap::new())
            .await
            .expect("execute");

        assert!(!response.execution_id.as_str().is_empty());
        assert_eq!(
            gateway.calls().await.last(),
            Some(&GatewayCall::ExecuteWorkflow(id))
        );
    }

    #[tokio::test]
    async fn debug_target_uses_saved_copy() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);
        assert_eq!(
            editor.debug_target(TriggerType::PersonMessage).err(),
            Some(DebugError::NotPersisted)
        );

        let id = editor.save().await.expect("save");
        editor.add_node(&NodeKind::End, Position::default(), None);

        let target = editor
            .debug_target(TriggerType::PersonMessage)
            .expect("target");
        assert_eq!(target.workflow_id(), &id);
    }

    #[tokio::test]
    async fn export_then_import_creates_copy() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);
        let original = editor.save().await.expect("save");
        let bytes = editor.export().await.expect("export");

        let copy = editor.import(&bytes).await.expect("import");

        assert_ne!(copy, original);
        assert_eq!(editor.workflow_id(), Some(&copy));
        assert_eq!(editor.graph().node_count(), 3);
        assert!(!editor.is_dirty());
    }

    #[tokio::test]
    async fn invalid_import_changes_nothing() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);
        let before = editor.graph().to_definition_payload();

        let yaml = r"
workflow:
  name: Broken
  nodes:
    - id: end_1
      type: end
    - id: reply_1
      type: reply_message
      config:
        content: hi
  edges:
    - id: e1
      source: end_1
      target: reply_1
";
        let err = editor.import(yaml.as_bytes()).await.expect_err("should fail");

        assert!(matches!(
            err.current_context(),
            EditorError::ImportRejected { .. }
        ));
        assert_eq!(editor.graph().to_definition_payload(), before);
        assert!(gateway.calls().await.is_empty());

        let err = editor.import(b"\xff\xfe").await.expect_err("should fail");
        assert!(matches!(
            err.current_context(),
            EditorError::ImportRejected { .. }
        ));
    }

    #[tokio::test]
    async fn labelled_branches_import_and_validate() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);

        let yaml = r"
workflow:
  name: Router
  nodes:
    - id: start_1
      type: event_start
      config:
        trigger_type: person_message
    - id: branch_1
      type: chat_command_branch
    - id: cmd_1
      type: reply_message
      config:
        content: running
    - id: chat_1
      type: reply_message
      config:
        content: hello
  edges:
    - id: e1
      source: start_1
      target: branch_1
    - id: e2
      source: branch_1
      target: cmd_1
      label: command
    - id: e3
      source: branch_1
      target: chat_1
      label: chat
";
        editor.import(yaml.as_bytes()).await.expect("import");

        let report = editor.validate();
        assert!(!report.has_blocking(), "{:?}", report.issues());
        assert_eq!(editor.graph().edge_count(), 3);
    }

    #[test]
    fn labelled_branches_connect() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        let condition = editor
            .add_node(&NodeKind::Condition, Position::default(), None)
            .id;
        let a = editor
            .add_node(&NodeKind::ReplyMessage, Position::default(), None)
            .id;
        let b = editor
            .add_node(&NodeKind::ReplyMessage, Position::default(), None)
            .id;

        editor
            .connect(&condition, &a, None, Some("true".to_string()))
            .expect("true branch");
        editor
            .connect(&condition, &b, None, Some("false".to_string()))
            .expect("false branch");

        let report = editor.graph().validate();
        assert!(!report.has_blocking(), "{:?}", report.issues());
    }

    #[tokio::test]
    async fn rejected_import_upload_changes_nothing() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);
        let id = editor.save().await.expect("save");
        let bytes = editor.export().await.expect("export");
        gateway
            .fail_next(GatewayError::Transport {
                reason: "reset".to_string(),
            })
            .await;

        assert!(editor.import(&bytes).await.is_err());
        assert_eq!(editor.workflow_id(), Some(&id));
    }

    #[tokio::test]
    async fn delete_resets_to_draft() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);
        let id = editor.save().await.expect("save");

        editor.delete_workflow().await.expect("delete");

        assert!(editor.workflow_id().is_none());
        assert!(editor.graph().is_empty());
        assert!(gateway.stored(&id).await.is_none());
    }

    #[tokio::test]
    async fn lifecycle_changes_persist_on_save() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);
        let id = editor.save().await.expect("save");

        editor.activate();
        assert!(editor.is_dirty());
        editor.save().await.expect("save");
        assert_eq!(
            gateway.stored(&id).await.map(|w| w.status),
            Some(WorkflowStatus::Active)
        );

        editor.archive();
        assert_eq!(editor.status(), WorkflowStatus::Archived);
    }

    #[tokio::test]
    async fn save_is_refused_while_in_flight() {
        let gateway = InMemoryGateway::new();
        let mut editor = editor(&gateway);
        build_greeter(&mut editor);
        let _held = editor.gate().try_acquire(Operation::Save).expect("acquire");

        let err = editor.save().await.expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &EditorError::Busy {
                operation: Operation::Save
            }
        );
        assert!(gateway.calls().await.is_empty());
    }

    #[test]
    fn check_definition_reports_name_first() {
        let mut definition = WorkflowDefinition::new("  ");
        let mut graph = WorkflowGraph::new();
        let end = graph.add_node(&NodeKind::End, Position::default(), None).id.clone();
        let reply = graph
            .add_node(&NodeKind::ReplyMessage, Position::default(), None)
            .id
            .clone();
        graph
            .insert_edge(Edge::new(end, reply))
            .expect("insert");
        definition.graph = graph.to_definition_payload();

        let (_, report) = check_definition(&definition).expect("check");

        assert_eq!(report.issues().first(), Some(&ValidationIssue::MissingName));
        assert!(
            report
                .issues()
                .iter()
                .any(|issue| matches!(issue, ValidationIssue::OutboundFromEnd { .. }))
        );
    }

    #[test]
    fn field_parsing_follows_kind() {
        assert_eq!(parse_field(Some(FieldKind::Text), "a b"), Ok(json!("a b")));
        assert_eq!(parse_field(Some(FieldKind::Any), "[1, 2]"), Ok(json!([1, 2])));
        assert_eq!(parse_field(Some(FieldKind::Mapping), "  "), Ok(JsonValue::Null));
        assert!(parse_field(Some(FieldKind::List), "{}").is_err());
        assert_eq!(parse_field(None, "plain"), Ok(json!("plain")));
        assert_eq!(parse_field(None, "42"), Ok(json!(42)));
    }
}
