//! Debug session state machine.
//!
//! A session moves `idle → starting → running → {completed, failed}`. In step
//! mode, reaching a breakpoint moves it to `paused` until [`step`] is called.
//!
//! The executor answers a debug call with the whole trace at once. The
//! controller folds that trace into per-node records one entry at a time,
//! which is what makes pausing and stepping possible on the client side.
//!
//! Responses are matched to sessions by [`DebugSessionId`]. After a
//! [`reset`] or a new start, a late response for the old session is dropped.
//!
//! [`step`]: DebugSessionController::step
//! [`reset`]: DebugSessionController::reset

use crate::error::DebugError;
use crate::gate::{Operation, OperationGate};
use chrono::Utc;
use flowdeck_core::{DebugSessionId, ExecutionId, NodeId, WorkflowId};
use flowdeck_gateway::{DebugRequest, DebugResponse, GatewayError, PersistenceGateway, RunStatus};
use flowdeck_workflow::{
    ErrorHandler, ExecutionEvent, JsonMap, NodeExecutionRecord, NodeExecutionStatus, NodeKind,
    TriggerType, WorkflowDefinition, WorkflowGraph,
};
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};

/// Retries assumed for `error_handler: retry` when no count is configured.
const DEFAULT_RETRIES: u32 = 1;

/// State of the debug controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugState {
    Idle,
    Starting,
    Running,
    Paused,
    Completed,
    Failed,
}

impl DebugState {
    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DebugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How the controller treats a failure of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodePolicy {
    handler: ErrorHandler,
    retries: u32,
    writes_variable: bool,
}

/// A saved workflow prepared for a debug run.
///
/// Built from the persisted definition, never from unsaved edits.
#[derive(Debug, Clone)]
pub struct DebugTarget {
    workflow_id: WorkflowId,
    order: Vec<NodeId>,
    policies: HashMap<NodeId, NodePolicy>,
    variables: JsonMap,
    trigger: TriggerType,
    trigger_data: JsonMap,
}

impl DebugTarget {
    /// Prepares a saved definition for debugging.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition has no ID or its graph cannot be read.
    pub fn from_definition(
        definition: &WorkflowDefinition,
        trigger: TriggerType,
    ) -> Result<Self, DebugError> {
        let workflow_id = definition.id.clone().ok_or(DebugError::NotPersisted)?;
        let graph = WorkflowGraph::from_definition_payload(&definition.graph).map_err(|e| {
            DebugError::InvalidWorkflow {
                reason: e.to_string(),
            }
        })?;

        let mut order = graph.execution_order().unwrap_or_default();
        for node in graph.nodes() {
            if !order.contains(&node.id) {
                order.push(node.id.clone());
            }
        }

        let policies = graph
            .nodes()
            .map(|node| {
                let advanced = node.config.advanced();
                let policy = NodePolicy {
                    handler: advanced.error_handler(),
                    retries: advanced.retry.unwrap_or(DEFAULT_RETRIES),
                    writes_variable: matches!(
                        node.kind(),
                        NodeKind::SetVariable | NodeKind::GetVariable
                    ),
                };
                (node.id.clone(), policy)
            })
            .collect();

        let variables = definition.variable_defaults().into_iter().collect();

        Ok(Self {
            workflow_id,
            order,
            policies,
            variables,
            trigger,
            trigger_data: JsonMap::new(),
        })
    }

    /// Attaches the payload the trigger would have delivered.
    #[must_use]
    pub fn with_trigger_data(mut self, trigger_data: JsonMap) -> Self {
        self.trigger_data = trigger_data;
        self
    }

    #[must_use]
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }
}

/// One step of the trace still to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TraceEntry {
    Execute(NodeId),
    Skip(NodeId),
}

/// Everything needed to send the debug call for a started session.
#[derive(Debug, Clone)]
pub struct StartTicket {
    pub session_id: DebugSessionId,
    pub workflow_id: WorkflowId,
    pub request: DebugRequest,
}

/// What became of a debug response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Folded into the current session, leaving it in this state.
    Applied(DebugState),
    /// Belonged to a session that no longer exists.
    Discarded,
}

/// One debug run and its client-side view.
#[derive(Debug, Clone)]
pub struct DebugSession {
    id: DebugSessionId,
    workflow_id: WorkflowId,
    execution_id: Option<ExecutionId>,
    state: DebugState,
    events: Vec<ExecutionEvent>,
    records: Vec<NodeExecutionRecord>,
    record_index: HashMap<NodeId, usize>,
    variables: JsonMap,
    breakpoints: BTreeSet<NodeId>,
    step_mode: bool,
    current_node: Option<NodeId>,
    policies: HashMap<NodeId, NodePolicy>,
    pending: VecDeque<TraceEntry>,
    node_errors: HashMap<NodeId, VecDeque<String>>,
    outputs: BTreeMap<NodeId, JsonValue>,
    attempts: HashMap<NodeId, u32>,
    run_error: Option<String>,
    final_variables: JsonMap,
    resume_from: Option<NodeId>,
}

impl DebugSession {
    fn new(target: &DebugTarget, breakpoints: BTreeSet<NodeId>, step_mode: bool) -> Self {
        let mut session = Self {
            id: DebugSessionId::new(),
            workflow_id: target.workflow_id.clone(),
            execution_id: None,
            state: DebugState::Starting,
            events: Vec::new(),
            records: Vec::new(),
            record_index: HashMap::new(),
            variables: target.variables.clone(),
            breakpoints,
            step_mode,
            current_node: None,
            policies: target.policies.clone(),
            pending: VecDeque::new(),
            node_errors: HashMap::new(),
            outputs: BTreeMap::new(),
            attempts: HashMap::new(),
            run_error: None,
            final_variables: JsonMap::new(),
            resume_from: None,
        };
        for node_id in &target.order {
            session.record_mut(node_id);
        }
        session.events.push(ExecutionEvent::RunRequested {
            breakpoints: session.breakpoints.iter().cloned().collect(),
            step_mode,
            timestamp: Utc::now(),
        });
        session
    }

    #[must_use]
    pub fn id(&self) -> &DebugSessionId {
        &self.id
    }

    #[must_use]
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// Execution ID assigned by the executor, once it answered.
    #[must_use]
    pub fn execution_id(&self) -> Option<&ExecutionId> {
        self.execution_id.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> DebugState {
        self.state
    }

    /// Returns the event log, oldest first.
    #[must_use]
    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    /// Returns every node record, in execution order.
    #[must_use]
    pub fn records(&self) -> &[NodeExecutionRecord] {
        &self.records
    }

    #[must_use]
    pub fn record(&self, node_id: &NodeId) -> Option<&NodeExecutionRecord> {
        self.record_index.get(node_id).map(|&i| &self.records[i])
    }

    /// Returns the current variable snapshot.
    #[must_use]
    pub fn variables(&self) -> &JsonMap {
        &self.variables
    }

    #[must_use]
    pub fn breakpoints(&self) -> &BTreeSet<NodeId> {
        &self.breakpoints
    }

    #[must_use]
    pub fn step_mode(&self) -> bool {
        self.step_mode
    }

    /// Node the session is paused at.
    #[must_use]
    pub fn current_node(&self) -> Option<&NodeId> {
        self.current_node.as_ref()
    }

    /// Why the run failed, once it has.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|event| match event {
            ExecutionEvent::RunFailed { error, .. } => Some(error.as_str()),
            _ => None,
        })
    }

    /// Returns the IDs of nodes that ran, in the order they finished.
    #[must_use]
    pub fn executed_nodes(&self) -> Vec<NodeId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::NodeCompleted { node_id, .. } => Some(node_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn record_mut(&mut self, node_id: &NodeId) -> &mut NodeExecutionRecord {
        let index = match self.record_index.get(node_id) {
            Some(&index) => index,
            None => {
                self.records.push(NodeExecutionRecord::new(node_id.clone()));
                self.record_index
                    .insert(node_id.clone(), self.records.len() - 1);
                self.records.len() - 1
            }
        };
        &mut self.records[index]
    }

    fn policy(&self, node_id: &NodeId) -> NodePolicy {
        self.policies.get(node_id).copied().unwrap_or(NodePolicy {
            handler: ErrorHandler::Fail,
            retries: DEFAULT_RETRIES,
            writes_variable: false,
        })
    }

    /// Loads the executor's answer and starts folding it.
    fn load(&mut self, response: DebugResponse) {
        info!(
            session_id = %self.id,
            execution_id = %response.execution_id,
            status = %response.status,
            executed = response.executed_nodes.len(),
            "debug trace received"
        );
        self.events.push(ExecutionEvent::RunStarted {
            execution_id: response.execution_id.clone(),
            timestamp: Utc::now(),
        });
        self.execution_id = Some(response.execution_id);
        self.state = DebugState::Running;

        let mut run_errors = Vec::new();
        for entry in response.errors {
            match entry.node_id {
                Some(node_id) => self
                    .node_errors
                    .entry(node_id)
                    .or_default()
                    .push_back(entry.error),
                None => run_errors.push(entry.error),
            }
        }
        if run_errors.is_empty() && response.status == RunStatus::Failed {
            run_errors.push("executor reported failure".to_string());
        }
        self.run_error = (!run_errors.is_empty()).then(|| run_errors.join("; "));

        let mut trace: Vec<TraceEntry> = response
            .executed_nodes
            .iter()
            .cloned()
            .map(TraceEntry::Execute)
            .collect();

        // A node that failed without being reported as executed still
        // belongs in the trace, ahead of the first executed node after it.
        let position: HashMap<&NodeId, usize> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| (&record.node_id, i))
            .collect();
        let mut failed_only: Vec<&NodeId> = self
            .node_errors
            .keys()
            .filter(|id| !response.executed_nodes.contains(id))
            .collect();
        failed_only.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
        for node_id in failed_only {
            let rank = position.get(node_id).copied().unwrap_or(usize::MAX);
            let at = trace
                .iter()
                .position(|entry| match entry {
                    TraceEntry::Execute(id) | TraceEntry::Skip(id) => {
                        position.get(id).copied().unwrap_or(usize::MAX) > rank
                    }
                })
                .unwrap_or(trace.len());
            trace.insert(at, TraceEntry::Execute(node_id.clone()));
        }

        for node_id in response.skipped_nodes {
            if !response.executed_nodes.contains(&node_id) {
                trace.push(TraceEntry::Skip(node_id));
            }
        }

        self.pending = trace.into();
        self.outputs = response.outputs;
        self.final_variables = response.final_variables;
        self.advance();
    }

    /// Applies trace entries until the trace ends, the run halts, or a
    /// breakpoint pauses it.
    fn advance(&mut self) {
        while let Some(entry) = self.pending.pop_front() {
            match entry {
                TraceEntry::Skip(node_id) => self.apply_skip(&node_id),
                TraceEntry::Execute(node_id) => {
                    if self.record(&node_id).is_some_and(NodeExecutionRecord::is_terminal) {
                        warn!(session_id = %self.id, node_id = %node_id, "node revisited, ignoring");
                        self.events.push(ExecutionEvent::NodeRevisited {
                            node_id,
                            timestamp: Utc::now(),
                        });
                        continue;
                    }

                    let resuming = self.resume_from.as_ref() == Some(&node_id);
                    if self.step_mode && !resuming && self.breakpoints.contains(&node_id) {
                        self.mark_running(&node_id);
                        self.pending.push_front(TraceEntry::Execute(node_id.clone()));
                        debug!(session_id = %self.id, node_id = %node_id, "paused at breakpoint");
                        self.events.push(ExecutionEvent::Paused {
                            node_id: node_id.clone(),
                            timestamp: Utc::now(),
                        });
                        self.current_node = Some(node_id);
                        self.state = DebugState::Paused;
                        return;
                    }
                    self.resume_from = None;

                    if !self.apply_execute(&node_id) {
                        return;
                    }
                }
            }
        }
        self.finish();
    }

    fn mark_running(&mut self, node_id: &NodeId) {
        let record = self.record_mut(node_id);
        if record.status != NodeExecutionStatus::Pending {
            return;
        }
        if let Err(error) = record.start() {
            warn!(%error, "record refused start");
            return;
        }
        self.events.push(ExecutionEvent::NodeStarted {
            node_id: node_id.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Applies one executed entry. Returns false if the run halted.
    fn apply_execute(&mut self, node_id: &NodeId) -> bool {
        self.mark_running(node_id);

        let error = self
            .node_errors
            .get_mut(node_id)
            .and_then(VecDeque::pop_front);
        let Some(error) = error else {
            let output = self.outputs.get(node_id).cloned();
            if let Err(transition) = self.record_mut(node_id).succeed(output.clone()) {
                warn!(error = %transition, "record refused success");
            }
            if self.policy(node_id).writes_variable {
                self.write_variable(output.as_ref());
            }
            self.events.push(ExecutionEvent::NodeCompleted {
                node_id: node_id.clone(),
                timestamp: Utc::now(),
            });
            return true;
        };

        let policy = self.policy(node_id);
        let attempts = self.attempts.get(node_id).copied().unwrap_or(0);
        let retried_later = self
            .pending
            .iter()
            .any(|entry| *entry == TraceEntry::Execute(node_id.clone()));

        self.events.push(ExecutionEvent::NodeFailed {
            node_id: node_id.clone(),
            error: error.clone(),
            timestamp: Utc::now(),
        });

        match policy.handler {
            ErrorHandler::Retry if attempts < policy.retries && retried_later => {
                debug!(node_id = %node_id, attempt = attempts + 1, "node will be retried");
                self.attempts.insert(node_id.clone(), attempts + 1);
                true
            }
            ErrorHandler::Skip => {
                if let Err(transition) = self.record_mut(node_id).skip(Some(error.clone())) {
                    warn!(error = %transition, "record refused skip");
                }
                self.events.push(ExecutionEvent::NodeSkipped {
                    node_id: node_id.clone(),
                    reason: error,
                    timestamp: Utc::now(),
                });
                true
            }
            _ => {
                if let Err(transition) = self.record_mut(node_id).fail(error.clone()) {
                    warn!(error = %transition, "record refused failure");
                }
                self.halt(format!("node {node_id} failed: {error}"));
                false
            }
        }
    }

    fn apply_skip(&mut self, node_id: &NodeId) {
        let record = self.record_mut(node_id);
        if record.is_terminal() {
            return;
        }
        if let Err(error) = record.skip(None) {
            warn!(%error, "record refused skip");
            return;
        }
        self.events.push(ExecutionEvent::NodeSkipped {
            node_id: node_id.clone(),
            reason: "branch not taken".to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Writes a `{variable, value}` output into the snapshot.
    fn write_variable(&mut self, output: Option<&JsonValue>) {
        let Some(output) = output else {
            return;
        };
        let Some(name) = output.get("variable").and_then(JsonValue::as_str) else {
            return;
        };
        let value = output.get("value").cloned().unwrap_or(JsonValue::Null);
        self.variables.insert(name.to_string(), value);
    }

    fn apply_final_variables(&mut self) {
        for (name, value) in std::mem::take(&mut self.final_variables) {
            self.variables.insert(name, value);
        }
    }

    fn halt(&mut self, error: String) {
        self.pending.clear();
        self.apply_final_variables();
        self.current_node = None;
        warn!(session_id = %self.id, %error, "debug run failed");
        self.events.push(ExecutionEvent::RunFailed {
            error,
            timestamp: Utc::now(),
        });
        self.state = DebugState::Failed;
    }

    fn finish(&mut self) {
        if let Some(error) = self.run_error.take() {
            self.halt(error);
            return;
        }
        self.apply_final_variables();
        self.current_node = None;
        info!(session_id = %self.id, "debug run completed");
        self.events.push(ExecutionEvent::RunCompleted {
            timestamp: Utc::now(),
        });
        self.state = DebugState::Completed;
    }

    fn resume(&mut self) {
        let Some(node_id) = self.current_node.take() else {
            return;
        };
        self.events.push(ExecutionEvent::Resumed {
            node_id: node_id.clone(),
            timestamp: Utc::now(),
        });
        self.resume_from = Some(node_id);
        self.state = DebugState::Running;
        self.advance();
    }
}

/// Drives debug runs of saved workflows.
pub struct DebugSessionController<G> {
    gateway: G,
    gate: OperationGate,
    breakpoints: BTreeSet<NodeId>,
    step_mode: bool,
    session: Option<DebugSession>,
}

impl<G: PersistenceGateway> DebugSessionController<G> {
    /// Creates an idle controller.
    pub fn new(gateway: G, gate: OperationGate) -> Self {
        Self {
            gateway,
            gate,
            breakpoints: BTreeSet::new(),
            step_mode: false,
            session: None,
        }
    }

    /// Returns the controller state; `idle` when no session exists.
    #[must_use]
    pub fn state(&self) -> DebugState {
        self.session
            .as_ref()
            .map_or(DebugState::Idle, DebugSession::state)
    }

    #[must_use]
    pub fn session(&self) -> Option<&DebugSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn breakpoints(&self) -> &BTreeSet<NodeId> {
        &self.breakpoints
    }

    #[must_use]
    pub fn step_mode(&self) -> bool {
        self.step_mode
    }

    /// Adds or removes a breakpoint. Returns true if it is now set.
    ///
    /// # Errors
    ///
    /// Returns an error unless the controller is idle or paused.
    pub fn toggle_breakpoint(&mut self, node_id: NodeId) -> Result<bool, DebugError> {
        let state = self.state();
        if !matches!(state, DebugState::Idle | DebugState::Paused) {
            return Err(DebugError::BreakpointsLocked { state });
        }

        let now_set = if self.breakpoints.remove(&node_id) {
            false
        } else {
            self.breakpoints.insert(node_id.clone());
            true
        };
        if let Some(session) = self.session.as_mut() {
            session.breakpoints = self.breakpoints.clone();
        }
        debug!(node_id = %node_id, now_set, "breakpoint toggled");
        Ok(now_set)
    }

    /// Creates a `starting` session and returns the call to make.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::AlreadyRunning`] unless the controller is idle.
    pub fn begin_start(
        &mut self,
        target: &DebugTarget,
        breakpoints: impl IntoIterator<Item = NodeId>,
        step_mode: bool,
    ) -> Result<StartTicket, DebugError> {
        let state = self.state();
        if state != DebugState::Idle {
            return Err(DebugError::AlreadyRunning { state });
        }

        self.breakpoints = breakpoints.into_iter().collect();
        self.step_mode = step_mode;
        let session = DebugSession::new(target, self.breakpoints.clone(), step_mode);
        let ticket = StartTicket {
            session_id: session.id,
            workflow_id: target.workflow_id.clone(),
            request: DebugRequest {
                trigger: target.trigger,
                trigger_data: target.trigger_data.clone(),
                breakpoints: self.breakpoints.iter().cloned().collect(),
                step_mode,
            },
        };
        info!(
            session_id = %session.id,
            workflow_id = %target.workflow_id,
            breakpoints = self.breakpoints.len(),
            step_mode,
            "debug session starting"
        );
        self.session = Some(session);
        Ok(ticket)
    }

    /// Folds the answer to a debug call into its session.
    ///
    /// Answers for a session that was reset or replaced are discarded. A
    /// failed call drops the session and returns the controller to `idle`
    /// with its breakpoints intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the call itself failed.
    pub fn apply_response(
        &mut self,
        session_id: &DebugSessionId,
        result: Result<DebugResponse, Report<GatewayError>>,
    ) -> Result<ResponseOutcome, Report<DebugError>> {
        let is_current = self
            .session
            .as_ref()
            .is_some_and(|s| s.id == *session_id && s.state == DebugState::Starting);
        if !is_current {
            warn!(session_id = %session_id, "discarding stale debug response");
            return Ok(ResponseOutcome::Discarded);
        }

        let response = match result {
            Ok(response) => response,
            Err(report) => {
                self.session = None;
                let retryable = report.current_context().is_retryable();
                warn!(session_id = %session_id, error = %report, "debug request failed");
                return Err(report.context(DebugError::Gateway { retryable }));
            }
        };

        let Some(session) = self.session.as_mut() else {
            return Ok(ResponseOutcome::Discarded);
        };
        session.load(response);
        Ok(ResponseOutcome::Applied(session.state))
    }

    /// Starts a debug run and waits for its trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is not idle, a start is already in
    /// flight, or the debug call fails.
    pub async fn start(
        &mut self,
        target: &DebugTarget,
        breakpoints: impl IntoIterator<Item = NodeId>,
        step_mode: bool,
    ) -> Result<DebugState, Report<DebugError>> {
        let _guard = self
            .gate
            .try_acquire(Operation::Debug)
            .ok_or(DebugError::Busy)?;

        let ticket = self.begin_start(target, breakpoints, step_mode)?;
        let result = self
            .gateway
            .start_debug(&ticket.workflow_id, &ticket.request)
            .await;
        self.apply_response(&ticket.session_id, result)?;
        Ok(self.state())
    }

    /// Resumes a paused session.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::NotPaused`] unless the session is paused.
    pub fn step(&mut self) -> Result<DebugState, DebugError> {
        let state = self.state();
        let Some(session) = self.session.as_mut().filter(|_| state == DebugState::Paused) else {
            return Err(DebugError::NotPaused { state });
        };
        session.resume();
        Ok(session.state)
    }

    /// Discards the session and returns to `idle`.
    pub fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            info!(session_id = %session.id, state = %session.state, "debug session reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdeck_core::EdgeId;
    use flowdeck_gateway::{InMemoryGateway, RunError};
    use flowdeck_workflow::{EdgePayload, NodePayload};
    use serde_json::json;

    fn node(id: &str, node_type: &str, config: JsonValue) -> NodePayload {
        NodePayload {
            id: NodeId::new(id),
            node_type: node_type.to_string(),
            name: id.to_string(),
            description: None,
            position: None,
            config,
            extra: JsonMap::new(),
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> EdgePayload {
        EdgePayload {
            id: EdgeId::new(id),
            source: NodeId::new(source),
            target: NodeId::new(target),
            label: None,
            condition: None,
            extra: JsonMap::new(),
        }
    }

    fn greeter() -> WorkflowDefinition {
        let mut definition = WorkflowDefinition::new("Greeter");
        definition.id = Some(WorkflowId::new("wf_greeter"));
        definition.graph.nodes = vec![
            node(
                "start_node_1",
                "event_start",
                json!({"trigger_type": "person_message"}),
            ),
            node(
                "reply_node_1",
                "reply_message",
                json!({"content": "Hello ${name}"}),
            ),
            node("end_node_1", "end", json!({})),
        ];
        definition.graph.edges = vec![
            edge("e1", "start_node_1", "reply_node_1"),
            edge("e2", "reply_node_1", "end_node_1"),
        ];
        definition
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    async fn controller() -> (DebugSessionController<InMemoryGateway>, InMemoryGateway, DebugTarget)
    {
        let gateway = InMemoryGateway::new();
        let definition = greeter();
        gateway.insert(definition.clone()).await;
        let target =
            DebugTarget::from_definition(&definition, TriggerType::PersonMessage).expect("target");
        (
            DebugSessionController::new(gateway.clone(), OperationGate::new()),
            gateway,
            target,
        )
    }

    fn trace(executed: &[&str], status: RunStatus) -> DebugResponse {
        DebugResponse {
            execution_id: ExecutionId::new("exec_1"),
            status,
            executed_nodes: ids(executed),
            final_variables: JsonMap::new(),
            errors: Vec::new(),
            outputs: BTreeMap::new(),
            skipped_nodes: Vec::new(),
        }
    }

    fn statuses(session: &DebugSession) -> Vec<NodeExecutionStatus> {
        session.records().iter().map(|r| r.status).collect()
    }

    #[tokio::test]
    async fn linear_run_completes_in_edge_order() {
        let (mut controller, _, target) = controller().await;

        let state = controller.start(&target, [], false).await.expect("start");

        assert_eq!(state, DebugState::Completed);
        let session = controller.session().expect("session");
        assert_eq!(
            session.executed_nodes(),
            ids(&["start_node_1", "reply_node_1", "end_node_1"])
        );
        assert!(session.execution_id().is_some());
        assert!(
            session
                .records()
                .iter()
                .all(|r| r.status == NodeExecutionStatus::Success)
        );
    }

    #[tokio::test]
    async fn step_mode_pauses_before_breakpoint_node() {
        let (mut controller, gateway, target) = controller().await;

        let state = controller
            .start(&target, ids(&["reply_node_1"]), true)
            .await
            .expect("start");

        assert_eq!(state, DebugState::Paused);
        let session = controller.session().expect("session");
        assert_eq!(session.current_node(), Some(&NodeId::new("reply_node_1")));
        assert_eq!(
            statuses(session),
            vec![
                NodeExecutionStatus::Success,
                NodeExecutionStatus::Running,
                NodeExecutionStatus::Pending,
            ]
        );

        let state = controller.step().expect("step");
        assert_eq!(state, DebugState::Completed);
        let session = controller.session().expect("session");
        assert!(session.current_node().is_none());
        assert_eq!(
            session.executed_nodes(),
            ids(&["start_node_1", "reply_node_1", "end_node_1"])
        );

        let requests = gateway.debug_requests().await;
        assert_eq!(requests[0].breakpoints, ids(&["reply_node_1"]));
        assert!(requests[0].step_mode);
    }

    #[tokio::test]
    async fn breakpoints_are_ignored_without_step_mode() {
        let (mut controller, _, target) = controller().await;
        let state = controller
            .start(&target, ids(&["reply_node_1"]), false)
            .await
            .expect("start");
        assert_eq!(state, DebugState::Completed);
    }

    #[tokio::test]
    async fn step_outside_paused_fails() {
        let (mut controller, _, target) = controller().await;
        assert_eq!(
            controller.step(),
            Err(DebugError::NotPaused {
                state: DebugState::Idle
            })
        );

        controller.start(&target, [], false).await.expect("start");
        assert_eq!(
            controller.step(),
            Err(DebugError::NotPaused {
                state: DebugState::Completed
            })
        );
    }

    #[tokio::test]
    async fn start_requires_idle() {
        let (mut controller, _, target) = controller().await;
        controller
            .start(&target, ids(&["reply_node_1"]), true)
            .await
            .expect("start");

        let err = controller
            .start(&target, [], false)
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &DebugError::AlreadyRunning {
                state: DebugState::Paused
            }
        );
    }

    #[tokio::test]
    async fn transport_failure_returns_to_idle_with_breakpoints() {
        let (mut controller, gateway, target) = controller().await;
        gateway
            .fail_next(GatewayError::Transport {
                reason: "timed out".to_string(),
            })
            .await;

        let err = controller
            .start(&target, ids(&["reply_node_1"]), true)
            .await
            .expect_err("should fail");

        assert_eq!(
            err.current_context(),
            &DebugError::Gateway { retryable: true }
        );
        assert_eq!(controller.state(), DebugState::Idle);
        assert!(controller.breakpoints().contains(&NodeId::new("reply_node_1")));
    }

    #[tokio::test]
    async fn stale_response_is_discarded_after_reset() {
        let (mut controller, _, target) = controller().await;
        let ticket = controller.begin_start(&target, [], false).expect("begin");
        controller.reset();

        let outcome = controller
            .apply_response(
                &ticket.session_id,
                Ok(trace(&["start_node_1"], RunStatus::Completed)),
            )
            .expect("apply");

        assert_eq!(outcome, ResponseOutcome::Discarded);
        assert_eq!(controller.state(), DebugState::Idle);
    }

    #[tokio::test]
    async fn response_for_replaced_session_is_discarded() {
        let (mut controller, _, target) = controller().await;
        let old = controller.begin_start(&target, [], false).expect("begin");
        controller.reset();
        let current = controller.begin_start(&target, [], false).expect("begin");

        let stale = controller
            .apply_response(&old.session_id, Ok(trace(&[], RunStatus::Failed)))
            .expect("apply");
        assert_eq!(stale, ResponseOutcome::Discarded);
        assert_eq!(controller.state(), DebugState::Starting);

        let applied = controller
            .apply_response(
                &current.session_id,
                Ok(trace(
                    &["start_node_1", "reply_node_1", "end_node_1"],
                    RunStatus::Completed,
                )),
            )
            .expect("apply");
        assert_eq!(applied, ResponseOutcome::Applied(DebugState::Completed));
    }

    #[tokio::test]
    async fn node_failure_with_fail_handler_halts() {
        let (mut controller, _, target) = controller().await;
        let ticket = controller.begin_start(&target, [], false).expect("begin");
        let mut response = trace(&["start_node_1", "reply_node_1"], RunStatus::Failed);
        response.errors.push(RunError {
            node_id: Some(NodeId::new("reply_node_1")),
            error: "send failed".to_string(),
        });

        controller
            .apply_response(&ticket.session_id, Ok(response))
            .expect("apply");

        let session = controller.session().expect("session");
        assert_eq!(session.state(), DebugState::Failed);
        let record = session.record(&NodeId::new("reply_node_1")).expect("record");
        assert_eq!(record.status, NodeExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("send failed"));
        assert_eq!(
            session.record(&NodeId::new("end_node_1")).map(|r| r.status),
            Some(NodeExecutionStatus::Pending)
        );
    }

    #[tokio::test]
    async fn node_failure_with_skip_handler_continues() {
        let gateway = InMemoryGateway::new();
        let mut definition = greeter();
        definition.graph.nodes[1].config =
            json!({"content": "Hello", "error_handler": "skip"});
        let target =
            DebugTarget::from_definition(&definition, TriggerType::PersonMessage).expect("target");
        let mut controller = DebugSessionController::new(gateway, OperationGate::new());

        let ticket = controller.begin_start(&target, [], false).expect("begin");
        // The executor leaves a skipped failure out of executed_nodes.
        let mut response = trace(&["start_node_1", "end_node_1"], RunStatus::Completed);
        response.errors.push(RunError {
            node_id: Some(NodeId::new("reply_node_1")),
            error: "send failed".to_string(),
        });
        controller
            .apply_response(&ticket.session_id, Ok(response))
            .expect("apply");

        let session = controller.session().expect("session");
        assert_eq!(session.state(), DebugState::Completed);
        assert_eq!(
            statuses(session),
            vec![
                NodeExecutionStatus::Success,
                NodeExecutionStatus::Skipped,
                NodeExecutionStatus::Success,
            ]
        );
        let skipped_at = session
            .events()
            .iter()
            .position(|e| matches!(e, ExecutionEvent::NodeSkipped { .. }))
            .expect("skip event");
        let end_at = session
            .events()
            .iter()
            .position(|e| {
                matches!(e, ExecutionEvent::NodeCompleted { node_id, .. } if node_id.as_str() == "end_node_1")
            })
            .expect("end event");
        assert!(skipped_at < end_at);
    }

    #[tokio::test]
    async fn retry_handler_waits_for_next_attempt() {
        let gateway = InMemoryGateway::new();
        let mut definition = greeter();
        definition.graph.nodes[1].config =
            json!({"content": "Hello", "error_handler": "retry", "retry": 2});
        let target =
            DebugTarget::from_definition(&definition, TriggerType::PersonMessage).expect("target");
        let mut controller = DebugSessionController::new(gateway, OperationGate::new());

        let ticket = controller.begin_start(&target, [], false).expect("begin");
        let mut response = trace(
            &["start_node_1", "reply_node_1", "reply_node_1", "end_node_1"],
            RunStatus::Completed,
        );
        response.errors.push(RunError {
            node_id: Some(NodeId::new("reply_node_1")),
            error: "timeout".to_string(),
        });
        controller
            .apply_response(&ticket.session_id, Ok(response))
            .expect("apply");

        let session = controller.session().expect("session");
        assert_eq!(session.state(), DebugState::Completed);
        assert_eq!(
            session.record(&NodeId::new("reply_node_1")).map(|r| r.status),
            Some(NodeExecutionStatus::Success)
        );
    }

    #[tokio::test]
    async fn repeated_terminal_node_is_ignored() {
        let (mut controller, _, target) = controller().await;
        let ticket = controller.begin_start(&target, [], false).expect("begin");
        controller
            .apply_response(
                &ticket.session_id,
                Ok(trace(
                    &["start_node_1", "reply_node_1", "reply_node_1", "end_node_1"],
                    RunStatus::Completed,
                )),
            )
            .expect("apply");

        let session = controller.session().expect("session");
        assert_eq!(session.state(), DebugState::Completed);
        assert!(
            session
                .events()
                .iter()
                .any(|e| matches!(e, ExecutionEvent::NodeRevisited { .. }))
        );
        assert_eq!(session.executed_nodes().len(), 3);
    }

    #[tokio::test]
    async fn top_level_error_fails_run() {
        let (mut controller, _, target) = controller().await;
        let ticket = controller.begin_start(&target, [], false).expect("begin");
        let mut response = trace(&["start_node_1"], RunStatus::Failed);
        response.errors.push(RunError {
            node_id: None,
            error: "executor crashed".to_string(),
        });
        controller
            .apply_response(&ticket.session_id, Ok(response))
            .expect("apply");

        let session = controller.session().expect("session");
        assert_eq!(session.state(), DebugState::Failed);
        assert!(session.events().iter().any(|e| matches!(
            e,
            ExecutionEvent::RunFailed { error, .. } if error == "executor crashed"
        )));
    }

    #[tokio::test]
    async fn variable_snapshot_takes_outputs_then_final_values() {
        let gateway = InMemoryGateway::new();
        let mut definition = greeter();
        definition.graph.nodes[1] = node(
            "set_node_1",
            "set_variable",
            json!({"variable_name": "name", "value": "Ada"}),
        );
        definition.graph.edges = vec![
            edge("e1", "start_node_1", "set_node_1"),
            edge("e2", "set_node_1", "end_node_1"),
        ];
        definition.variables.insert(
            "name".to_string(),
            serde_json::from_value(json!({"default": "nobody"})).expect("variable"),
        );
        let target =
            DebugTarget::from_definition(&definition, TriggerType::PersonMessage).expect("target");
        let mut controller = DebugSessionController::new(gateway, OperationGate::new());

        let ticket = controller
            .begin_start(&target, ids(&["end_node_1"]), true)
            .expect("begin");
        assert_eq!(
            controller.session().map(|s| s.variables().get("name").cloned()),
            Some(Some(json!("nobody")))
        );

        let mut response = trace(
            &["start_node_1", "set_node_1", "end_node_1"],
            RunStatus::Completed,
        );
        response.outputs.insert(
            NodeId::new("set_node_1"),
            json!({"variable": "name", "value": "Ada"}),
        );
        response
            .final_variables
            .insert("greeting".to_string(), json!("Hello Ada"));
        controller
            .apply_response(&ticket.session_id, Ok(response))
            .expect("apply");

        let session = controller.session().expect("session");
        assert_eq!(session.state(), DebugState::Paused);
        assert_eq!(session.variables().get("name"), Some(&json!("Ada")));

        controller.step().expect("step");
        let session = controller.session().expect("session");
        assert_eq!(session.variables().get("greeting"), Some(&json!("Hello Ada")));
    }

    #[tokio::test]
    async fn breakpoints_toggle_only_when_idle_or_paused() {
        let (mut controller, _, target) = controller().await;
        assert_eq!(
            controller.toggle_breakpoint(NodeId::new("reply_node_1")),
            Ok(true)
        );
        assert_eq!(
            controller.toggle_breakpoint(NodeId::new("reply_node_1")),
            Ok(false)
        );

        controller.begin_start(&target, [], false).expect("begin");
        assert_eq!(
            controller.toggle_breakpoint(NodeId::new("end_node_1")),
            Err(DebugError::BreakpointsLocked {
                state: DebugState::Starting
            })
        );
    }

    #[tokio::test]
    async fn breakpoint_added_while_paused_applies() {
        let (mut controller, _, target) = controller().await;
        controller
            .start(&target, ids(&["reply_node_1"]), true)
            .await
            .expect("start");

        controller
            .toggle_breakpoint(NodeId::new("end_node_1"))
            .expect("toggle");
        let state = controller.step().expect("step");

        assert_eq!(state, DebugState::Paused);
        assert_eq!(
            controller.session().and_then(DebugSession::current_node),
            Some(&NodeId::new("end_node_1"))
        );
    }

    #[tokio::test]
    async fn busy_gate_rejects_start() {
        let gateway = InMemoryGateway::new();
        let gate = OperationGate::new();
        let definition = greeter();
        gateway.insert(definition.clone()).await;
        let target =
            DebugTarget::from_definition(&definition, TriggerType::PersonMessage).expect("target");
        let mut controller = DebugSessionController::new(gateway, gate.clone());

        let _held = gate.try_acquire(Operation::Debug).expect("acquire");
        let err = controller
            .start(&target, [], false)
            .await
            .expect_err("should fail");
        assert_eq!(err.current_context(), &DebugError::Busy);
        assert_eq!(controller.state(), DebugState::Idle);
    }

    #[test]
    fn unsaved_definition_cannot_be_debugged() {
        let definition = WorkflowDefinition::new("draft");
        let err = DebugTarget::from_definition(&definition, TriggerType::Manual)
            .expect_err("should fail");
        assert_eq!(err, DebugError::NotPersisted);
    }

    #[test]
    fn record_statuses_never_leave_terminal() {
        let definition = greeter();
        let target =
            DebugTarget::from_definition(&definition, TriggerType::PersonMessage).expect("target");
        let mut session = DebugSession::new(&target, BTreeSet::new(), false);
        session.load(trace(
            &[
                "start_node_1",
                "start_node_1",
                "reply_node_1",
                "end_node_1",
                "reply_node_1",
            ],
            RunStatus::Completed,
        ));

        let mut seen: HashMap<NodeId, bool> = HashMap::new();
        for event in session.events() {
            let Some(node_id) = event.node_id() else {
                continue;
            };
            let terminal = seen.get(node_id).copied().unwrap_or(false);
            match event {
                ExecutionEvent::NodeStarted { .. } | ExecutionEvent::Paused { .. } => {
                    assert!(!terminal, "{node_id} restarted after finishing");
                }
                ExecutionEvent::NodeCompleted { .. } | ExecutionEvent::NodeSkipped { .. } => {
                    assert!(!terminal, "{node_id} finished twice");
                    seen.insert(node_id.clone(), true);
                }
                _ => {}
            }
        }
    }
}
