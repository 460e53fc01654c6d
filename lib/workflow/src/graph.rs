//! Workflow graph implementation using petgraph.
//!
//! Workflows are directed graphs where:
//! - Nodes are typed workflow steps keyed by [`NodeId`]
//! - Edges link a source node to a target node, optionally tagged with a
//!   branch condition
//!
//! The graph enforces the structural rules that can be checked one edit at a
//! time (start/end direction, unique branches). Whole-graph checks live in
//! [`crate::validation`].
//!
//! Edges loaded from a definition whose endpoints do not exist are kept
//! aside as dangling edges, so a broken definition can be opened, inspected,
//! and repaired instead of silently losing data.

use crate::edge::{Edge, EdgeCondition};
use crate::error::{GraphError, InvalidEdgeReason};
use crate::node::{JsonMap, Node, NodeKind, NodePatch, Position};
use flowdeck_core::{EdgeId, NodeId};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// A workflow graph using petgraph's stable directed graph.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    /// The underlying directed graph. Indices survive removals.
    graph: StableDiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index: HashMap<NodeId, NodeIndex>,
    /// Map from EdgeId to petgraph's EdgeIndex for O(1) lookup.
    edge_index: HashMap<EdgeId, EdgeIndex>,
    /// Edges whose source or target is not in the graph.
    dangling: HashMap<EdgeId, Edge>,
    /// Node insertion order.
    node_order: Vec<NodeId>,
    /// Edge insertion order, live and dangling.
    edge_order: Vec<EdgeId>,
}

impl WorkflowGraph {
    /// Creates a new empty workflow graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
            dangling: HashMap::new(),
            node_order: Vec::new(),
            edge_order: Vec::new(),
        }
    }

    fn index_of(&self, node_id: &NodeId) -> Result<NodeIndex, GraphError> {
        self.node_index
            .get(node_id)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })
    }

    fn contains_edge_id(&self, edge_id: &EdgeId) -> bool {
        self.edge_index.contains_key(edge_id) || self.dangling.contains_key(edge_id)
    }

    /// Adds a new node of the given kind with an empty configuration.
    ///
    /// The node gets a fresh ID. Without a label it is named after its kind.
    pub fn add_node(&mut self, kind: &NodeKind, position: Position, label: Option<String>) -> &Node {
        let mut id = NodeId::generate(kind.as_str());
        while self.node_index.contains_key(&id) {
            id = NodeId::generate(kind.as_str());
        }
        let name = label.unwrap_or_else(|| kind.to_string());
        let node = Node::new(id.clone(), name, kind).at(position);
        let index = self.graph.add_node(node);
        self.node_index.insert(id.clone(), index);
        self.node_order.push(id);
        &self.graph[index]
    }

    /// Inserts a fully built node, keeping its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if a node with the same ID already exists.
    pub fn insert_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.node_index.contains_key(&node.id) {
            return Err(GraphError::DuplicateNodeId { node_id: node.id });
        }
        let id = node.id.clone();
        let index = self.graph.add_node(node);
        self.node_index.insert(id.clone(), index);
        self.node_order.push(id);
        Ok(())
    }

    /// Applies a partial update to a node.
    ///
    /// Nothing changes unless the whole patch applies.
    ///
    /// # Errors
    ///
    /// Returns an error if the node doesn't exist or the merged config no
    /// longer fits the node's kind.
    pub fn update_node(&mut self, node_id: &NodeId, patch: NodePatch) -> Result<&Node, GraphError> {
        let index = self.index_of(node_id)?;
        let node = &mut self.graph[index];

        let config = match &patch.config {
            Some(changes) => Some(node.config.merge(changes).map_err(|error| {
                GraphError::InvalidConfig {
                    node_id: node_id.clone(),
                    error,
                }
            })?),
            None => None,
        };

        if let Some(name) = patch.name {
            node.name = name;
        }
        if let Some(description) = patch.description {
            node.description = description;
        }
        if let Some(position) = patch.position {
            node.position = Some(position);
        }
        if let Some(config) = config {
            node.config = config;
        }
        Ok(&*node)
    }

    /// Removes a node and every edge that touches it.
    ///
    /// # Errors
    ///
    /// Returns an error if the node doesn't exist.
    pub fn delete_node(&mut self, node_id: &NodeId) -> Result<Node, GraphError> {
        let index = self.index_of(node_id)?;

        let removed: HashSet<EdgeId> = self
            .all_edges()
            .filter(|edge| edge.touches(node_id))
            .map(|edge| edge.id.clone())
            .collect();

        for edge_id in &removed {
            self.edge_index.remove(edge_id);
            self.dangling.remove(edge_id);
        }
        self.edge_order.retain(|id| !removed.contains(id));
        self.node_order.retain(|id| id != node_id);
        self.node_index.remove(node_id);

        // StableGraph drops the incident edges along with the node.
        self.graph
            .remove_node(index)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })
    }

    /// Connects two nodes with a new edge.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Source or target node doesn't exist
    /// - The source is an end node or the target is a start node
    /// - The source branches and already has an edge with the same label and
    ///   condition (or a second default edge)
    pub fn connect(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        condition: Option<EdgeCondition>,
        label: Option<String>,
    ) -> Result<&Edge, GraphError> {
        let source_index = self.index_of(source)?;
        let target_index = self.index_of(target)?;

        let source_kind = self.graph[source_index].kind();
        if source_kind.is_end() {
            return Err(GraphError::InvalidEdge {
                source: source.clone(),
                target: target.clone(),
                reason: InvalidEdgeReason::SourceIsEnd,
            });
        }
        if self.graph[target_index].kind().is_start() {
            return Err(GraphError::InvalidEdge {
                source: source.clone(),
                target: target.clone(),
                reason: InvalidEdgeReason::TargetIsStart,
            });
        }
        if source_kind.is_branching()
            && self
                .outgoing(source)
                .iter()
                .any(|edge| edge.same_branch(label.as_deref(), condition.as_ref()))
        {
            return Err(GraphError::DuplicateBranch {
                node_id: source.clone(),
            });
        }

        let mut id = EdgeId::generate();
        while self.contains_edge_id(&id) {
            id = EdgeId::generate();
        }
        let edge = Edge {
            id: id.clone(),
            source: source.clone(),
            target: target.clone(),
            label,
            condition,
            extra: JsonMap::new(),
        };
        let index = self.graph.add_edge(source_index, target_index, edge);
        self.edge_index.insert(id.clone(), index);
        self.edge_order.push(id);
        Ok(&self.graph[index])
    }

    /// Inserts a fully built edge, keeping its ID.
    ///
    /// No structural rules are checked; an edge whose endpoints are missing
    /// is kept as dangling.
    ///
    /// # Errors
    ///
    /// Returns an error if an edge with the same ID already exists.
    pub fn insert_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if self.contains_edge_id(&edge.id) {
            return Err(GraphError::DuplicateEdgeId { edge_id: edge.id });
        }
        let id = edge.id.clone();
        match (
            self.node_index.get(&edge.source).copied(),
            self.node_index.get(&edge.target).copied(),
        ) {
            (Some(source), Some(target)) => {
                let index = self.graph.add_edge(source, target, edge);
                self.edge_index.insert(id.clone(), index);
            }
            _ => {
                warn!(
                    edge_id = %edge.id,
                    source = %edge.source,
                    target = %edge.target,
                    "keeping edge with missing endpoint"
                );
                self.dangling.insert(id.clone(), edge);
            }
        }
        self.edge_order.push(id);
        Ok(())
    }

    /// Removes an edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge doesn't exist.
    pub fn disconnect(&mut self, edge_id: &EdgeId) -> Result<Edge, GraphError> {
        let removed = match self.edge_index.remove(edge_id) {
            Some(index) => self.graph.remove_edge(index),
            None => self.dangling.remove(edge_id),
        };
        let edge = removed.ok_or_else(|| GraphError::EdgeNotFound {
            edge_id: edge_id.clone(),
        })?;
        self.edge_order.retain(|id| id != edge_id);
        Ok(edge)
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        let index = self.node_index.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns true if the node exists.
    #[must_use]
    pub fn contains_node(&self, node_id: &NodeId) -> bool {
        self.node_index.contains_key(node_id)
    }

    /// Returns a reference to an edge by its ID, dangling or not.
    #[must_use]
    pub fn edge(&self, edge_id: &EdgeId) -> Option<&Edge> {
        match self.edge_index.get(edge_id) {
            Some(index) => self.graph.edge_weight(*index),
            None => self.dangling.get(edge_id),
        }
    }

    /// Returns all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.node_order.iter().filter_map(|id| self.node(id))
    }

    /// Returns all edges, live and dangling, in insertion order.
    pub fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edge_order.iter().filter_map(|id| self.edge(id))
    }

    /// Returns edges whose endpoints both exist, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edge_order
            .iter()
            .filter_map(|id| self.edge_index.get(id))
            .filter_map(|index| self.graph.edge_weight(*index))
    }

    /// Returns edges with a missing endpoint, in insertion order.
    pub fn dangling_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edge_order.iter().filter_map(|id| self.dangling.get(id))
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph, including dangling ones.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_order.len()
    }

    /// Returns true if the graph has no nodes and no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node_order.is_empty() && self.edge_order.is_empty()
    }

    /// Returns the live edges leaving a node, in insertion order.
    #[must_use]
    pub fn outgoing(&self, node_id: &NodeId) -> Vec<&Edge> {
        self.edges().filter(|edge| &edge.source == node_id).collect()
    }

    /// Returns the live edges entering a node, in insertion order.
    #[must_use]
    pub fn incoming(&self, node_id: &NodeId) -> Vec<&Edge> {
        self.edges().filter(|edge| &edge.target == node_id).collect()
    }

    /// Returns the successors (downstream nodes) of a given node.
    #[must_use]
    pub fn successors(&self, node_id: &NodeId) -> Vec<(&Node, &Edge)> {
        self.outgoing(node_id)
            .into_iter()
            .filter_map(|edge| Some((self.node(&edge.target)?, edge)))
            .collect()
    }

    /// Returns the predecessors (upstream nodes) of a given node.
    #[must_use]
    pub fn predecessors(&self, node_id: &NodeId) -> Vec<(&Node, &Edge)> {
        self.incoming(node_id)
            .into_iter()
            .filter_map(|edge| Some((self.node(&edge.source)?, edge)))
            .collect()
    }

    /// Returns the start nodes (event and schedule triggers).
    #[must_use]
    pub fn start_nodes(&self) -> Vec<&Node> {
        self.nodes().filter(|node| node.kind().is_start()).collect()
    }

    /// Returns the end nodes.
    #[must_use]
    pub fn end_nodes(&self) -> Vec<&Node> {
        self.nodes().filter(|node| node.kind().is_end()).collect()
    }

    /// Returns every node reachable from some start node, starts included.
    #[must_use]
    pub fn reachable_from_starts(&self) -> HashSet<NodeId> {
        let mut reachable = HashSet::new();
        for start in self.start_nodes() {
            let Some(&index) = self.node_index.get(&start.id) else {
                continue;
            };
            let mut dfs = Dfs::new(&self.graph, index);
            while let Some(visited) = dfs.next(&self.graph) {
                if let Some(node) = self.graph.node_weight(visited) {
                    reachable.insert(node.id.clone());
                }
            }
        }
        reachable
    }

    /// Returns true if the live edges form a cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Returns the nodes reachable from a start node in dependency order.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle.
    pub fn execution_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let sorted =
            petgraph::algo::toposort(&self.graph, None).map_err(|_| GraphError::CycleDetected)?;
        let reachable = self.reachable_from_starts();
        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .map(|node| node.id.clone())
            .filter(|id| reachable.contains(id))
            .collect())
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for WorkflowGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes().eq(other.nodes()) && self.all_edges().eq(other.all_edges())
    }
}
