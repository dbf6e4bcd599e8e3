//! Workflow graph implementation using petgraph.
//!
//! Workflows are directed graphs where:
//! - Nodes are workflow steps resolved to activity executors
//! - Edges carry control flow (and, via input mappings, data flow)
//!
//! The graph is read-only during execution. Every edge endpoint is checked
//! when the graph is built or deserialized, so a `WorkflowGraph` value never
//! holds a dangling edge.

use crate::edge::{Edge, EdgeId};
use crate::error::GraphError;
use crate::node::{Node, NodeId};
use nodeflow_core::GraphId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A workflow graph using petgraph's directed graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct WorkflowGraph {
    id: GraphId,
    name: String,
    graph: DiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
    edge_index_map: HashMap<EdgeId, EdgeIndex>,
}

impl WorkflowGraph {
    /// Creates a new empty graph with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(GraphId::new(), name)
    }

    /// Creates a new empty graph with a specific id.
    #[must_use]
    pub fn with_id(id: GraphId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            graph: DiGraph::new(),
            node_index_map: HashMap::new(),
            edge_index_map: HashMap::new(),
        }
    }

    /// Builds a graph from node and edge lists, checking every invariant.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate ids or an edge naming an unknown node.
    pub fn from_parts(
        id: GraphId,
        name: impl Into<String>,
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::with_id(id, name);
        for node in nodes {
            graph.add_node(node)?;
        }
        for edge in edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    #[must_use]
    pub fn id(&self) -> GraphId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a node to the graph.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNode` if a node with the same id exists.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.node_index_map.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode { node_id: node.id });
        }
        let node_id = node.id.clone();
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        Ok(())
    }

    /// Adds an edge between two existing nodes.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEdge` if the edge id is taken, or `DanglingEdge` if
    /// either endpoint is not in the graph.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if self.edge_index_map.contains_key(&edge.id) {
            return Err(GraphError::DuplicateEdge { edge_id: edge.id });
        }
        let source = self.endpoint(&edge, &edge.source)?;
        let target = self.endpoint(&edge, &edge.target)?;
        let edge_id = edge.id.clone();
        let index = self.graph.add_edge(source, target, edge);
        self.edge_index_map.insert(edge_id, index);
        Ok(())
    }

    fn endpoint(&self, edge: &Edge, node_id: &NodeId) -> Result<NodeIndex, GraphError> {
        self.node_index_map
            .get(node_id)
            .copied()
            .ok_or_else(|| GraphError::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: node_id.clone(),
            })
    }

    /// Returns a node by id, or `None`.
    #[must_use]
    pub fn get_node(&self, node_id: &NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns a node by id.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the id is not in the graph.
    pub fn node(&self, node_id: &NodeId) -> Result<&Node, GraphError> {
        self.get_node(node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })
    }

    /// Returns an edge by id.
    ///
    /// # Errors
    ///
    /// Returns `EdgeNotFound` if the id is not in the graph.
    pub fn edge(&self, edge_id: &EdgeId) -> Result<&Edge, GraphError> {
        self.edge_index_map
            .get(edge_id)
            .and_then(|index| self.graph.edge_weight(*index))
            .ok_or_else(|| GraphError::EdgeNotFound {
                edge_id: edge_id.clone(),
            })
    }

    /// Returns all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns all edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edge_weights()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns nodes that have no incoming edges, in insertion order.
    pub fn start_nodes(&self) -> Vec<&Node> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .edges_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Returns nodes in the trigger category, in insertion order.
    pub fn trigger_nodes(&self) -> Vec<&Node> {
        self.nodes().filter(|n| n.is_trigger()).collect()
    }

    /// Returns the edges leaving `node_id`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the id is not in the graph.
    pub fn outgoing_edges(&self, node_id: &NodeId) -> Result<Vec<&Edge>, GraphError> {
        self.edges_in_direction(node_id, Direction::Outgoing)
    }

    /// Returns the edges entering `node_id`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the id is not in the graph.
    pub fn incoming_edges(&self, node_id: &NodeId) -> Result<Vec<&Edge>, GraphError> {
        self.edges_in_direction(node_id, Direction::Incoming)
    }

    fn edges_in_direction(
        &self,
        node_id: &NodeId,
        direction: Direction,
    ) -> Result<Vec<&Edge>, GraphError> {
        let index = self
            .node_index_map
            .get(node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })?;
        // petgraph walks adjacency lists newest-first; edge indices follow insertion.
        let mut edges: Vec<_> = self.graph.edges_directed(*index, direction).collect();
        edges.sort_by_key(|e| e.id());
        Ok(edges.into_iter().map(|e| e.weight()).collect())
    }
}

/// Serialized form of a graph: flat node and edge lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphDocument {
    #[serde(default)]
    id: GraphId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

impl TryFrom<GraphDocument> for WorkflowGraph {
    type Error = GraphError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        Self::from_parts(doc.id, doc.name, doc.nodes, doc.edges)
    }
}

impl From<WorkflowGraph> for GraphDocument {
    fn from(graph: WorkflowGraph) -> Self {
        let (nodes, edges) = graph.graph.into_nodes_edges();
        Self {
            id: graph.id,
            name: graph.name,
            nodes: nodes.into_iter().map(|n| n.weight).collect(),
            edges: edges.into_iter().map(|e| e.weight).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> WorkflowGraph {
        WorkflowGraph::from_parts(
            GraphId::new(),
            "chain",
            [
                Node::new("start", "Trigger.Manual"),
                Node::new("a", "Data.Transform"),
                Node::new("b", "Data.Transform"),
                Node::new("join", "Data.Transform"),
            ],
            [
                Edge::new("e1", "start", "a"),
                Edge::new("e2", "start", "b"),
                Edge::new("e3", "a", "join"),
                Edge::new("e4", "b", "join"),
            ],
        )
        .unwrap()
    }

    fn ids(edges: &[&Edge]) -> Vec<String> {
        edges.iter().map(|e| e.id.to_string()).collect()
    }

    #[test]
    fn start_nodes_have_no_incoming_edges() {
        let graph = chain();
        let starts: Vec<_> = graph.start_nodes().iter().map(|n| n.id.clone()).collect();
        assert_eq!(starts, vec![NodeId::from("start")]);
    }

    #[test]
    fn edge_accessors_keep_insertion_order() {
        let graph = chain();
        let out = graph.outgoing_edges(&NodeId::from("start")).unwrap();
        assert_eq!(ids(&out), vec!["e1", "e2"]);
        let inc = graph.incoming_edges(&NodeId::from("join")).unwrap();
        assert_eq!(ids(&inc), vec!["e3", "e4"]);
    }

    #[test]
    fn unknown_node_is_a_graph_inconsistency() {
        let graph = chain();
        let err = graph.outgoing_edges(&NodeId::from("ghost")).unwrap_err();
        assert_eq!(
            err,
            GraphError::NodeNotFound {
                node_id: NodeId::from("ghost")
            }
        );
        assert!(graph.node(&NodeId::from("ghost")).is_err());
    }

    #[test]
    fn add_edge_rejects_dangling_endpoint() {
        let mut graph = WorkflowGraph::new("g");
        graph.add_node(Node::new("a", "Trigger.Manual")).unwrap();
        let err = graph.add_edge(Edge::new("e", "a", "missing")).unwrap_err();
        match err {
            GraphError::DanglingEdge { node_id, .. } => assert_eq!(node_id.as_str(), "missing"),
            other => panic!("expected DanglingEdge, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut graph = chain();
        assert!(matches!(
            graph.add_node(Node::new("a", "X.Y")),
            Err(GraphError::DuplicateNode { .. })
        ));
        assert!(matches!(
            graph.add_edge(Edge::new("e1", "a", "b")),
            Err(GraphError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn deserialization_checks_edge_endpoints() {
        let json = serde_json::json!({
            "name": "broken",
            "nodes": [{"id": "a", "activityType": "Trigger.Manual"}],
            "edges": [{"id": "e", "source": "a", "target": "nowhere"}]
        });
        assert!(serde_json::from_value::<WorkflowGraph>(json).is_err());
    }

    #[test]
    fn serialized_graph_reloads_with_same_shape() {
        let graph = chain();
        let json = serde_json::to_string(&graph).expect("serialize");
        let parsed: WorkflowGraph = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed.id(), graph.id());
        assert_eq!(parsed.node_count(), 4);
        assert_eq!(parsed.edge_count(), 4);
        let inc = parsed.incoming_edges(&NodeId::from("join")).unwrap();
        assert_eq!(ids(&inc), vec!["e3", "e4"]);
        assert_eq!(parsed.edge(&EdgeId::from("e2")).unwrap().target.as_str(), "b");
    }
}
