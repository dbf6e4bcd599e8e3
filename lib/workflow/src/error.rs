//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: graph model consistency (unknown or duplicate ids)
//! - `ActivityError`: failures raised inside activity executors
//! - `StoreError`: collaborator persistence failures
//! - `EngineError`: engine operations (wraps lower errors via context)

use crate::edge::EdgeId;
use crate::node::NodeId;
use nodeflow_core::{GraphId, InstanceId};
use std::fmt;

/// Errors from graph operations.
///
/// These indicate a caller contract violation: something referenced an id
/// the graph does not contain. They are never silently ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// Edge with the given ID was not found in the graph.
    EdgeNotFound { edge_id: EdgeId },
    /// An edge references a node that does not exist.
    DanglingEdge { edge_id: EdgeId, node_id: NodeId },
    /// A node ID was used twice.
    DuplicateNode { node_id: NodeId },
    /// An edge ID was used twice.
    DuplicateEdge { edge_id: EdgeId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => {
                write!(f, "graph inconsistency: node not found: {node_id}")
            }
            Self::EdgeNotFound { edge_id } => {
                write!(f, "graph inconsistency: edge not found: {edge_id}")
            }
            Self::DanglingEdge { edge_id, node_id } => {
                write!(
                    f,
                    "graph inconsistency: edge {edge_id} references unknown node {node_id}"
                )
            }
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::DuplicateEdge { edge_id } => write!(f, "duplicate edge id: {edge_id}"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors raised by activity executors.
///
/// The engine never sees these directly: the shared failure wrapper turns
/// them into a `Failed` node result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityError {
    /// A property was found neither in the input nor in the static config.
    MissingProperty {
        property: String,
        activity_type: String,
    },
    /// A property was present but could not be coerced.
    TypeMismatch {
        property: String,
        expected: &'static str,
        actual: &'static str,
    },
    /// The activity itself failed.
    ExecutionFailed { message: String },
    /// The activity exceeded its time budget.
    Timeout { seconds: u64 },
    /// The activity panicked.
    Panicked { message: String },
    /// The activity observed cancellation and stopped.
    Cancelled,
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingProperty {
                property,
                activity_type,
            } => {
                write!(
                    f,
                    "missing property '{property}' for activity type '{activity_type}'"
                )
            }
            Self::TypeMismatch {
                property,
                expected,
                actual,
            } => {
                write!(f, "property '{property}' expected {expected}, got {actual}")
            }
            Self::ExecutionFailed { message } => write!(f, "activity failed: {message}"),
            Self::Timeout { seconds } => write!(f, "activity timed out after {seconds}s"),
            Self::Panicked { message } => write!(f, "activity panicked: {message}"),
            Self::Cancelled => write!(f, "activity cancelled"),
        }
    }
}

impl std::error::Error for ActivityError {}

/// Errors from graph repositories and execution context stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Reading from the backing store failed.
    ReadFailed { message: String },
    /// Writing to the backing store failed.
    WriteFailed { message: String },
    /// A stored document could not be encoded or decoded.
    Serialization { message: String },
    /// A stored document uses an envelope version this build cannot read.
    UnsupportedVersion { version: u32 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed { message } => write!(f, "store read failed: {message}"),
            Self::WriteFailed { message } => write!(f, "store write failed: {message}"),
            Self::Serialization { message } => {
                write!(f, "store serialization failed: {message}")
            }
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported stored document version: {version}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from engine operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The graph repository has no graph with this id.
    GraphNotFound { graph_id: GraphId },
    /// The graph repository failed (use as context wrapper).
    GraphLoad { graph_id: GraphId },
    /// The context store has no instance with this id.
    InstanceNotFound { instance_id: InstanceId },
    /// The instance's graph has no node with this id.
    NodeNotFound { node_id: NodeId },
    /// No registered executor claims the activity type. The instance has
    /// been marked failed and persisted.
    NoExecutorForType {
        instance_id: InstanceId,
        node_id: NodeId,
        activity_type: String,
    },
    /// The requested operation does not apply to the current state.
    InvalidStateTransition {
        entity: String,
        expected: String,
        actual: String,
    },
    /// The graph failed validation before start.
    InvalidGraph { graph_id: GraphId, errors: Vec<String> },
    /// Loading or saving state failed (use as context wrapper).
    Persistence { instance_id: InstanceId },
    /// A graph lookup failed mid-execution.
    Graph(GraphError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GraphNotFound { graph_id } => write!(f, "graph not found: {graph_id}"),
            Self::GraphLoad { graph_id } => write!(f, "failed to load graph {graph_id}"),
            Self::InstanceNotFound { instance_id } => {
                write!(f, "workflow instance not found: {instance_id}")
            }
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::NoExecutorForType {
                node_id,
                activity_type,
                ..
            } => {
                write!(
                    f,
                    "no executor registered for activity type '{activity_type}' (node {node_id})"
                )
            }
            Self::InvalidStateTransition {
                entity,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "invalid state transition for {entity}: expected {expected}, found {actual}"
                )
            }
            Self::InvalidGraph { graph_id, errors } => {
                write!(f, "graph {graph_id} is invalid: {}", errors.join("; "))
            }
            Self::Persistence { instance_id } => {
                write!(f, "persistence failed for instance {instance_id}")
            }
            Self::Graph(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_names_inconsistency() {
        let err = GraphError::NodeNotFound {
            node_id: NodeId::from("ghost"),
        };
        assert_eq!(err.to_string(), "graph inconsistency: node not found: ghost");
    }

    #[test]
    fn missing_property_names_property_and_type() {
        let err = ActivityError::MissingProperty {
            property: "url".to_string(),
            activity_type: "Http.Get".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("'url'"));
        assert!(text.contains("'Http.Get'"));
    }

    #[test]
    fn invalid_transition_names_expected_and_actual() {
        let err = EngineError::InvalidStateTransition {
            entity: "workflow".to_string(),
            expected: "suspended".to_string(),
            actual: "running".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition for workflow: expected suspended, found running"
        );
    }
}
