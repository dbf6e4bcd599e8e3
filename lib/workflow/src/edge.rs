//! Edge types for workflow graphs.
//!
//! An edge is a directed connection from a source node to a target node.
//! It may carry a condition; the edge is active iff the condition is absent
//! or evaluates true.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an edge within a graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EdgeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Boolean expression evaluated by an `EdgeConditionEvaluator`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Edge {
    /// Creates an unconditional edge.
    #[must_use]
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    /// Creates an edge with id `"<source>-><target>"`.
    #[must_use]
    pub fn between(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self::new(format!("{source}->{target}"), source, target)
    }

    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}
