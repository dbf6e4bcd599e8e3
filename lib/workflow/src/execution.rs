//! Workflow execution state.
//!
//! An [`ExecutionContext`] is the mutable state of one run: global
//! variables, one [`NodeExecutionContext`] per graph node, the overall
//! status and the failure explanation. The engine is its only writer and
//! persists it after every transition.

use crate::error::EngineError;
use crate::graph::WorkflowGraph;
use crate::node::NodeId;
use crate::value::DataMap;
use chrono::{DateTime, Utc};
use nodeflow_core::{GraphId, InstanceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The overall status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Context allocated and persisted, drive loop not yet entered.
    NotStarted,
    Running,
    /// A node is waiting for an external `resume`.
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The execution status of a single node within an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    NotStarted,
    /// Dispatched; stays here while the workflow is suspended on this node.
    Running,
    Completed,
    Failed,
    /// Never became eligible (inactive edge or skipped predecessor).
    Skipped,
    Cancelled,
}

impl NodeStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an instance failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// The offending node, when the failure came from one.
    pub node_id: Option<NodeId>,
    pub message: String,
}

/// One timestamped line in a node's log trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Execution record for a single node within an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionContext {
    pub node_id: NodeId,
    pub activity_type: String,
    pub status: NodeStatus,
    pub input_data: DataMap,
    pub output_data: DataMap,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Append-only.
    pub logs: Vec<NodeLogEntry>,
}

impl NodeExecutionContext {
    /// Creates a record in the `NotStarted` state.
    #[must_use]
    pub fn new(node_id: NodeId, activity_type: impl Into<String>) -> Self {
        Self {
            node_id,
            activity_type: activity_type.into(),
            status: NodeStatus::NotStarted,
            input_data: DataMap::new(),
            output_data: DataMap::new(),
            started_at: None,
            completed_at: None,
            error: None,
            logs: Vec::new(),
        }
    }

    /// Appends a timestamped log line.
    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(NodeLogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// Marks the node as dispatched with the prepared input.
    pub fn start(&mut self, input: DataMap) {
        self.status = NodeStatus::Running;
        self.started_at = Some(Utc::now());
        self.input_data = input;
    }

    /// Merges output into `output_data`.
    pub fn merge_output(&mut self, output: DataMap) {
        self.output_data.extend(output);
    }

    /// Marks the node as completed, merging its output.
    pub fn complete(&mut self, output: DataMap) {
        self.merge_output(output);
        self.status = NodeStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Marks the node as failed. Keeps an error already set by the activity.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = NodeStatus::Failed;
        self.completed_at = Some(Utc::now());
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = NodeStatus::Skipped;
        self.completed_at = Some(Utc::now());
        self.log(reason);
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.status = NodeStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.log(reason);
    }
}

/// The mutable, persisted state of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub instance_id: InstanceId,
    pub graph_id: GraphId,
    pub status: WorkflowStatus,
    /// Global variables, seeded from the initial input.
    pub variables: DataMap,
    /// Exactly one entry per graph node.
    pub node_executions: BTreeMap<NodeId, NodeExecutionContext>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<ExecutionFailure>,
}

impl ExecutionContext {
    /// Allocates a context for `graph` with every node `NotStarted`.
    #[must_use]
    pub fn new(instance_id: InstanceId, graph: &WorkflowGraph, variables: DataMap) -> Self {
        let node_executions = graph
            .nodes()
            .map(|node| {
                (
                    node.id.clone(),
                    NodeExecutionContext::new(node.id.clone(), node.activity_type.clone()),
                )
            })
            .collect();
        Self {
            instance_id,
            graph_id: graph.id(),
            status: WorkflowStatus::NotStarted,
            variables,
            node_executions,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&NodeExecutionContext> {
        self.node_executions.get(node_id)
    }

    pub fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut NodeExecutionContext> {
        self.node_executions.get_mut(node_id)
    }

    /// Status of a node; unknown ids read as `NotStarted`.
    #[must_use]
    pub fn node_status(&self, node_id: &NodeId) -> NodeStatus {
        self.node(node_id)
            .map_or(NodeStatus::NotStarted, |n| n.status)
    }

    /// Ids of nodes currently in `status`, in id order.
    pub fn nodes_with_status(&self, status: NodeStatus) -> impl Iterator<Item = &NodeId> {
        self.node_executions
            .values()
            .filter(move |n| n.status == status)
            .map(|n| &n.node_id)
    }

    /// Fails with `InvalidStateTransition` unless the workflow is in `expected`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidStateTransition` naming both states.
    pub fn require_status(&self, expected: WorkflowStatus) -> Result<(), EngineError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidStateTransition {
                entity: format!("workflow {}", self.instance_id),
                expected: expected.to_string(),
                actual: self.status.to_string(),
            })
        }
    }

    /// Transitions to `Running`; the first call records `started_at`.
    pub fn mark_running(&mut self) {
        self.status = WorkflowStatus::Running;
        self.started_at.get_or_insert_with(Utc::now);
    }

    pub fn mark_suspended(&mut self) {
        self.status = WorkflowStatus::Suspended;
    }

    pub fn mark_completed(&mut self) {
        self.status = WorkflowStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, node_id: Option<NodeId>, message: impl Into<String>) {
        self.status = WorkflowStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(ExecutionFailure {
            node_id,
            message: message.into(),
        });
    }

    pub fn mark_cancelled(&mut self) {
        self.status = WorkflowStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

/// Domain events produced by engine operations.
///
/// The engine never publishes these itself; they are returned to the caller
/// in an `Outcome` in the order they happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    WorkflowCreated {
        instance_id: InstanceId,
        graph_id: GraphId,
        timestamp: DateTime<Utc>,
    },
    WorkflowStarted {
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        instance_id: InstanceId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        instance_id: InstanceId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        instance_id: InstanceId,
        node_id: NodeId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    NodeSkipped {
        instance_id: InstanceId,
        node_id: NodeId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    NodeCancelled {
        instance_id: InstanceId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    WorkflowSuspended {
        instance_id: InstanceId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    WorkflowResumed {
        instance_id: InstanceId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
    },
    WorkflowFailed {
        instance_id: InstanceId,
        node_id: Option<NodeId>,
        error: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowCancelled {
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Returns the instance this event belongs to.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        match self {
            Self::WorkflowCreated { instance_id, .. }
            | Self::WorkflowStarted { instance_id, .. }
            | Self::NodeStarted { instance_id, .. }
            | Self::NodeCompleted { instance_id, .. }
            | Self::NodeFailed { instance_id, .. }
            | Self::NodeSkipped { instance_id, .. }
            | Self::NodeCancelled { instance_id, .. }
            | Self::WorkflowSuspended { instance_id, .. }
            | Self::WorkflowResumed { instance_id, .. }
            | Self::WorkflowCompleted { instance_id, .. }
            | Self::WorkflowFailed { instance_id, .. }
            | Self::WorkflowCancelled { instance_id, .. } => *instance_id,
        }
    }

    /// Returns the timestamp of this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::WorkflowCreated { timestamp, .. }
            | Self::WorkflowStarted { timestamp, .. }
            | Self::NodeStarted { timestamp, .. }
            | Self::NodeCompleted { timestamp, .. }
            | Self::NodeFailed { timestamp, .. }
            | Self::NodeSkipped { timestamp, .. }
            | Self::NodeCancelled { timestamp, .. }
            | Self::WorkflowSuspended { timestamp, .. }
            | Self::WorkflowResumed { timestamp, .. }
            | Self::WorkflowCompleted { timestamp, .. }
            | Self::WorkflowFailed { timestamp, .. }
            | Self::WorkflowCancelled { timestamp, .. } => *timestamp,
        }
    }

    /// The node this event concerns, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::NodeSkipped { node_id, .. }
            | Self::NodeCancelled { node_id, .. }
            | Self::WorkflowSuspended { node_id, .. }
            | Self::WorkflowResumed { node_id, .. } => Some(node_id),
            Self::WorkflowFailed { node_id, .. } => node_id.as_ref(),
            Self::WorkflowCreated { .. }
            | Self::WorkflowStarted { .. }
            | Self::WorkflowCompleted { .. }
            | Self::WorkflowCancelled { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::node::Node;
    use crate::value::Value;

    fn graph() -> WorkflowGraph {
        WorkflowGraph::from_parts(
            GraphId::new(),
            "g",
            [Node::new("t", "Trigger.Manual"), Node::new("a", "Data.Transform")],
            [Edge::between("t", "a")],
        )
        .unwrap()
    }

    #[test]
    fn new_context_has_one_not_started_entry_per_node() {
        let graph = graph();
        let ctx = ExecutionContext::new(InstanceId::new(), &graph, DataMap::new());

        assert_eq!(ctx.status, WorkflowStatus::NotStarted);
        assert_eq!(ctx.graph_id, graph.id());
        assert_eq!(ctx.node_executions.len(), graph.node_count());
        assert!(ctx
            .node_executions
            .values()
            .all(|n| n.status == NodeStatus::NotStarted));
        assert_eq!(ctx.node(&NodeId::from("a")).unwrap().activity_type, "Data.Transform");
    }

    #[test]
    fn terminal_states() {
        assert!(!WorkflowStatus::Suspended.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
    }

    #[test]
    fn require_status_names_both_states() {
        let ctx = ExecutionContext::new(InstanceId::new(), &graph(), DataMap::new());
        let err = ctx.require_status(WorkflowStatus::Suspended).unwrap_err();
        match err {
            EngineError::InvalidStateTransition {
                expected, actual, ..
            } => {
                assert_eq!(expected, "suspended");
                assert_eq!(actual, "not_started");
            }
            other => panic!("expected InvalidStateTransition, got {other:?}"),
        }
    }

    #[test]
    fn mark_running_keeps_first_start_time() {
        let mut ctx = ExecutionContext::new(InstanceId::new(), &graph(), DataMap::new());
        ctx.mark_running();
        let first = ctx.started_at;
        ctx.mark_suspended();
        ctx.mark_running();
        assert_eq!(ctx.started_at, first);
    }

    #[test]
    fn node_lifecycle_merges_output_and_keeps_activity_error() {
        let mut node = NodeExecutionContext::new(NodeId::from("a"), "Data.Transform");
        let mut input = DataMap::new();
        input.insert("x".to_string(), Value::from(1));
        node.start(input);
        assert_eq!(node.status, NodeStatus::Running);
        assert!(node.started_at.is_some());

        let mut out = DataMap::new();
        out.insert("y".to_string(), Value::from(2));
        node.merge_output(out.clone());
        node.complete(out);
        assert_eq!(node.status, NodeStatus::Completed);
        assert_eq!(node.output_data.len(), 1);

        let mut failed = NodeExecutionContext::new(NodeId::from("b"), "X.Y");
        failed.error = Some("from activity".to_string());
        failed.fail("generic");
        assert_eq!(failed.error.as_deref(), Some("from activity"));
    }

    #[test]
    fn event_accessors() {
        let instance_id = InstanceId::new();
        let event = ExecutionEvent::NodeFailed {
            instance_id,
            node_id: NodeId::from("a"),
            error: "boom".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.instance_id(), instance_id);
        assert_eq!(event.node_id(), Some(&NodeId::from("a")));

        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "node_failed");
    }
}
