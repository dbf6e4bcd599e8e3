//! Workflow execution engine for nodeflow.
//!
//! This crate provides:
//!
//! - **Graph Model**: Directed graphs using petgraph with typed nodes, edges
//!   and data mappings
//! - **Execution**: Per-instance execution contexts, node state machines and
//!   domain events
//! - **Activities**: Pluggable executors resolved by activity type, plus a
//!   small set of builtins
//! - **Validation**: Structural checks run before a graph is executed
//! - **Engine**: Start, resume, cancel and inspect workflow instances
//! - **Storage**: Graph repository and execution context store seams with
//!   in-memory and file-backed implementations

pub mod activities;
pub mod activity;
pub mod condition;
pub mod config;
pub mod edge;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod execution;
pub mod graph;
pub mod node;
pub mod store;
pub mod validator;
pub mod value;

pub use activity::{
    ActivityContext, ActivityExecutor, ActivityOutput, ActivityRegistry, ExecutionResult,
};
pub use condition::{EdgeConditionEvaluator, TruthyConditionEvaluator};
pub use config::EngineConfig;
pub use edge::{Edge, EdgeId};
pub use engine::{DriveHandle, Outcome, WorkflowEngine};
pub use error::{ActivityError, EngineError, GraphError, StoreError};
pub use execution::{
    ExecutionContext, ExecutionEvent, ExecutionFailure, NodeExecutionContext, NodeStatus,
    WorkflowStatus,
};
pub use graph::WorkflowGraph;
pub use node::{InputMapping, Node, NodeCategory, NodeId, OutputMapping, Position};
pub use store::{
    ExecutionContextStore, FileContextStore, GraphRepository, InMemoryContextStore,
    InMemoryGraphRepository,
};
pub use validator::{ValidationCode, ValidationError, ValidationResult, WorkflowValidator};
pub use value::{DataMap, Value};
