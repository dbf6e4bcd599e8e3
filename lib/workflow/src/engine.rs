//! The workflow engine.
//!
//! The engine owns every mutation of an [`ExecutionContext`]. For each
//! instance it runs a single drive loop:
//! 1. Pick candidates: the start nodes, or the successors of the node that
//!    just completed
//! 2. Run a candidate only if every incoming edge is active and its source
//!    is `Completed` (AND join)
//! 3. Dispatch to the matching activity executor and apply the result,
//!    descending depth-first into the successors of completed nodes
//! 4. When the frontier is exhausted, re-scan the graph for nodes that have
//!    become eligible, then finalize
//!
//! The first failure fails the whole instance. A suspension stops the loop
//! until [`WorkflowEngine::resume`] is called. The context is persisted
//! after every transition.

use crate::activity::{ActivityContext, ActivityRegistry, ExecutionResult, execute_guarded};
use crate::condition::{EdgeConditionEvaluator, TruthyConditionEvaluator};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::execution::{ExecutionContext, ExecutionEvent, NodeStatus, WorkflowStatus};
use crate::graph::WorkflowGraph;
use crate::node::{Node, NodeId};
use crate::store::{ExecutionContextStore, GraphRepository};
use crate::value::{DataMap, lookup_ci};
use chrono::{DateTime, Utc};
use nodeflow_core::{GraphId, InstanceId};
use rootcause::prelude::Report;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// The value of an engine call plus the domain events it produced, in order.
///
/// Publishing the events is the caller's job.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<ExecutionEvent>,
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn new(value: T, events: Vec<ExecutionEvent>) -> Self {
        Self { value, events }
    }
}

/// Handle to a drive loop running on its own task.
pub type DriveHandle = JoinHandle<Result<Outcome<()>, Report<EngineError>>>;

/// Per-instance coordination between a drive loop and `cancel`.
///
/// `cancel` triggers the token before taking the lock, and the drive loop
/// checks the token while holding the lock, so no drive-loop write can land
/// after a cancellation has been persisted.
#[derive(Debug, Default)]
struct InstanceGuard {
    token: CancellationToken,
    write_lock: tokio::sync::Mutex<()>,
}

/// Where the drive loop picks its first candidates from.
enum Entry {
    Start,
    After(NodeId),
}

/// What happened to one dispatched node.
enum Step {
    /// The node completed; descend into its successors.
    Continue,
    /// The instance failed, suspended or was cancelled; stop the loop.
    Halt,
}

/// In-flight state of one drive.
struct Run {
    graph: Arc<WorkflowGraph>,
    ctx: ExecutionContext,
    guard: Arc<InstanceGuard>,
    events: Vec<ExecutionEvent>,
}

impl Run {
    fn record(&mut self, event: impl FnOnce(InstanceId, DateTime<Utc>) -> ExecutionEvent) {
        self.events.push(event(self.ctx.instance_id, Utc::now()));
    }

    fn instance_id(&self) -> InstanceId {
        self.ctx.instance_id
    }

    fn cancelled(&self) -> bool {
        self.guard.token.is_cancelled()
    }
}

/// Executes workflow graphs.
pub struct WorkflowEngine<G: GraphRepository, S: ExecutionContextStore> {
    graphs: G,
    store: S,
    registry: Arc<ActivityRegistry>,
    conditions: Arc<dyn EdgeConditionEvaluator>,
    validator: crate::validator::WorkflowValidator,
    config: EngineConfig,
    active: Mutex<HashMap<InstanceId, Arc<InstanceGuard>>>,
}

impl<G: GraphRepository, S: ExecutionContextStore> WorkflowEngine<G, S> {
    /// Creates an engine with default configuration and validation.
    pub fn new(graphs: G, store: S, registry: ActivityRegistry) -> Self {
        Self {
            graphs,
            store,
            registry: Arc::new(registry),
            conditions: Arc::new(TruthyConditionEvaluator),
            validator: crate::validator::WorkflowValidator::new(),
            config: EngineConfig::default(),
            active: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: crate::validator::WorkflowValidator) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_condition_evaluator(
        mut self,
        evaluator: impl EdgeConditionEvaluator + 'static,
    ) -> Self {
        self.conditions = Arc::new(evaluator);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Starts a new instance of `graph_id` and drives it until it completes,
    /// fails or suspends.
    ///
    /// Progress is persisted after every step, so the returned id always
    /// names a recoverable instance.
    ///
    /// # Errors
    ///
    /// Returns `GraphNotFound`, `InvalidGraph` (when validating on start),
    /// `NoExecutorForType`, or a persistence failure.
    #[instrument(skip(self, variables), fields(graph_id = %graph_id))]
    pub async fn start(
        &self,
        graph_id: GraphId,
        variables: DataMap,
    ) -> Result<Outcome<InstanceId>, Report<EngineError>> {
        let run = self.create(graph_id, variables).await?;
        let instance_id = run.instance_id();
        let outcome = self.run_to_quiescence(run, Entry::Start).await?;
        Ok(Outcome::new(instance_id, outcome.events))
    }

    /// Allocates and persists a new instance, then drives it on a spawned task.
    ///
    /// The returned outcome carries the creation events; the handle resolves
    /// to the events of the drive itself.
    ///
    /// # Errors
    ///
    /// Returns `GraphNotFound`, `InvalidGraph`, or a persistence failure.
    #[instrument(skip(self, variables), fields(graph_id = %graph_id))]
    pub async fn start_detached(
        self: &Arc<Self>,
        graph_id: GraphId,
        variables: DataMap,
    ) -> Result<Outcome<(InstanceId, DriveHandle)>, Report<EngineError>>
    where
        G: 'static,
        S: 'static,
    {
        let mut run = self.create(graph_id, variables).await?;
        let instance_id = run.instance_id();
        let created = std::mem::take(&mut run.events);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run_to_quiescence(run, Entry::Start).await });
        Ok(Outcome::new((instance_id, handle), created))
    }

    /// Completes a suspended node with `output` and continues the instance.
    ///
    /// The instance is claimed exclusively before its state is read, so
    /// concurrent calls for one instance cannot both resume it.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound`, `NodeNotFound`, `InvalidStateTransition`
    /// when the workflow is not suspended, the node is not running or another
    /// call is driving the instance, or any error the continued drive loop
    /// raises.
    #[instrument(skip(self, output), fields(instance_id = %instance_id, node_id = %node_id))]
    pub async fn resume(
        &self,
        instance_id: InstanceId,
        node_id: NodeId,
        output: Option<DataMap>,
    ) -> Result<Outcome<()>, Report<EngineError>> {
        let guard = self.claim(instance_id)?;
        let run = match self.prepare_resume(instance_id, &node_id, output, guard).await {
            Ok(run) => run,
            Err(report) => {
                self.release(instance_id);
                return Err(report);
            }
        };
        info!("workflow resumed");
        match self.persist(&run).await {
            Ok(true) => {}
            Ok(false) => {
                self.release(instance_id);
                return Ok(Outcome::new((), run.events));
            }
            Err(report) => {
                self.release(instance_id);
                return Err(report);
            }
        }

        self.run_to_quiescence(run, Entry::After(node_id)).await
    }

    /// Checks the resume preconditions and completes the suspended node.
    async fn prepare_resume(
        &self,
        instance_id: InstanceId,
        node_id: &NodeId,
        output: Option<DataMap>,
        guard: Arc<InstanceGuard>,
    ) -> Result<Run, Report<EngineError>> {
        let ctx = self.load_context(instance_id).await?;
        ctx.require_status(WorkflowStatus::Suspended)?;
        let graph = self.load_graph(ctx.graph_id).await?;
        let node = graph.node(node_id).map_err(|_| EngineError::NodeNotFound {
            node_id: node_id.clone(),
        })?;

        let status = ctx.node_status(node_id);
        if status != NodeStatus::Running {
            return Err(EngineError::InvalidStateTransition {
                entity: format!("node {node_id}"),
                expected: NodeStatus::Running.to_string(),
                actual: status.to_string(),
            }
            .into());
        }

        let mut run = Run {
            graph: Arc::clone(&graph),
            ctx,
            guard,
            events: Vec::new(),
        };
        run.ctx.mark_running();
        run.record(|instance_id, timestamp| ExecutionEvent::WorkflowResumed {
            instance_id,
            node_id: node_id.clone(),
            timestamp,
        });
        self.complete_node(&mut run, node, output.unwrap_or_default())?;
        Ok(run)
    }

    /// Cancels an instance that has not reached a terminal state.
    ///
    /// Running nodes are marked `Cancelled`. A drive loop in progress observes
    /// the cancellation token and stops; executors see the same token. An
    /// idle instance is claimed for the duration of the call.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound`, `InvalidStateTransition` if the instance
    /// is already terminal, or a persistence failure.
    #[instrument(skip(self), fields(instance_id = %instance_id))]
    pub async fn cancel(&self, instance_id: InstanceId) -> Result<Outcome<()>, Report<EngineError>> {
        let (guard, claimed) = {
            let mut active = self.lock_active();
            match active.get(&instance_id) {
                Some(driving) => (Arc::clone(driving), false),
                None => {
                    let guard = Arc::new(InstanceGuard::default());
                    active.insert(instance_id, Arc::clone(&guard));
                    (guard, true)
                }
            }
        };
        guard.token.cancel();

        let result = {
            let _write = guard.write_lock.lock().await;
            self.cancel_locked(instance_id).await
        };
        if claimed {
            self.release(instance_id);
        }
        result
    }

    async fn cancel_locked(
        &self,
        instance_id: InstanceId,
    ) -> Result<Outcome<()>, Report<EngineError>> {
        let mut ctx = self.load_context(instance_id).await?;
        if ctx.status.is_terminal() {
            return Err(EngineError::InvalidStateTransition {
                entity: format!("workflow {instance_id}"),
                expected: "a non-terminal status".to_string(),
                actual: ctx.status.to_string(),
            }
            .into());
        }

        let mut events = Vec::new();
        let running: Vec<NodeId> = ctx.nodes_with_status(NodeStatus::Running).cloned().collect();
        for node_id in running {
            if let Some(node) = ctx.node_mut(&node_id) {
                node.cancel("cancelled by request");
            }
            events.push(ExecutionEvent::NodeCancelled {
                instance_id,
                node_id,
                timestamp: Utc::now(),
            });
        }
        ctx.mark_cancelled();
        events.push(ExecutionEvent::WorkflowCancelled {
            instance_id,
            timestamp: Utc::now(),
        });

        self.store
            .save(&ctx)
            .await
            .map_err(|report| report.context(EngineError::Persistence { instance_id }))?;
        info!("workflow cancelled");
        Ok(Outcome::new((), events))
    }

    /// Returns a snapshot of the instance's execution context.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` or a persistence failure.
    pub async fn get_state(
        &self,
        instance_id: InstanceId,
    ) -> Result<ExecutionContext, Report<EngineError>> {
        self.load_context(instance_id).await
    }

    async fn load_context(
        &self,
        instance_id: InstanceId,
    ) -> Result<ExecutionContext, Report<EngineError>> {
        let loaded = self
            .store
            .load(instance_id)
            .await
            .map_err(|report| report.context(EngineError::Persistence { instance_id }))?;
        Ok(loaded.ok_or(EngineError::InstanceNotFound { instance_id })?)
    }

    async fn load_graph(&self, graph_id: GraphId) -> Result<Arc<WorkflowGraph>, Report<EngineError>> {
        let loaded = self
            .graphs
            .get_graph(graph_id)
            .await
            .map_err(|report| report.context(EngineError::GraphLoad { graph_id }))?;
        Ok(loaded.ok_or(EngineError::GraphNotFound { graph_id })?)
    }

    /// Loads and validates the graph, then allocates and persists a context.
    async fn create(
        &self,
        graph_id: GraphId,
        variables: DataMap,
    ) -> Result<Run, Report<EngineError>> {
        let graph = self.load_graph(graph_id).await?;

        if self.config.validate_on_start {
            let result = self.validator.validate(&graph);
            if !result.is_valid {
                let errors: Vec<String> = result.fatal().map(ToString::to_string).collect();
                warn!(%graph_id, ?errors, "graph failed validation");
                return Err(EngineError::InvalidGraph { graph_id, errors }.into());
            }
        }

        let instance_id = InstanceId::new();
        let mut run = Run {
            ctx: ExecutionContext::new(instance_id, &graph, variables),
            graph,
            guard: self.claim(instance_id)?,
            events: Vec::new(),
        };
        run.record(|instance_id, timestamp| ExecutionEvent::WorkflowCreated {
            instance_id,
            graph_id,
            timestamp,
        });
        if let Err(report) = self.persist(&run).await {
            self.release(instance_id);
            return Err(report);
        }
        info!(%instance_id, "workflow instance created");
        Ok(run)
    }

    async fn run_to_quiescence(
        &self,
        mut run: Run,
        entry: Entry,
    ) -> Result<Outcome<()>, Report<EngineError>> {
        let instance_id = run.instance_id();
        let result = self.drive(&mut run, entry).await;
        self.release(instance_id);
        result.map(|()| Outcome::new((), run.events))
    }

    /// The drive loop. Returns once the instance is quiescent.
    async fn drive(&self, run: &mut Run, entry: Entry) -> Result<(), Report<EngineError>> {
        let graph = Arc::clone(&run.graph);

        let first_frame: VecDeque<NodeId> = match entry {
            Entry::Start => {
                run.ctx.mark_running();
                run.record(|instance_id, timestamp| ExecutionEvent::WorkflowStarted {
                    instance_id,
                    timestamp,
                });
                info!(instance_id = %run.instance_id(), "workflow started");
                if !self.persist(run).await? {
                    return Ok(());
                }
                graph.start_nodes().into_iter().map(|n| n.id.clone()).collect()
            }
            Entry::After(node_id) => successors(&graph, &node_id)?,
        };

        let mut frames = vec![first_frame];
        loop {
            while let Some(frame) = frames.last_mut() {
                let Some(candidate) = frame.pop_front() else {
                    frames.pop();
                    continue;
                };
                if !self.is_eligible(&graph, &run.ctx, &candidate)? {
                    continue;
                }
                match self.execute_node(run, &candidate).await? {
                    Step::Continue => frames.push(successors(&graph, &candidate)?),
                    Step::Halt => return Ok(()),
                }
            }

            let mut ready = None;
            for node in graph.nodes() {
                if self.is_eligible(&graph, &run.ctx, &node.id)? {
                    ready = Some(node.id.clone());
                    break;
                }
            }
            match ready {
                Some(node_id) => {
                    debug!(%node_id, "re-scan found eligible node");
                    frames.push(VecDeque::from([node_id]));
                }
                None => break,
            }
        }

        self.finalize(run).await
    }

    /// A node is eligible when it has not started, and every incoming edge
    /// is active with a `Completed` source.
    fn is_eligible(
        &self,
        graph: &WorkflowGraph,
        ctx: &ExecutionContext,
        node_id: &NodeId,
    ) -> Result<bool, Report<EngineError>> {
        if ctx.node_status(node_id) != NodeStatus::NotStarted {
            return Ok(false);
        }
        for edge in graph.incoming_edges(node_id).map_err(EngineError::from)? {
            let Some(source) = ctx.node(&edge.source) else {
                return Ok(false);
            };
            if source.status != NodeStatus::Completed {
                return Ok(false);
            }
            if let Some(condition) = &edge.condition
                && !self
                    .conditions
                    .evaluate(condition, &source.output_data, &ctx.variables)
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn execute_node(
        &self,
        run: &mut Run,
        node_id: &NodeId,
    ) -> Result<Step, Report<EngineError>> {
        let graph = Arc::clone(&run.graph);
        let node = graph.node(node_id).map_err(EngineError::from)?;
        if run.cancelled() {
            return Ok(Step::Halt);
        }

        let Some(executor) = self.registry.get_executor(&node.activity_type) else {
            return Err(self.fail_missing_executor(run, node).await);
        };

        let input = prepare_input(&graph, &run.ctx, node)?;
        node_context(&mut run.ctx, node_id)?.start(input.clone());
        run.record(|instance_id, timestamp| ExecutionEvent::NodeStarted {
            instance_id,
            node_id: node_id.clone(),
            timestamp,
        });
        debug!(%node_id, activity_type = %node.activity_type, "dispatching node");
        if !self.persist(run).await? {
            return Ok(Step::Halt);
        }

        let output = {
            let Run { ctx, guard, .. } = &mut *run;
            let instance_id = ctx.instance_id;
            let ExecutionContext {
                variables,
                node_executions,
                ..
            } = ctx;
            let node_ctx = node_executions
                .get_mut(node_id)
                .ok_or_else(|| EngineError::NodeNotFound {
                    node_id: node_id.clone(),
                })?;
            let mut activity = ActivityContext {
                instance_id,
                node_id,
                activity_type: &node.activity_type,
                properties: &node.activity_properties,
                input: &input,
                variables,
                node: node_ctx,
                cancellation: &guard.token,
            };
            execute_guarded(executor.as_ref(), &mut activity, self.config.activity_timeout()).await
        };

        if run.cancelled() {
            debug!(%node_id, "instance cancelled while node was running");
            return Ok(Step::Halt);
        }

        match output.result {
            ExecutionResult::Completed => {
                self.complete_node(run, node, output.output)?;
                Ok(if self.persist(run).await? {
                    Step::Continue
                } else {
                    Step::Halt
                })
            }
            ExecutionResult::Failed => {
                let node_ctx = node_context(&mut run.ctx, node_id)?;
                let message = output
                    .error_message()
                    .map(str::to_string)
                    .or_else(|| node_ctx.error.clone())
                    .unwrap_or_else(|| "activity reported failure".to_string());
                if node_ctx.error.is_none() {
                    node_ctx.log(format!("error: {message}"));
                }
                node_ctx.merge_output(output.output);
                node_ctx.fail(message.clone());
                self.fail_instance(run, node_id, message);
                self.persist(run).await?;
                Ok(Step::Halt)
            }
            ExecutionResult::Suspended => {
                node_context(&mut run.ctx, node_id)?.merge_output(output.output);
                run.ctx.mark_suspended();
                run.record(|instance_id, timestamp| ExecutionEvent::WorkflowSuspended {
                    instance_id,
                    node_id: node_id.clone(),
                    timestamp,
                });
                info!(instance_id = %run.instance_id(), %node_id, "workflow suspended");
                self.persist(run).await?;
                Ok(Step::Halt)
            }
        }
    }

    /// Marks a node completed and publishes its output mappings.
    fn complete_node(
        &self,
        run: &mut Run,
        node: &Node,
        output: DataMap,
    ) -> Result<(), Report<EngineError>> {
        let node_ctx = node_context(&mut run.ctx, &node.id)?;
        node_ctx.complete(output);
        let published: Vec<(String, crate::value::Value)> = node
            .output_mappings
            .iter()
            .filter_map(|m| {
                lookup_ci(&node_ctx.output_data, &m.source_property)
                    .map(|v| (m.target_variable.clone(), v.clone()))
            })
            .collect();
        run.ctx.variables.extend(published);
        run.record(|instance_id, timestamp| ExecutionEvent::NodeCompleted {
            instance_id,
            node_id: node.id.clone(),
            timestamp,
        });
        debug!(node_id = %node.id, "node completed");
        Ok(())
    }

    fn fail_instance(&self, run: &mut Run, node_id: &NodeId, message: String) {
        warn!(instance_id = %run.instance_id(), %node_id, error = %message, "node failed");
        run.record(|instance_id, timestamp| ExecutionEvent::NodeFailed {
            instance_id,
            node_id: node_id.clone(),
            error: message.clone(),
            timestamp,
        });
        let error = format!("node {node_id} failed: {message}");
        run.ctx.mark_failed(Some(node_id.clone()), error.clone());
        run.record(|instance_id, timestamp| ExecutionEvent::WorkflowFailed {
            instance_id,
            node_id: Some(node_id.clone()),
            error,
            timestamp,
        });
    }

    async fn fail_missing_executor(&self, run: &mut Run, node: &Node) -> Report<EngineError> {
        let error = EngineError::NoExecutorForType {
            instance_id: run.instance_id(),
            node_id: node.id.clone(),
            activity_type: node.activity_type.clone(),
        };
        let message = error.to_string();
        if let Some(node_ctx) = run.ctx.node_mut(&node.id) {
            node_ctx.log(message.clone());
            node_ctx.fail(message.clone());
        }
        self.fail_instance(run, &node.id, message);
        match self.persist(run).await {
            Ok(_) => error.into(),
            Err(report) => report,
        }
    }

    /// Ends a drive whose frontier is exhausted.
    async fn finalize(&self, run: &mut Run) -> Result<(), Report<EngineError>> {
        let stranded: Vec<NodeId> = run
            .graph
            .nodes()
            .filter(|n| run.ctx.node_status(&n.id) == NodeStatus::NotStarted)
            .map(|n| n.id.clone())
            .collect();

        if let Some(first) = stranded.first()
            && !self.config.skip_unreached_nodes
        {
            let message = format!("node {first} can never become eligible");
            warn!(instance_id = %run.instance_id(), node_id = %first, "workflow stranded");
            run.ctx.mark_failed(Some(first.clone()), message.clone());
            run.record(|instance_id, timestamp| ExecutionEvent::WorkflowFailed {
                instance_id,
                node_id: Some(first.clone()),
                error: message,
                timestamp,
            });
            self.persist(run).await?;
            return Ok(());
        }

        for node_id in stranded {
            let reason = "skipped: predecessors did not all complete over active edges";
            node_context(&mut run.ctx, &node_id)?.skip(reason);
            run.record(|instance_id, timestamp| ExecutionEvent::NodeSkipped {
                instance_id,
                node_id: node_id.clone(),
                reason: reason.to_string(),
                timestamp,
            });
            debug!(%node_id, "node skipped");
        }

        run.ctx.mark_completed();
        run.record(|instance_id, timestamp| ExecutionEvent::WorkflowCompleted {
            instance_id,
            timestamp,
        });
        info!(instance_id = %run.instance_id(), "workflow completed");
        self.persist(run).await?;
        Ok(())
    }

    /// Saves the context unless the instance has been cancelled.
    ///
    /// Returns `false` when the save was skipped because of cancellation.
    async fn persist(&self, run: &Run) -> Result<bool, Report<EngineError>> {
        let _write = run.guard.write_lock.lock().await;
        if run.cancelled() {
            return Ok(false);
        }
        let instance_id = run.instance_id();
        self.store
            .save(&run.ctx)
            .await
            .map_err(|report| report.context(EngineError::Persistence { instance_id }))?;
        Ok(true)
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<InstanceId, Arc<InstanceGuard>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a guard for an instance nobody else is driving.
    fn claim(&self, instance_id: InstanceId) -> Result<Arc<InstanceGuard>, EngineError> {
        let mut active = self.lock_active();
        if active.contains_key(&instance_id) {
            return Err(EngineError::InvalidStateTransition {
                entity: format!("workflow {instance_id}"),
                expected: "an idle instance".to_string(),
                actual: "an instance another call is driving".to_string(),
            });
        }
        let guard = Arc::new(InstanceGuard::default());
        active.insert(instance_id, Arc::clone(&guard));
        Ok(guard)
    }

    fn release(&self, instance_id: InstanceId) {
        self.lock_active().remove(&instance_id);
    }
}

fn node_context<'c>(
    ctx: &'c mut ExecutionContext,
    node_id: &NodeId,
) -> Result<&'c mut crate::execution::NodeExecutionContext, Report<EngineError>> {
    Ok(ctx
        .node_mut(node_id)
        .ok_or_else(|| EngineError::NodeNotFound {
            node_id: node_id.clone(),
        })?)
}

/// Targets of the node's outgoing edges, in edge insertion order.
fn successors(graph: &WorkflowGraph, node_id: &NodeId) -> Result<VecDeque<NodeId>, Report<EngineError>> {
    Ok(graph
        .outgoing_edges(node_id)
        .map_err(EngineError::from)?
        .into_iter()
        .map(|e| e.target.clone())
        .collect())
}

/// Builds a node's input: the workflow variables, then for each completed
/// predecessor either its mapped properties or, without mappings, its whole
/// output.
fn prepare_input(
    graph: &WorkflowGraph,
    ctx: &ExecutionContext,
    node: &Node,
) -> Result<DataMap, Report<EngineError>> {
    let mut input = ctx.variables.clone();
    for edge in graph.incoming_edges(&node.id).map_err(EngineError::from)? {
        let Some(source) = ctx
            .node(&edge.source)
            .filter(|s| s.status == NodeStatus::Completed)
        else {
            continue;
        };
        let mut mappings = node.mappings_from(&edge.source).peekable();
        if mappings.peek().is_none() {
            input.extend(source.output_data.clone());
            continue;
        }
        for mapping in mappings {
            if let Some(value) = lookup_ci(&source.output_data, &mapping.source_property) {
                input.insert(mapping.target_property.clone(), value.clone());
            }
        }
    }
    Ok(input)
}
