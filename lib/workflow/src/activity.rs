//! Activity executors and their registry.
//!
//! An activity is the unit of work a node delegates to. Executors claim
//! activity types through [`ActivityExecutor::can_execute`] (usually a
//! namespace match such as every type under `Http.`) and the registry picks
//! the first registered executor that claims a type.
//!
//! Executors never fail the engine: [`execute_guarded`] turns errors, panics
//! and timeouts into a `Failed` result recorded on the node.

use crate::error::ActivityError;
use crate::execution::NodeExecutionContext;
use crate::node::NodeId;
use crate::value::{DataMap, FromValue, Value, lookup_ci};
use async_trait::async_trait;
use futures::FutureExt;
use nodeflow_core::InstanceId;
use rootcause::prelude::Report;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Output key carrying the failure message of a captured activity error.
pub const ERROR_MESSAGE_KEY: &str = "errorMessage";
/// Output key carrying the full error report of a captured activity error.
pub const ERROR_DETAILS_KEY: &str = "errorDetails";

/// How an activity invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    Completed,
    Failed,
    /// Waiting for an external `resume`.
    Suspended,
}

/// Result and output data of one activity invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOutput {
    pub result: ExecutionResult,
    pub output: DataMap,
}

impl ActivityOutput {
    #[must_use]
    pub fn completed(output: DataMap) -> Self {
        Self {
            result: ExecutionResult::Completed,
            output,
        }
    }

    #[must_use]
    pub fn failed(output: DataMap) -> Self {
        Self {
            result: ExecutionResult::Failed,
            output,
        }
    }

    #[must_use]
    pub fn suspended(output: DataMap) -> Self {
        Self {
            result: ExecutionResult::Suspended,
            output,
        }
    }

    /// The captured failure message, if this output carries one.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.output.get(ERROR_MESSAGE_KEY).and_then(Value::as_str)
    }
}

/// Everything an executor can see and touch while running one node.
pub struct ActivityContext<'a> {
    pub instance_id: InstanceId,
    pub node_id: &'a NodeId,
    pub activity_type: &'a str,
    /// Static configuration from the graph.
    pub properties: &'a DataMap,
    /// Prepared input: variables plus predecessor outputs.
    pub input: &'a DataMap,
    /// Workflow-global variables; writes are visible to later nodes.
    pub variables: &'a mut DataMap,
    pub node: &'a mut NodeExecutionContext,
    pub cancellation: &'a CancellationToken,
}

impl ActivityContext<'_> {
    /// Resolves a required property.
    ///
    /// The input wins over static configuration, matching keys
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `MissingProperty` when the property is in neither place, or
    /// `TypeMismatch` when it cannot be coerced to `T`.
    pub fn property<T: FromValue>(&self, name: &str) -> Result<T, Report<ActivityError>> {
        match self.optional_property(name)? {
            Some(value) => Ok(value),
            None => Err(ActivityError::MissingProperty {
                property: name.to_string(),
                activity_type: self.activity_type.to_string(),
            }
            .into()),
        }
    }

    /// Resolves an optional property; `null` counts as absent.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` when the property exists but cannot be coerced.
    pub fn optional_property<T: FromValue>(
        &self,
        name: &str,
    ) -> Result<Option<T>, Report<ActivityError>> {
        let found = lookup_ci(self.input, name)
            .filter(|v| !v.is_null())
            .or_else(|| lookup_ci(self.properties, name).filter(|v| !v.is_null()));
        let Some(value) = found else {
            return Ok(None);
        };
        match value.coerce::<T>() {
            Some(coerced) => Ok(Some(coerced)),
            None => Err(ActivityError::TypeMismatch {
                property: name.to_string(),
                expected: T::TYPE_NAME,
                actual: value.kind(),
            }
            .into()),
        }
    }

    /// Appends a line to the node's persisted log trail.
    pub fn log(&mut self, message: impl Into<String>) {
        self.node.log(message);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A pluggable unit of work.
#[async_trait]
pub trait ActivityExecutor: Send + Sync {
    /// Returns true if this executor handles `activity_type`.
    fn can_execute(&self, activity_type: &str) -> bool;

    /// Runs the activity for one node.
    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityOutput, Report<ActivityError>>;
}

/// Returns true if `activity_type` is `namespace` or lives under `namespace.`.
#[must_use]
pub fn in_namespace(activity_type: &str, namespace: &str) -> bool {
    activity_type
        .strip_prefix(namespace)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Ordered set of executors; the first one claiming a type wins.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    executors: Vec<Arc<dyn ActivityExecutor>>,
}

impl ActivityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an executor after the ones already registered.
    pub fn register(&mut self, executor: impl ActivityExecutor + 'static) -> &mut Self {
        self.executors.push(Arc::new(executor));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, executor: impl ActivityExecutor + 'static) -> Self {
        self.register(executor);
        self
    }

    /// Finds the first executor that claims `activity_type`.
    #[must_use]
    pub fn get_executor(&self, activity_type: &str) -> Option<Arc<dyn ActivityExecutor>> {
        self.executors
            .iter()
            .find(|e| e.can_execute(activity_type))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("executors", &self.executors.len())
            .finish()
    }
}

/// Runs an executor, converting every failure mode into a `Failed` output.
///
/// Errors, panics and (when `timeout` is set) overruns are logged into the
/// node's logs and recorded as the node error; the returned output carries
/// `errorMessage` and `errorDetails`. An already cancelled token fails the
/// activity without invoking the executor.
pub async fn execute_guarded(
    executor: &dyn ActivityExecutor,
    ctx: &mut ActivityContext<'_>,
    timeout: Option<Duration>,
) -> ActivityOutput {
    if ctx.is_cancelled() {
        let message = ActivityError::Cancelled.to_string();
        return capture_failure(ctx, message.clone(), message);
    }

    let outcome = {
        let run = AssertUnwindSafe(executor.execute(ctx)).catch_unwind();
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(ActivityError::Timeout {
                    seconds: limit.as_secs(),
                }
                .into())),
            },
            None => run.await,
        }
    };

    match outcome {
        Ok(Ok(output)) => output,
        Ok(Err(report)) => {
            let message = report.current_context().to_string();
            let details = format!("{report}");
            capture_failure(ctx, message, details)
        }
        Err(payload) => {
            let message = ActivityError::Panicked {
                message: panic_message(payload.as_ref()),
            }
            .to_string();
            let details = message.clone();
            capture_failure(ctx, message, details)
        }
    }
}

fn capture_failure(ctx: &mut ActivityContext<'_>, message: String, details: String) -> ActivityOutput {
    warn!(
        node_id = %ctx.node_id,
        activity_type = ctx.activity_type,
        error = %message,
        "activity failed"
    );
    ctx.log(format!("error: {message}"));
    ctx.node.error = Some(message.clone());

    let mut output = DataMap::new();
    output.insert(ERROR_MESSAGE_KEY.to_string(), Value::from(message));
    output.insert(ERROR_DETAILS_KEY.to_string(), Value::from(details));
    ActivityOutput::failed(output)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
