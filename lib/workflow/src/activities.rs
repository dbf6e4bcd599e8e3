//! Built-in activities.
//!
//! These cover the activity types every deployment needs regardless of
//! which integrations are installed. Integration executors (HTTP, email,
//! browser automation) are registered by the host application.

use crate::activity::{ActivityContext, ActivityExecutor, ActivityOutput, ActivityRegistry, in_namespace};
use crate::error::ActivityError;
use crate::value::{DataMap, Value};
use async_trait::async_trait;
use rootcause::prelude::Report;

/// Completes with its input as output. Claims every `Trigger.*` type.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerActivity;

#[async_trait]
impl ActivityExecutor for TriggerActivity {
    fn can_execute(&self, activity_type: &str) -> bool {
        in_namespace(activity_type, "Trigger")
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityOutput, Report<ActivityError>> {
        Ok(ActivityOutput::completed(ctx.input.clone()))
    }
}

/// `Data.SetVariables`: writes its `values` map into the workflow variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetVariablesActivity;

#[async_trait]
impl ActivityExecutor for SetVariablesActivity {
    fn can_execute(&self, activity_type: &str) -> bool {
        activity_type == "Data.SetVariables"
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityOutput, Report<ActivityError>> {
        let values: DataMap = ctx.property("values")?;
        for (key, value) in &values {
            ctx.variables.insert(key.clone(), value.clone());
        }
        ctx.log(format!("set {} variable(s)", values.len()));
        Ok(ActivityOutput::completed(values))
    }
}

/// `Data.Transform`: copies input to output, renaming keys via `rename`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformActivity;

#[async_trait]
impl ActivityExecutor for TransformActivity {
    fn can_execute(&self, activity_type: &str) -> bool {
        activity_type == "Data.Transform"
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityOutput, Report<ActivityError>> {
        let mut output = ctx.input.clone();
        let rename: Option<DataMap> = ctx.optional_property("rename")?;

        for (from, to) in rename.unwrap_or_default() {
            let Value::String(to) = to else {
                return Err(ActivityError::TypeMismatch {
                    property: format!("rename.{from}"),
                    expected: "string",
                    actual: to.kind(),
                }
                .into());
            };
            if let Some(value) = output.remove(&from) {
                output.insert(to, value);
            }
        }
        Ok(ActivityOutput::completed(output))
    }
}

/// `Control.Approval`: suspends until resumed with the decision.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApprovalActivity;

#[async_trait]
impl ActivityExecutor for ApprovalActivity {
    fn can_execute(&self, activity_type: &str) -> bool {
        activity_type == "Control.Approval"
    }

    async fn execute(
        &self,
        ctx: &mut ActivityContext<'_>,
    ) -> Result<ActivityOutput, Report<ActivityError>> {
        let approver: Option<String> = ctx.optional_property("approver")?;
        match approver {
            Some(approver) => ctx.log(format!("awaiting approval from {approver}")),
            None => ctx.log("awaiting approval"),
        }
        Ok(ActivityOutput::suspended(DataMap::new()))
    }
}

impl ActivityRegistry {
    /// A registry holding the built-in activities.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new()
            .with(TriggerActivity)
            .with(SetVariablesActivity)
            .with(TransformActivity)
            .with(ApprovalActivity)
    }
}
