//! Executes one workflow graph document and prints the final execution
//! context as JSON.
//!
//! ```text
//! NODEFLOW_VARIABLES='{"region":"eu"}' nodeflow-runner flows/order.json
//! ```

mod config;

use crate::config::RunnerConfig;
use nodeflow_core::InstanceId;
use nodeflow_workflow::store::ExecutionContextStore;
use nodeflow_workflow::value::data_map_from_json;
use nodeflow_workflow::{
    ActivityRegistry, DataMap, EngineError, FileContextStore, InMemoryContextStore,
    InMemoryGraphRepository, WorkflowEngine, WorkflowGraph, WorkflowValidator,
};
use rootcause::prelude::Report;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum RunnerError {
    Config { message: String },
    ReadGraph { path: PathBuf },
    ParseGraph { path: PathBuf },
    InvalidVariables,
    InvalidGraph { findings: usize },
    Store,
    Engine,
    Output,
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message } => write!(f, "invalid configuration: {message}"),
            Self::ReadGraph { path } => write!(f, "failed to read {}", path.display()),
            Self::ParseGraph { path } => write!(f, "failed to parse {}", path.display()),
            Self::InvalidVariables => write!(f, "NODEFLOW_VARIABLES is not a JSON object"),
            Self::InvalidGraph { findings } => {
                write!(f, "graph has {findings} validation error(s)")
            }
            Self::Store => write!(f, "failed to open state directory"),
            Self::Engine => write!(f, "workflow engine error"),
            Self::Output => write!(f, "failed to render execution context"),
        }
    }
}

impl std::error::Error for RunnerError {}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            tracing::error!("{report}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Report<RunnerError>> {
    let config = RunnerConfig::load(std::env::args().nth(1)).map_err(|e| RunnerError::Config {
        message: e.to_string(),
    })?;

    let raw = tokio::fs::read_to_string(&config.graph_path)
        .await
        .map_err(|_| RunnerError::ReadGraph {
            path: config.graph_path.clone(),
        })?;
    let graph: WorkflowGraph =
        serde_json::from_str(&raw).map_err(|_| RunnerError::ParseGraph {
            path: config.graph_path.clone(),
        })?;
    let variables = parse_variables(config.variables.as_deref())?;

    let validation = WorkflowValidator::new().validate(&graph);
    for finding in &validation.errors {
        tracing::warn!(
            node_id = finding.node_id.as_ref().map(tracing::field::display),
            severity = ?finding.severity,
            "{finding}"
        );
    }
    if !validation.is_valid {
        return Err(RunnerError::InvalidGraph {
            findings: validation.fatal().count(),
        }
        .into());
    }

    let store: Arc<dyn ExecutionContextStore> = match &config.state_dir {
        Some(dir) => Arc::new(
            FileContextStore::open(dir)
                .await
                .map_err(|report| report.context(RunnerError::Store))?,
        ),
        None => Arc::new(InMemoryContextStore::new()),
    };

    let graphs = InMemoryGraphRepository::new();
    let graph_id = graphs.insert(graph).await;
    let engine = WorkflowEngine::new(graphs, store, ActivityRegistry::with_builtins())
        .with_config(config.engine);

    let instance_id = match engine.start(graph_id, variables).await {
        Ok(outcome) => {
            tracing::info!(
                instance_id = %outcome.value,
                events = outcome.events.len(),
                "workflow quiescent"
            );
            outcome.value
        }
        Err(report) => match failed_instance(&report) {
            Some(instance_id) => {
                tracing::error!("{report}");
                instance_id
            }
            None => return Err(report.context(RunnerError::Engine)),
        },
    };

    let state = engine
        .get_state(instance_id)
        .await
        .map_err(|report| report.context(RunnerError::Engine))?;
    let rendered = serde_json::to_string_pretty(&state).map_err(|_| RunnerError::Output)?;
    println!("{rendered}");
    Ok(())
}

fn parse_variables(raw: Option<&str>) -> Result<DataMap, Report<RunnerError>> {
    let Some(raw) = raw else {
        return Ok(DataMap::new());
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json @ serde_json::Value::Object(_)) => Ok(data_map_from_json(json)),
        _ => Err(RunnerError::InvalidVariables.into()),
    }
}

/// The instance an engine error left behind in a failed state, if any.
fn failed_instance(report: &Report<EngineError>) -> Option<InstanceId> {
    match report.current_context() {
        EngineError::NoExecutorForType { instance_id, .. } => Some(*instance_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_workflow::Value;

    #[test]
    fn variables_must_be_an_object() {
        assert!(parse_variables(None).unwrap().is_empty());
        let vars = parse_variables(Some(r#"{"region":"eu"}"#)).unwrap();
        assert_eq!(vars["region"], Value::from("eu"));
        assert!(parse_variables(Some("[1,2]")).is_err());
        assert!(parse_variables(Some("not json")).is_err());
    }
}
