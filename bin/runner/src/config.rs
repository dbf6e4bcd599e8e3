//! Runner configuration.
//!
//! Read from `NODEFLOW_`-prefixed environment variables. Engine settings are
//! nested, e.g. `NODEFLOW_ENGINE__ACTIVITY_TIMEOUT_SECS=30`.

use config::ConfigError;
use nodeflow_workflow::EngineConfig;
use nodeflow_workflow::config::env_source;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct RunnerConfig {
    /// Graph document to execute.
    pub graph_path: PathBuf,

    /// Initial variables as a JSON object.
    #[serde(default)]
    pub variables: Option<String>,

    /// Directory for persisted execution contexts. Unset keeps them in memory.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl RunnerConfig {
    /// Loads configuration from the environment. A positional argument, if
    /// given, overrides the graph path.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph path is missing or a value is malformed.
    pub fn load(graph_arg: Option<String>) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(env_source())
            .set_override_option("graph_path", graph_arg)?
            .build()?
            .try_deserialize()
    }
}
