//! Engine configuration.
//!
//! Loaded via the `config` crate from environment variables prefixed with
//! `NODEFLOW_`, e.g. `NODEFLOW_ACTIVITY_TIMEOUT_SECS=30`. Every field has a
//! default, so an empty environment yields a working engine.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable prefix for engine settings.
pub const ENV_PREFIX: &str = "NODEFLOW";

/// Tunables for [`WorkflowEngine`](crate::engine::WorkflowEngine).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for a single activity invocation. Unset means no limit.
    #[serde(default)]
    pub activity_timeout_secs: Option<u64>,

    /// Run the validator before allocating a context.
    #[serde(default = "default_true")]
    pub validate_on_start: bool,

    /// Mark nodes that can never run as `Skipped` instead of failing the run.
    #[serde(default = "default_true")]
    pub skip_unreached_nodes: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            activity_timeout_secs: None,
            validate_on_start: default_true(),
            skip_unreached_nodes: default_true(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_builder(config::Config::builder().add_source(env_source()))
    }

    pub(crate) fn from_builder(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// The activity timeout as a `Duration`.
    #[must_use]
    pub fn activity_timeout(&self) -> Option<Duration> {
        self.activity_timeout_secs.map(Duration::from_secs)
    }
}

/// The environment source shared by every nodeflow configuration type.
#[must_use]
pub fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_gives_defaults() {
        let config = EngineConfig::from_builder(config::Config::builder()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.validate_on_start);
        assert!(config.activity_timeout().is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let builder = config::Config::builder()
            .set_override("activity_timeout_secs", 30)
            .unwrap()
            .set_override("skip_unreached_nodes", false)
            .unwrap();
        let config = EngineConfig::from_builder(builder).unwrap();
        assert_eq!(config.activity_timeout(), Some(Duration::from_secs(30)));
        assert!(!config.skip_unreached_nodes);
        assert!(config.validate_on_start);
    }
}
