//! Engine configuration: endpoints and tunables the reconciliation engine
//! needs to reach its collaborators. Deserialized with `serde_yaml`, in the
//! style of this lineage's `Configuration::try_from` pattern — a thin struct
//! with `TryFrom<&str>` for embedding config inline and `TryFrom<File>` for
//! loading from disk.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fs::File;
use std::io::Read;
use std::time::Duration;

fn default_schema_convergence_timeout_secs() -> u64 {
    30
}

fn default_schema_convergence_poll_interval_ms() -> u64 {
    200
}

fn default_worker_concurrency() -> usize {
    4
}

/// Configuration for the computed-attribute reconciliation engine.
///
/// # Examples
///
/// ```rust
/// use infrahub_computed_attributes::config::EngineConfig;
/// use std::convert::TryFrom;
///
/// let config = EngineConfig::try_from(
///     "host_endpoint: http://localhost:8000/graphql/main\nworkflow_engine_endpoint: http://localhost:4200/api\n",
/// )
/// .expect("valid configuration");
/// assert_eq!(config.worker_concurrency, 4);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Branch-scoped GraphQL endpoint of the host Infrahub instance.
    pub host_endpoint: String,
    /// Base URL of the workflow engine's API.
    pub workflow_engine_endpoint: String,
    #[serde(default = "default_schema_convergence_timeout_secs")]
    pub schema_convergence_timeout_secs: u64,
    #[serde(default = "default_schema_convergence_poll_interval_ms")]
    pub schema_convergence_poll_interval_ms: u64,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

impl EngineConfig {
    pub fn schema_convergence_timeout(&self) -> Duration {
        Duration::from_secs(self.schema_convergence_timeout_secs)
    }

    pub fn schema_convergence_poll_interval(&self) -> Duration {
        Duration::from_millis(self.schema_convergence_poll_interval_ms)
    }

    /// Reads a named environment variable, converting a missing variable
    /// into [`Error::EnvironmentVariableNotFound`].
    pub fn env_var(name: &str) -> Result<String, Error> {
        std::env::var(name).map_err(|_| Error::EnvironmentVariableNotFound {
            name: name.to_string(),
        })
    }

    /// Reads a named environment variable as a `usize`, falling back to
    /// `default` if the variable is unset.
    pub fn env_var_usize_or(name: &str, default: usize) -> Result<usize, Error> {
        match std::env::var(name) {
            Ok(value) => value.parse::<usize>().map_err(Error::from),
            Err(_) => Ok(default),
        }
    }
}

impl TryFrom<&str> for EngineConfig {
    type Error = Error;

    fn try_from(s: &str) -> Result<EngineConfig, Error> {
        Ok(serde_yaml::from_str(s)?)
    }
}

impl TryFrom<File> for EngineConfig {
    type Error = Error;

    fn try_from(mut file: File) -> Result<EngineConfig, Error> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        EngineConfig::try_from(contents.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = EngineConfig::try_from(
            "host_endpoint: http://localhost:8000/graphql/main\nworkflow_engine_endpoint: http://localhost:4200/api\n",
        )
        .unwrap();

        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.schema_convergence_timeout(), Duration::from_secs(30));
        assert_eq!(config.schema_convergence_poll_interval(), Duration::from_millis(200));
    }

    #[test]
    fn overrides_defaults_when_present() {
        let config = EngineConfig::try_from(
            "host_endpoint: http://localhost:8000/graphql/main\n\
             workflow_engine_endpoint: http://localhost:4200/api\n\
             worker_concurrency: 8\n",
        )
        .unwrap();

        assert_eq!(config.worker_concurrency, 8);
    }

    #[test]
    fn rejects_missing_required_field() {
        assert!(EngineConfig::try_from("host_endpoint: http://localhost:8000/graphql/main\n").is_err());
    }
}
