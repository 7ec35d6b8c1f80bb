//! Provides the [`Error`] type for the computed-attribute reconciliation engine

use std::fmt::{Display, Formatter};

/// Error type for the computed-attribute reconciliation engine
///
/// # Examples
///
/// ```rust
/// use infrahub_computed_attributes::Error;
///
/// let e = Error::MissingTransform { name: "t_pitch".to_string() };
/// ```
#[derive(Debug)]
pub enum Error {
    /// Returned if the host client is unable to submit a request to the GraphQL endpoint, such
    /// as due to a network or server error, or the response cannot be parsed as valid JSON.
    /// Inspect the [`reqwest::Error`] included as a source error for additional detail.
    ClientRequestFailed { source: reqwest::Error },

    /// Returned if a configuration file cannot be opened, typically because it cannot be found
    /// on disk
    ConfigOpenFailed { source: std::io::Error },

    /// Returned if an `EngineConfig` fails to deserialize because the provided data does not
    /// match the expected data structure
    DeserializationFailed { source: serde_yaml::Error },

    /// Returned if an environment variable cannot be found. The `name` field contains the name
    /// of the environment variable that could not be found.
    EnvironmentVariableNotFound { name: String },

    /// Returned if an environment variable for a numeric setting cannot be parsed
    EnvironmentVariableNotParsed { source: std::num::ParseIntError },

    /// Returned if the workflow engine cannot be reached to list, create, or update automations.
    /// Surfaced from `AutomationRegistrar::reconcile`; the caller's next setup cycle is expected
    /// to retry.
    EngineUnavailable { message: String },

    /// Returned if a query against the host graph (node lookup, subscriber-group lookup) fails.
    /// The worker that returned this error is expected to be retried by the workflow engine.
    HostQueryError { source: Box<Error> },

    /// Returned if the mutation that writes a computed value back to the host fails. Safe to
    /// retry: the equality guard makes replays idempotent.
    MutationError { message: String },

    /// Returned if a schema references a transform name that is not present in the transform
    /// store. Logged as a warning at setup; the offending descriptor is skipped rather than
    /// aborting the whole reconcile.
    MissingTransform { name: String },

    /// Returned if a computed-attribute descriptor is malformed: neither or both of
    /// `template`/`transform_ref` are set, or a variable reference uses a relationship with
    /// incompatible cardinality. Aborts construction of the offending descriptor only.
    SchemaError { message: String },

    /// Returned if a GraphQL response is missing the expected `data` or named result field
    PayloadNotFound { response: serde_json::Value },

    /// Returned if a response cannot be (de)serialized to/from `serde_json::Value`
    SerializationFailed { source: serde_json::Error },

    /// Returned if a git worktree lock for a repository cannot be acquired, or the repository
    /// working tree cannot be opened at the requested commit.
    RepositoryError { message: String },

    /// Returned if an external transform invocation fails. No mutation is issued; the automation
    /// stays registered for the next triggering event.
    TransformExecutionError { repository: String, commit: String, message: String },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Error::ClientRequestFailed { source } => {
                write!(f, "Host client request failed. Source error: {}", source)
            }
            Error::ConfigOpenFailed { source } => {
                write!(f, "Config file could not be opened. Source error: {}", source)
            }
            Error::DeserializationFailed { source } => {
                write!(f, "Failed to deserialize configuration. Source error: {}", source)
            }
            Error::EnvironmentVariableNotFound { name } => {
                write!(f, "Could not find environment variable: {}", name)
            }
            Error::EnvironmentVariableNotParsed { source } => {
                write!(f, "Failed to parse environment variable. Source error: {}", source)
            }
            Error::EngineUnavailable { message } => {
                write!(f, "Could not reach the workflow engine: {}", message)
            }
            Error::HostQueryError { source } => {
                write!(f, "Query against the host graph failed: {}", source)
            }
            Error::MutationError { message } => {
                write!(f, "Mutation to the host graph failed: {}", message)
            }
            Error::MissingTransform { name } => {
                write!(f, "Transform {} referenced by a computed attribute could not be found", name)
            }
            Error::SchemaError { message } => {
                write!(f, "Computed attribute descriptor is invalid: {}", message)
            }
            Error::PayloadNotFound { response } => {
                write!(f, "Required data field is missing from the response: {}", response)
            }
            Error::SerializationFailed { source } => {
                write!(f, "Serialization of the GraphQL payload failed. Source error: {}", source)
            }
            Error::RepositoryError { message } => {
                write!(f, "Repository worktree error: {}", message)
            }
            Error::TransformExecutionError { repository, commit, message } => {
                write!(
                    f,
                    "Transform execution failed in repository {} at commit {}: {}",
                    repository, commit, message
                )
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ClientRequestFailed { source } => Some(source),
            Error::ConfigOpenFailed { source } => Some(source),
            Error::DeserializationFailed { source } => Some(source),
            Error::EnvironmentVariableNotFound { name: _ } => None,
            Error::EnvironmentVariableNotParsed { source } => Some(source),
            Error::EngineUnavailable { message: _ } => None,
            Error::HostQueryError { source } => Some(source.as_ref()),
            Error::MutationError { message: _ } => None,
            Error::MissingTransform { name: _ } => None,
            Error::SchemaError { message: _ } => None,
            Error::PayloadNotFound { response: _ } => None,
            Error::SerializationFailed { source } => Some(source),
            Error::RepositoryError { message: _ } => None,
            Error::TransformExecutionError { .. } => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::ClientRequestFailed { source: e }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::DeserializationFailed { source: e }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::ConfigOpenFailed { source: e }
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Error::EnvironmentVariableNotParsed { source: e }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationFailed { source: e }
    }
}
