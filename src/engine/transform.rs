//! The Python transform sandbox as seen by the reconciliation engine: a
//! narrow collaborator interface plus per-repository serialization of git
//! worktree checkouts.
//!
//! Grounded in `get_initialized_repo`/`repo.execute_python_transform` from
//! `original_source/backend/infrahub/git/tasks.py` and the repository object
//! model in `original_source/backend/infrahub/core/schema/computed_attribute.py`.
//! The actual worktree checkout and untrusted-code execution stays external
//! to this crate; this module only keeps repositories from being checked out
//! concurrently by two workers.

use crate::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Identifies the repository a transform must be run against.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub id: String,
    pub name: String,
    pub kind: String,
}

/// Runs a Python transform against a checked-out repository worktree. The
/// actual sandboxing (git worktree management, interpreter invocation) lives
/// outside this crate; implementors adapt whatever repository manager the
/// embedding system provides.
#[async_trait]
pub trait TransformRunner: Send + Sync {
    /// Executes the transform at `location` (e.g. `path/to/file.py::ClassName`)
    /// in `repo` at `commit`, passing `query_result` as its input, and
    /// returns the rendered string value to write back to the host graph.
    async fn run(
        &self,
        repo: &RepositoryRef,
        commit: &str,
        location: &str,
        query_result: Value,
    ) -> Result<String, Error>;
}

/// Serializes concurrent transform runs per repository, so two workers never
/// check out the same repository's worktree at once. One named lock per
/// repository, created lazily.
#[derive(Default)]
pub struct RepositoryLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RepositoryLocks {
    pub fn new() -> RepositoryLocks {
        RepositoryLocks::default()
    }

    /// Returns the named lock for `repository_name`, creating it on first use.
    pub async fn lock_for(&self, repository_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(repository_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs a transform while holding the named lock for `repo.name`,
    /// serializing this call against any other in-flight run against the
    /// same repository.
    pub async fn run_exclusive(
        &self,
        runner: &dyn TransformRunner,
        repo: &RepositoryRef,
        commit: &str,
        location: &str,
        query_result: Value,
    ) -> Result<String, Error> {
        let lock = self.lock_for(&repo.name).await;
        let _guard = lock.lock().await;
        debug!("running transform {} against {} at {}", location, repo.name, commit);
        runner.run(repo, commit, location, query_result).await.map_err(|e| {
            Error::TransformExecutionError {
                repository: repo.name.clone(),
                commit: commit.to_string(),
                message: e.to_string(),
            }
        })
    }
}
