//! Waits for a branch's schema to converge across workers before the setup
//! flow reads it, mirroring `wait_for_schema_to_converge` from
//! `original_source/backend/infrahub/workflows/utils.py`'s call sites in
//! `computed_attribute_setup`/`computed_attribute_setup_python`. The actual
//! convergence check (asking the schema service whether every worker has
//! converged on the branch) is an external collaborator; this module only
//! owns the poll/timeout/log loop.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Total time [`wait_for_schema_convergence`] is willing to wait before
/// giving up and proceeding anyway.
pub const CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(30);
/// Interval between convergence checks.
pub const CONVERGENCE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Reports whether every worker has converged on a branch's current schema
/// hash. Implementors adapt whatever schema-distribution mechanism the
/// embedding system uses.
#[async_trait]
pub trait SchemaConvergenceCheck: Send + Sync {
    async fn has_converged(&self, branch_name: &str) -> bool;
}

/// Polls `check` at [`CONVERGENCE_POLL_INTERVAL`] until it reports
/// convergence or [`CONVERGENCE_TIMEOUT`] elapses. On timeout this logs a
/// warning and returns rather than failing the caller — matching the
/// original's "proceed with a possibly-stale schema rather than block setup
/// forever" behavior.
pub async fn wait_for_schema_convergence(check: &dyn SchemaConvergenceCheck, branch_name: &str) {
    let deadline = tokio::time::Instant::now() + CONVERGENCE_TIMEOUT;
    loop {
        if check.has_converged(branch_name).await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                "schema for branch {} did not converge within {:?}, proceeding anyway",
                branch_name, CONVERGENCE_TIMEOUT
            );
            return;
        }
        tokio::time::sleep(CONVERGENCE_POLL_INTERVAL).await;
    }
}
