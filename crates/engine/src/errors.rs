use thiserror::Error;

use relay_core::domain::event::StoreId;
use relay_db::repositories::RepositoryError;

/// Failures that abort a whole event invocation. Anything scoped to one
/// agent is caught inside the dispatch loop and recorded as an error run
/// instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The event's store cannot be resolved; no agent can run without
    /// tenant context. Propagates so the upstream redelivers.
    #[error("store not found: {0}")]
    StoreNotFound(StoreId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
