use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::conditions::FilterConditions;
use crate::types::Note;

/// Ways a repository lookup can fail. Every variant surfaces as `QueryStatus::Failed`.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered without a result set.
    #[error("repository returned no response")]
    EmptyResponse,

    #[error("lookup task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The store that actually executes a search.
///
/// Calls may overlap freely; the engine never waits for one to finish before
/// issuing the next.
pub trait NoteRepository: Send + Sync + 'static {
    fn search(
        &self,
        text: &str,
        conditions: FilterConditions,
    ) -> impl Future<Output = Result<Vec<Note>, RepositoryError>> + Send;
}
