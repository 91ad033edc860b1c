//! Orchestrator errors.

use artwork_media::MediaError;

/// Why an artwork could not be bound
///
/// Media failures are downgraded to the error placeholder by the loader and
/// reported through [`crate::LoadOutcome::Failed`]. The other variants reject
/// the call before the binding is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArtworkError {
    #[error("invalid artwork source: {0}")]
    InvalidSource(String),
    #[error("display binding {0} has been detached")]
    Detached(u64),
    #[error(transparent)]
    Media(#[from] MediaError),
}
