use thiserror::Error;

use crate::domain::NightId;

/// Failures a `NightStore` implementation can report. `NotFound` is benign on
/// the stop/rate paths; `Backend` carries the underlying I/O or constraint
/// failure and is surfaced to the caller unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("night {0:?} not found")]
    NotFound(NightId),
    #[error("storage backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
