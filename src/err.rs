//! Error taxonomy for the genotype filtering engine.

use std::process::{ExitCode, Termination};

/// Top-level error type returned by [`crate::engine::evaluate`] and its
/// collaborators.
///
/// Every failure mode named in the design is a distinct, matchable variant
/// rather than a string. `Impossible` is deliberately absent here: a scenario
/// that can never be satisfied is not an error, it is an empty
/// [`crate::model::FilterResult`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum EngineError {
    /// The samples selection could not be built: duplicate names, a group
    /// referencing an unknown sample, or similar malformed input.
    #[error("invalid samples selection: {0}")]
    InvalidSelection(String),

    /// The dataset is unknown or has been deactivated.
    #[error("store unavailable for dataset {0:?}")]
    StoreUnavailable(String),

    /// The genotype matrix or one of its derived indices is internally
    /// inconsistent (row length mismatch, out-of-range id). Fatal: the
    /// dataset must not be served.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// The request was cancelled or exceeded its deadline before completing.
    #[error("request cancelled")]
    Cancelled,
}

impl Termination for EngineError {
    fn report(self) -> ExitCode {
        match self {
            EngineError::InvalidSelection(_) => ExitCode::from(2),
            EngineError::StoreUnavailable(_) => ExitCode::from(3),
            EngineError::IntegrityError(_) => ExitCode::from(4),
            EngineError::Cancelled => ExitCode::from(5),
        }
    }
}
