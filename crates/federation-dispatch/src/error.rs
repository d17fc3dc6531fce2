//! Error types for the sync dispatcher.

use federation_store::{MappingStatus, StoreError};
use thiserror::Error;

/// Errors surfaced by dispatcher control operations.
///
/// Worker-side failures never reach this type: adapter errors feed the
/// retry state machine and store errors inside a job are logged and drop
/// the job, to be re-driven by the next reconciliation sweep.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Resweeping synced mappings is a no-op and resweeping tombstones
    /// would resurrect deleted content, so both are rejected.
    #[error("Cannot resweep mappings in status '{0}'")]
    ResweepNotAllowed(MappingStatus),
}

/// Result type alias for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resweep_error_names_status() {
        let err = DispatchError::ResweepNotAllowed(MappingStatus::Tombstoned);
        assert!(err.to_string().contains("tombstoned"));
    }
}
