//! Error types for content import.

use federation_core::{AdapterError, Protocol};
use federation_store::StoreError;
use thiserror::Error;

/// Errors from resolving and importing external references.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The reference matches no known protocol shape.
    #[error("Unsupported reference: {0}")]
    UnsupportedReference(String),

    /// The reference resolved to a protocol with no configured adapter.
    #[error("No adapter configured for protocol '{0}'")]
    NoAdapter(Protocol),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The remote fetch failed, including fetch of a missing record.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] AdapterError),
}

/// Result type alias for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_reference_names_the_uri() {
        let err = ImportError::UnsupportedReference("gopher://example".to_string());
        assert!(err.to_string().contains("gopher://example"));
    }

    #[test]
    fn no_adapter_names_the_protocol() {
        let err = ImportError::NoAdapter(Protocol::ActivityProtocol);
        assert!(err.to_string().contains("activity-protocol"));
    }
}
