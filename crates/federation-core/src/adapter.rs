//! Remote protocol adapter contract.
//!
//! Each remote network implements [`ProtocolAdapter`] once. Adapters own the
//! wire format and the network call; they classify every failure as
//! transient, permanent, or not-found at the boundary so the dispatcher never
//! sees raw transport errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{AuthorId, CanonicalContent, Embed, EmbedKind, Protocol};

/// Identity of a record on a remote network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Protocol-specific identifier: an `at://` URI for the repository
    /// protocol, an activity object URL for the activity protocol.
    pub id: String,
    /// Record digest accompanying the URI on the repository protocol.
    pub digest: Option<String>,
}

impl RemoteRef {
    /// Creates a reference with no digest (activity protocol).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            digest: None,
        }
    }

    /// Creates a content-addressed reference (repository protocol).
    pub fn with_digest(id: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            digest: Some(digest.into()),
        }
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Result of publishing a new remote record.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub remote: RemoteRef,
    /// Embed kinds the conversion dropped because this protocol does not
    /// support them. Logged by the dispatcher, never an error.
    pub dropped: Vec<EmbedKind>,
}

/// Result of updating an existing remote record.
#[derive(Debug, Clone)]
pub struct UpdateReceipt {
    /// New digest when the protocol re-addresses updated records.
    pub digest: Option<String>,
    pub dropped: Vec<EmbedKind>,
}

/// Canonical-shaped data recovered from a remote record, before a local id
/// has been assigned.
#[derive(Debug, Clone)]
pub struct ContentDraft {
    /// Remote author identity (a DID or an actor URL), carried through as
    /// the local author id for imported content.
    pub author: AuthorId,
    pub body: String,
    pub embeds: Vec<Embed>,
    pub created_at: DateTime<Utc>,
    /// Remote id of the parent record when the fetched object is a reply.
    pub reply_to_remote: Option<String>,
}

/// A remote object fetched for import.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub remote: RemoteRef,
    pub draft: ContentDraft,
}

/// Errors from remote protocol adapters, classified for retry eligibility.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Retryable: timeout, connection failure, 5xx, rate limiting.
    #[error("Transient remote error: {message}")]
    Transient { message: String },

    /// Non-retryable: the remote rejected the request outright.
    #[error("Permanent remote error (status {status}): {message}")]
    Permanent { status: u16, message: String },

    /// The remote record does not exist. On update this signals a
    /// re-publish; on delete it is success.
    #[error("Remote record not found: {0}")]
    NotFound(String),
}

impl AdapterError {
    /// Builds a transient error from any displayable cause.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Builds a permanent error with the remote's status code.
    pub fn permanent(status: u16, message: impl Into<String>) -> Self {
        Self::Permanent {
            status,
            message: message.into(),
        }
    }

    /// True when retrying the call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Result type alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Contract implemented once per remote network.
///
/// The dispatcher guarantees `publish` runs at most once per logical
/// creation via mapping status; adapters do not deduplicate. `reply` carries
/// the parent's remote reference when the content is a reply already
/// federated on this protocol; the dispatcher resolves it before calling so
/// conversion stays pure.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// The protocol this adapter speaks.
    fn protocol(&self) -> Protocol;

    /// Creates a new remote record for the content.
    async fn publish(
        &self,
        content: &CanonicalContent,
        reply: Option<&RemoteRef>,
    ) -> AdapterResult<PublishReceipt>;

    /// Mutates an existing remote record. `NotFound` means the remote id no
    /// longer exists and the caller should re-publish.
    async fn update(
        &self,
        remote: &RemoteRef,
        content: &CanonicalContent,
        reply: Option<&RemoteRef>,
    ) -> AdapterResult<UpdateReceipt>;

    /// Removes a remote record. Deleting an already-absent record is
    /// success, not error.
    async fn delete(&self, remote: &RemoteRef) -> AdapterResult<()>;

    /// Resolves a remote reference into converted canonical shape.
    async fn fetch(&self, uri: &str) -> AdapterResult<FetchedContent>;
}
