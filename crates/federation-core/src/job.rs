//! Federation job types.

use chrono::{DateTime, Utc};

use crate::types::{ContentId, Protocol};

/// What a federation job does to the remote copies of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOperation {
    Create,
    Update,
    Delete,
}

impl JobOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for JobOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ephemeral work item consumed by the sync dispatcher.
///
/// Jobs live only in the dispatcher's working set. At-least-once redelivery
/// comes from the reconciliation sweep over mapping state, not from
/// persisting jobs.
#[derive(Debug, Clone)]
pub struct FederationJob {
    pub content_id: ContentId,
    pub operation: JobOperation,
    /// Protocols this job targets. Retries narrow this to the protocols
    /// that have not succeeded yet.
    pub protocols: Vec<Protocol>,
    pub enqueued_at: DateTime<Utc>,
}

impl FederationJob {
    /// Creates a job targeting the given protocols, stamped now.
    pub fn new(
        content_id: impl Into<ContentId>,
        operation: JobOperation,
        protocols: Vec<Protocol>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            operation,
            protocols,
            enqueued_at: Utc::now(),
        }
    }

    /// Returns a copy of this job narrowed to a protocol subset.
    pub fn narrowed_to(&self, protocols: Vec<Protocol>) -> Self {
        Self {
            content_id: self.content_id.clone(),
            operation: self.operation,
            protocols,
            enqueued_at: self.enqueued_at,
        }
    }
}
