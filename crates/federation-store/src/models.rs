//! Model types for federation persistence.

use chrono::{DateTime, Utc};
use federation_core::{ContentId, Protocol, RemoteRef};
use serde::{Deserialize, Serialize};

/// Sync status of one (content, protocol) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    /// Created or queued, not yet confirmed remotely.
    #[default]
    Pending,
    /// The remote copy matches the canonical item.
    Synced,
    /// Retries exhausted or the remote rejected the item.
    Failed,
    /// The remote copy was confirmed deleted. Terminal.
    Tombstoned,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
            Self::Tombstoned => "tombstoned",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "synced" => Self::Synced,
            "failed" => Self::Failed,
            "tombstoned" => Self::Tombstoned,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable link between a canonical content item and its remote copy on one
/// protocol.
///
/// One row per (content, protocol) pair, never physically deleted.
/// Tombstoned rows are retained so stale retries cannot resurrect deleted
/// content.
#[derive(Debug, Clone, PartialEq)]
pub struct FederationMapping {
    pub content_id: ContentId,
    pub protocol: Protocol,
    /// Remote identifier, set on first successful publish.
    pub remote_id: Option<String>,
    /// Record digest alongside the URI on the repository protocol.
    pub remote_digest: Option<String>,
    pub status: MappingStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FederationMapping {
    /// The remote reference for adapter calls, when one has been recorded.
    pub fn remote_ref(&self) -> Option<RemoteRef> {
        self.remote_id.as_ref().map(|id| RemoteRef {
            id: id.clone(),
            digest: self.remote_digest.clone(),
        })
    }

    pub fn is_synced(&self) -> bool {
        self.status == MappingStatus::Synced
    }

    pub fn is_tombstoned(&self) -> bool {
        self.status == MappingStatus::Tombstoned
    }
}

/// Mapping counts per status, for the operator surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub synced: u64,
    pub failed: u64,
    pub tombstoned: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.synced + self.failed + self.tombstoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_names() {
        for status in [
            MappingStatus::Pending,
            MappingStatus::Synced,
            MappingStatus::Failed,
            MappingStatus::Tombstoned,
        ] {
            assert_eq!(MappingStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn status_unknown_defaults_to_pending() {
        assert_eq!(MappingStatus::from_str("garbled"), MappingStatus::Pending);
    }

    #[test]
    fn remote_ref_requires_remote_id() {
        let mut mapping = FederationMapping {
            content_id: ContentId::from_string("content-1"),
            protocol: Protocol::RepoProtocol,
            remote_id: None,
            remote_digest: None,
            status: MappingStatus::Pending,
            attempt_count: 0,
            last_error: None,
            last_attempt_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(mapping.remote_ref().is_none());

        mapping.remote_id = Some("at://did:plc:xyz/app.bsky.feed.post/abc".to_string());
        mapping.remote_digest = Some("bafyabc".to_string());
        let remote = mapping.remote_ref().unwrap();
        assert_eq!(remote.id, "at://did:plc:xyz/app.bsky.feed.post/abc");
        assert_eq!(remote.digest.as_deref(), Some("bafyabc"));
    }

    #[test]
    fn status_counts_total() {
        let counts = StatusCounts {
            pending: 1,
            synced: 2,
            failed: 3,
            tombstoned: 4,
        };
        assert_eq!(counts.total(), 10);
    }
}
