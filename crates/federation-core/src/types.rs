//! Core types for the federation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a canonical content item (UUID string, or a
/// derived hash id for imported content).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    /// Creates a new random content ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a content ID from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the content ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a content author (UUID string).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(pub String);

impl AuthorId {
    /// Creates a new random author ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an author ID from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the author ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AuthorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuthorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AuthorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AuthorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Remote network protocols
// ============================================================================

/// A remote network the engine federates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Content-addressed record repository network (`at://` URIs).
    RepoProtocol,
    /// HTTP activity-stream federation network (object URLs).
    ActivityProtocol,
}

impl Protocol {
    /// All protocols the engine knows about.
    pub const ALL: [Protocol; 2] = [Protocol::RepoProtocol, Protocol::ActivityProtocol];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepoProtocol => "repo-protocol",
            Self::ActivityProtocol => "activity-protocol",
        }
    }

    /// Parses a stored protocol name. Returns `None` for unknown names so
    /// callers can surface corrupt rows instead of guessing.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "repo-protocol" => Some(Self::RepoProtocol),
            "activity-protocol" => Some(Self::ActivityProtocol),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Canonical content
// ============================================================================

/// Kind of media embedded in a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedKind {
    Image,
    Attachment,
}

impl EmbedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Attachment => "attachment",
        }
    }
}

impl std::fmt::Display for EmbedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A media object attached to a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub kind: EmbedKind,
    pub uri: String,
    pub alt_text: Option<String>,
}

impl Embed {
    /// Creates an image embed.
    pub fn image(uri: impl Into<String>, alt_text: Option<String>) -> Self {
        Self {
            kind: EmbedKind::Image,
            uri: uri.into(),
            alt_text,
        }
    }

    /// Creates a generic file attachment embed.
    pub fn attachment(uri: impl Into<String>, alt_text: Option<String>) -> Self {
        Self {
            kind: EmbedKind::Attachment,
            uri: uri.into(),
            alt_text,
        }
    }
}

/// The locally-owned unit of federated data.
///
/// Owned by the content-authoring subsystem; the federation engine reads it
/// and writes federation-status side effects only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalContent {
    pub id: ContentId,
    pub author_id: AuthorId,
    pub body: String,
    /// Ordered media embeds.
    pub embeds: Vec<Embed>,
    /// Local id of the parent content when this item is a reply.
    pub reply_to_id: Option<ContentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Deleted content keeps its row.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CanonicalContent {
    /// True when the item has been soft-deleted locally.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A content item to be inserted.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub id: ContentId,
    pub author_id: AuthorId,
    pub body: String,
    pub embeds: Vec<Embed>,
    pub reply_to_id: Option<ContentId>,
}

impl NewContent {
    /// Creates a new content item with a generated ID.
    pub fn new(author_id: impl Into<AuthorId>, body: impl Into<String>) -> Self {
        Self {
            id: ContentId::new(),
            author_id: author_id.into(),
            body: body.into(),
            embeds: Vec::new(),
            reply_to_id: None,
        }
    }

    /// Creates a new reply to existing content.
    pub fn reply(
        author_id: impl Into<AuthorId>,
        body: impl Into<String>,
        parent: impl Into<ContentId>,
    ) -> Self {
        Self {
            id: ContentId::new(),
            author_id: author_id.into(),
            body: body.into(),
            embeds: Vec::new(),
            reply_to_id: Some(parent.into()),
        }
    }

    /// Attaches embeds, replacing any previously set.
    pub fn with_embeds(mut self, embeds: Vec<Embed>) -> Self {
        self.embeds = embeds;
        self
    }
}

/// Content update fields. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ContentUpdate {
    pub body: Option<String>,
    pub embeds: Option<Vec<Embed>>,
}
