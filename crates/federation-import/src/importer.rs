//! Remote reference resolution and content import.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use federation_core::{
    CanonicalContent, ContentId, FetchedContent, Protocol, ProtocolAdapter,
};
use federation_store::{Database, StoreError};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ImportError, ImportResult};

/// Classifies an external reference by shape.
///
/// `at://` content addresses belong to the repository protocol, `http(s)`
/// object URLs to the activity protocol. Anything else is rejected.
pub fn resolve(uri: &str) -> ImportResult<Protocol> {
    if uri.starts_with("at://") {
        return Ok(Protocol::RepoProtocol);
    }
    if uri.starts_with("https://") || uri.starts_with("http://") {
        return Ok(Protocol::ActivityProtocol);
    }
    Err(ImportError::UnsupportedReference(uri.to_string()))
}

/// Derives the local content id for an imported remote object: SHA-256 over
/// the protocol name and remote id, hex-truncated. The same remote object
/// always lands on the same local row.
pub fn derived_content_id(protocol: Protocol, remote_id: &str) -> ContentId {
    let digest = Sha256::digest(format!("{}\n{}", protocol.as_str(), remote_id));
    ContentId::from_string(hex::encode(&digest[..16]))
}

/// Imports remote content into the local model.
pub struct Importer {
    db: Arc<Mutex<Database>>,
    adapters: HashMap<Protocol, Arc<dyn ProtocolAdapter>>,
}

impl Importer {
    pub fn new(db: Arc<Mutex<Database>>, adapters: Vec<Arc<dyn ProtocolAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.protocol(), adapter))
            .collect();
        Self { db, adapters }
    }

    /// Fetches the remote object behind `uri` and upserts it locally.
    ///
    /// Repeated imports of the same remote object update the same row. The
    /// write bypasses the change feed and the origin mapping is recorded
    /// `synced`, so imported content is never federated back out.
    pub async fn import(&self, uri: &str) -> ImportResult<CanonicalContent> {
        let protocol = resolve(uri)?;
        let adapter = self
            .adapters
            .get(&protocol)
            .ok_or(ImportError::NoAdapter(protocol))?;

        debug!(uri, protocol = %protocol, "Fetching remote object");
        let FetchedContent { remote, draft } = adapter.fetch(uri).await?;
        let content_id = derived_content_id(protocol, &remote.id);

        let db = self.db.lock().expect("lock poisoned");

        // A remote reply becomes a local reply only when its parent is
        // already known here, through the parent's recorded mapping.
        let reply_to_id = match &draft.reply_to_remote {
            Some(parent_remote) => {
                let parent = db.find_mapping_by_remote(protocol, parent_remote)?;
                if parent.is_none() {
                    debug!(
                        content_id = %content_id,
                        parent_remote,
                        "Parent not known locally, importing as top-level"
                    );
                }
                parent.map(|mapping| mapping.content_id)
            }
            None => None,
        };

        let content = CanonicalContent {
            id: content_id.clone(),
            author_id: draft.author,
            body: draft.body,
            embeds: draft.embeds,
            reply_to_id,
            created_at: draft.created_at,
            updated_at: Utc::now(),
            deleted_at: None,
        };
        db.upsert_imported_content(&content)?;
        db.mark_sync_success(&content_id, protocol, &remote, content.updated_at)?;

        // Read back so re-imports return the stored row, whose created_at
        // keeps the first import's value.
        let stored = db.get_content(&content_id)?.ok_or_else(|| {
            ImportError::Store(StoreError::NotFound(format!(
                "imported content {content_id}"
            )))
        })?;

        info!(
            content_id = %content_id,
            remote_id = %remote.id,
            protocol = %protocol,
            "Imported remote content"
        );
        Ok(stored)
    }
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------
    // Reference resolution
    // ------------------------------------------------------------------

    #[test]
    fn at_uri_resolves_to_repo_protocol() {
        let protocol = resolve("at://did:plc:xyz/app.bsky.feed.post/abc").unwrap();
        assert_eq!(protocol, Protocol::RepoProtocol);
    }

    #[test]
    fn https_url_resolves_to_activity_protocol() {
        let protocol = resolve("https://example.social/users/42/statuses/99").unwrap();
        assert_eq!(protocol, Protocol::ActivityProtocol);
    }

    #[test]
    fn http_url_resolves_to_activity_protocol() {
        let protocol = resolve("http://localhost:3000/users/dev/statuses/1").unwrap();
        assert_eq!(protocol, Protocol::ActivityProtocol);
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        for uri in ["gopher://example", "did:plc:xyz", "", "atproto.com/post"] {
            let err = resolve(uri).unwrap_err();
            assert!(matches!(err, ImportError::UnsupportedReference(_)));
        }
    }

    // ------------------------------------------------------------------
    // Derived ids
    // ------------------------------------------------------------------

    #[test]
    fn derived_id_is_deterministic() {
        let a = derived_content_id(Protocol::RepoProtocol, "at://did:plc:xyz/post/abc");
        let b = derived_content_id(Protocol::RepoProtocol, "at://did:plc:xyz/post/abc");
        assert_eq!(a, b);
    }

    #[test]
    fn derived_id_differs_per_remote_and_protocol() {
        let a = derived_content_id(Protocol::RepoProtocol, "at://did:plc:xyz/post/abc");
        let b = derived_content_id(Protocol::RepoProtocol, "at://did:plc:xyz/post/def");
        let c = derived_content_id(Protocol::ActivityProtocol, "at://did:plc:xyz/post/abc");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn derived_id_is_short_lowercase_hex() {
        let id = derived_content_id(Protocol::ActivityProtocol, "https://example.social/s/99");
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id.as_str(), id.as_str().to_lowercase());
    }
}
