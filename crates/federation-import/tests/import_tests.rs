//! End-to-end import behavior against an in-memory store and a canned
//! fetch adapter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use federation_core::{
    AdapterError, AdapterResult, AuthorId, CanonicalContent, ContentDraft, Embed, FetchedContent,
    NewContent, NullSink, Protocol, ProtocolAdapter, PublishReceipt, RecordingSink, RemoteRef,
    UpdateReceipt,
};
use federation_import::{derived_content_id, ImportError, Importer};
use federation_store::{Database, MappingStatus};

const REPO_URI: &str = "at://did:plc:xyz/app.bsky.feed.post/abc";
const ACTIVITY_URI: &str = "https://example.social/users/42/statuses/99";

// ============================================================================
// Canned fetch adapter
// ============================================================================

/// In-process adapter that serves canned fetch responses by URI. Outbound
/// operations are never exercised by the importer.
struct StaticAdapter {
    protocol: Protocol,
    responses: Mutex<HashMap<String, FetchedContent>>,
}

impl StaticAdapter {
    fn new(protocol: Protocol) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            responses: Mutex::new(HashMap::new()),
        })
    }

    fn serve(&self, uri: &str, fetched: FetchedContent) {
        self.responses
            .lock()
            .unwrap()
            .insert(uri.to_string(), fetched);
    }
}

#[async_trait]
impl ProtocolAdapter for StaticAdapter {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn publish(
        &self,
        _content: &CanonicalContent,
        _reply: Option<&RemoteRef>,
    ) -> AdapterResult<PublishReceipt> {
        Err(AdapterError::permanent(500, "fixture does not publish"))
    }

    async fn update(
        &self,
        _remote: &RemoteRef,
        _content: &CanonicalContent,
        _reply: Option<&RemoteRef>,
    ) -> AdapterResult<UpdateReceipt> {
        Err(AdapterError::permanent(500, "fixture does not update"))
    }

    async fn delete(&self, _remote: &RemoteRef) -> AdapterResult<()> {
        Err(AdapterError::permanent(500, "fixture does not delete"))
    }

    async fn fetch(&self, uri: &str) -> AdapterResult<FetchedContent> {
        self.responses
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(uri.to_string()))
    }
}

fn fetched(remote_id: &str, author: &str, body: &str) -> FetchedContent {
    FetchedContent {
        remote: RemoteRef::new(remote_id),
        draft: ContentDraft {
            author: AuthorId::from_string(author),
            body: body.to_string(),
            embeds: Vec::new(),
            created_at: Utc::now(),
            reply_to_remote: None,
        },
    }
}

fn open_db() -> Arc<Mutex<Database>> {
    Arc::new(Mutex::new(
        Database::open_in_memory(Arc::new(NullSink)).unwrap(),
    ))
}

// ============================================================================
// Importing new remote content
// ============================================================================

#[tokio::test]
async fn import_creates_content_and_synced_origin_mapping() {
    let adapter = StaticAdapter::new(Protocol::ActivityProtocol);
    adapter.serve(
        ACTIVITY_URI,
        fetched(ACTIVITY_URI, "https://example.social/users/42", "hello from afar"),
    );
    let db = open_db();
    let importer = Importer::new(db.clone(), vec![adapter]);

    let content = importer.import(ACTIVITY_URI).await.unwrap();

    assert_eq!(
        content.id,
        derived_content_id(Protocol::ActivityProtocol, ACTIVITY_URI)
    );
    assert_eq!(content.body, "hello from afar");
    assert_eq!(content.author_id.as_str(), "https://example.social/users/42");
    assert!(content.reply_to_id.is_none());

    let db = db.lock().unwrap();
    let stored = db.get_content(&content.id).unwrap().unwrap();
    assert_eq!(stored.body, "hello from afar");

    let mapping = db
        .get_mapping(&content.id, Protocol::ActivityProtocol)
        .unwrap()
        .unwrap();
    assert_eq!(mapping.status, MappingStatus::Synced);
    assert_eq!(mapping.remote_id.as_deref(), Some(ACTIVITY_URI));
    assert_eq!(mapping.attempt_count, 0);
}

#[tokio::test]
async fn import_preserves_remote_digest_on_origin_mapping() {
    let adapter = StaticAdapter::new(Protocol::RepoProtocol);
    adapter.serve(
        REPO_URI,
        FetchedContent {
            remote: RemoteRef::with_digest(REPO_URI, "bafyfetched"),
            draft: ContentDraft {
                author: AuthorId::from_string("did:plc:xyz"),
                body: "content-addressed".to_string(),
                embeds: vec![Embed::image("https://cdn.example/pic.png", None)],
                created_at: Utc::now(),
                reply_to_remote: None,
            },
        },
    );
    let db = open_db();
    let importer = Importer::new(db.clone(), vec![adapter]);

    let content = importer.import(REPO_URI).await.unwrap();
    assert_eq!(content.embeds.len(), 1);

    let mapping = db
        .lock()
        .unwrap()
        .get_mapping(&content.id, Protocol::RepoProtocol)
        .unwrap()
        .unwrap();
    assert_eq!(mapping.remote_id.as_deref(), Some(REPO_URI));
    assert_eq!(mapping.remote_digest.as_deref(), Some("bafyfetched"));
}

#[tokio::test]
async fn import_emits_no_change_events() {
    let sink = Arc::new(RecordingSink::new());
    let db = Arc::new(Mutex::new(Database::open_in_memory(sink.clone()).unwrap()));
    let adapter = StaticAdapter::new(Protocol::ActivityProtocol);
    adapter.serve(
        ACTIVITY_URI,
        fetched(ACTIVITY_URI, "https://example.social/users/42", "quietly"),
    );
    let importer = Importer::new(db, vec![adapter]);

    importer.import(ACTIVITY_URI).await.unwrap();

    // The write went in through the import path, so nothing reaches the
    // change feed and the content cannot federate back out.
    assert!(sink.is_empty());
}

#[tokio::test]
async fn importing_same_reference_twice_updates_in_place() {
    let adapter = StaticAdapter::new(Protocol::ActivityProtocol);
    adapter.serve(
        ACTIVITY_URI,
        fetched(ACTIVITY_URI, "https://example.social/users/42", "first copy"),
    );
    let db = open_db();
    let importer = Importer::new(db.clone(), vec![adapter.clone()]);

    let first = importer.import(ACTIVITY_URI).await.unwrap();

    // The remote object was edited since the first import.
    adapter.serve(
        ACTIVITY_URI,
        fetched(ACTIVITY_URI, "https://example.social/users/42", "edited copy"),
    );
    let second = importer.import(ACTIVITY_URI).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.body, "edited copy");
    // First import wins for created_at; only the mutable fields refresh.
    assert_eq!(second.created_at, first.created_at);

    let stored = db.lock().unwrap().get_content(&first.id).unwrap().unwrap();
    assert_eq!(stored.body, "edited copy");
}

// ============================================================================
// Reply threading
// ============================================================================

#[tokio::test]
async fn imported_reply_links_to_known_parent() {
    let parent_remote = "https://example.social/users/7/statuses/1";
    let db = open_db();

    // A local item already federated out to the activity network.
    let parent = db
        .lock()
        .unwrap()
        .insert_content(&NewContent::new(
            AuthorId::from_string("author-1"),
            "parent post",
        ))
        .unwrap();
    db.lock()
        .unwrap()
        .mark_sync_success(
            &parent.id,
            Protocol::ActivityProtocol,
            &RemoteRef::new(parent_remote),
            parent.updated_at,
        )
        .unwrap();

    let adapter = StaticAdapter::new(Protocol::ActivityProtocol);
    let mut reply = fetched(ACTIVITY_URI, "https://example.social/users/42", "a reply");
    reply.draft.reply_to_remote = Some(parent_remote.to_string());
    adapter.serve(ACTIVITY_URI, reply);
    let importer = Importer::new(db, vec![adapter]);

    let content = importer.import(ACTIVITY_URI).await.unwrap();
    assert_eq!(content.reply_to_id.as_ref(), Some(&parent.id));
}

#[tokio::test]
async fn imported_reply_with_unknown_parent_is_top_level() {
    let adapter = StaticAdapter::new(Protocol::ActivityProtocol);
    let mut reply = fetched(ACTIVITY_URI, "https://example.social/users/42", "a reply");
    reply.draft.reply_to_remote = Some("https://elsewhere.example/users/9/statuses/3".to_string());
    adapter.serve(ACTIVITY_URI, reply);
    let db = open_db();
    let importer = Importer::new(db, vec![adapter]);

    let content = importer.import(ACTIVITY_URI).await.unwrap();
    assert!(content.reply_to_id.is_none());
}

// ============================================================================
// Failure surface
// ============================================================================

#[tokio::test]
async fn import_without_matching_adapter_is_rejected() {
    let db = open_db();
    let importer = Importer::new(db, vec![StaticAdapter::new(Protocol::ActivityProtocol)]);

    let err = importer.import(REPO_URI).await.unwrap_err();
    assert!(matches!(
        err,
        ImportError::NoAdapter(Protocol::RepoProtocol)
    ));
}

#[tokio::test]
async fn import_of_unresolvable_reference_is_rejected() {
    let db = open_db();
    let importer = Importer::new(db, vec![StaticAdapter::new(Protocol::ActivityProtocol)]);

    let err = importer.import("did:plc:xyz").await.unwrap_err();
    assert!(matches!(err, ImportError::UnsupportedReference(_)));
}

#[tokio::test]
async fn import_of_missing_remote_surfaces_fetch_error() {
    let adapter = StaticAdapter::new(Protocol::ActivityProtocol);
    let db = open_db();
    let importer = Importer::new(db.clone(), vec![adapter]);

    let err = importer.import(ACTIVITY_URI).await.unwrap_err();
    assert!(matches!(
        err,
        ImportError::Fetch(AdapterError::NotFound(_))
    ));

    // Nothing was written for the failed import.
    let content_id = derived_content_id(Protocol::ActivityProtocol, ACTIVITY_URI);
    let db = db.lock().unwrap();
    assert!(db.get_content(&content_id).unwrap().is_none());
    assert!(db
        .get_mapping(&content_id, Protocol::ActivityProtocol)
        .unwrap()
        .is_none());
}
