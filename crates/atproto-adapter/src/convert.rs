//! Canonical content to repository-protocol record conversion.
//!
//! Pure functions with no I/O. The repository protocol carries image embeds
//! only; generic attachments are dropped and the dropped kinds are reported
//! to the caller so the job result can surface them.

use chrono::{DateTime, Utc};
use federation_core::{AuthorId, CanonicalContent, ContentDraft, Embed, EmbedKind, RemoteRef};
use serde::{Deserialize, Serialize};

/// Record type written into every post record.
pub const POST_RECORD_TYPE: &str = "app.bsky.feed.post";

/// Embed type for the image embed block.
pub const IMAGE_EMBED_TYPE: &str = "app.bsky.embed.images";

/// A post record as stored in the remote repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<ImageEmbedBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyBlock>,
}

/// The image embed block of a post record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEmbedBlock {
    #[serde(rename = "$type")]
    pub embed_type: String,
    pub images: Vec<RecordImage>,
}

/// One image within an embed block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordImage {
    pub image: String,
    #[serde(default)]
    pub alt: String,
}

/// Reply references of a post record. `root` and `parent` are both the
/// direct parent here; thread-root tracking is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyBlock {
    pub root: StrongRef,
    pub parent: StrongRef,
}

/// A content-addressed reference: record URI plus digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

/// Convert canonical content to a post record.
///
/// Returns the record and the embed kinds dropped by conversion. `reply` is
/// the parent's remote reference when the content is an already-federated
/// reply.
pub fn to_record(
    content: &CanonicalContent,
    reply: Option<&RemoteRef>,
) -> (PostRecord, Vec<EmbedKind>) {
    let mut images = Vec::new();
    let mut dropped = Vec::new();
    for embed in &content.embeds {
        match embed.kind {
            EmbedKind::Image => images.push(RecordImage {
                image: embed.uri.clone(),
                alt: embed.alt_text.clone().unwrap_or_default(),
            }),
            EmbedKind::Attachment => {
                if !dropped.contains(&EmbedKind::Attachment) {
                    dropped.push(EmbedKind::Attachment);
                }
            }
        }
    }

    let embed = if images.is_empty() {
        None
    } else {
        Some(ImageEmbedBlock {
            embed_type: IMAGE_EMBED_TYPE.to_string(),
            images,
        })
    };

    let reply = reply.map(|parent| {
        let strong = StrongRef {
            uri: parent.id.clone(),
            cid: parent.digest.clone(),
        };
        ReplyBlock {
            root: strong.clone(),
            parent: strong,
        }
    });

    let record = PostRecord {
        record_type: POST_RECORD_TYPE.to_string(),
        text: content.body.clone(),
        created_at: content.created_at.to_rfc3339(),
        embed,
        reply,
    };
    (record, dropped)
}

/// Convert a fetched post record into a canonical content draft.
///
/// `author_did` comes from the record's URI; repository records do not carry
/// the author inline.
pub fn from_record(record: &PostRecord, author_did: &str) -> ContentDraft {
    let embeds = record
        .embed
        .as_ref()
        .map(|block| {
            block
                .images
                .iter()
                .map(|image| {
                    let alt = if image.alt.is_empty() {
                        None
                    } else {
                        Some(image.alt.clone())
                    };
                    Embed::image(image.image.clone(), alt)
                })
                .collect()
        })
        .unwrap_or_default();

    ContentDraft {
        author: AuthorId::from_string(author_did),
        body: record.text.clone(),
        embeds,
        created_at: parse_created_at(&record.created_at),
        reply_to_remote: record.reply.as_ref().map(|r| r.parent.uri.clone()),
    }
}

fn parse_created_at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
