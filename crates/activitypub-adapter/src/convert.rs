//! Canonical content to activity-protocol conversion.
//!
//! Pure functions with no I/O. Outbound posts become status payloads for the
//! home instance API; inbound objects arrive as activity-stream notes. The
//! activity protocol carries both embed kinds, so conversion never drops
//! anything.

use chrono::{DateTime, Utc};
use federation_core::{AuthorId, CanonicalContent, ContentDraft, Embed, EmbedKind, RemoteRef};
use serde::{Deserialize, Serialize};

/// Payload for creating or editing a status on the home instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub media_attachments: Vec<NewAttachment>,
}

/// One attachment within a status payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttachment {
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Status returned by the instance API after a write.
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id: String,
    pub url: String,
}

/// An activity-stream object fetched from an arbitrary instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityObject {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(rename = "attributedTo", default)]
    pub attributed_to: Option<String>,
    #[serde(rename = "inReplyTo", default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub attachment: Vec<ObjectAttachment>,
}

/// One attachment on a fetched object.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectAttachment {
    pub url: String,
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Convert canonical content to a status payload.
///
/// `reply` carries the parent's instance-local status id when the content is
/// an already-federated reply; the adapter extracts it from the parent's
/// status URL before calling. The dropped-kind list is always empty for this
/// protocol; it is returned so both converters share a shape.
pub fn to_status(
    content: &CanonicalContent,
    reply: Option<&RemoteRef>,
) -> (NewStatus, Vec<EmbedKind>) {
    let media_attachments = content
        .embeds
        .iter()
        .map(|embed| NewAttachment {
            url: embed.uri.clone(),
            media_type: match embed.kind {
                EmbedKind::Image => "image".to_string(),
                EmbedKind::Attachment => "document".to_string(),
            },
            description: embed.alt_text.clone(),
        })
        .collect();

    let status = NewStatus {
        status: content.body.clone(),
        in_reply_to_id: reply.map(|parent| parent.id.clone()),
        media_attachments,
    };
    (status, Vec::new())
}

/// Convert a fetched activity object into a canonical content draft.
pub fn from_object(object: &ActivityObject) -> ContentDraft {
    let embeds = object
        .attachment
        .iter()
        .map(|attachment| {
            let is_image = attachment
                .media_type
                .as_deref()
                .map(|m| m.starts_with("image/"))
                .unwrap_or(false);
            if is_image {
                Embed::image(attachment.url.clone(), attachment.name.clone())
            } else {
                Embed::attachment(attachment.url.clone(), attachment.name.clone())
            }
        })
        .collect();

    ContentDraft {
        author: AuthorId::from_string(object.attributed_to.clone().unwrap_or_default()),
        body: object.content.clone(),
        embeds,
        created_at: object
            .published
            .as_deref()
            .map(parse_published)
            .unwrap_or_else(Utc::now),
        reply_to_remote: object.in_reply_to.clone(),
    }
}

fn parse_published(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
