//! `at://` URI handling.
//!
//! Repository-protocol records are addressed `at://{did}/{collection}/{rkey}`.

use federation_core::{AdapterError, AdapterResult};

/// Parsed components of an `at://` record URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtUri {
    pub did: String,
    pub collection: String,
    pub rkey: String,
}

impl AtUri {
    /// Parse a record URI of the form `at://{did}/{collection}/{rkey}`.
    pub fn parse(uri: &str) -> AdapterResult<Self> {
        let rest = uri
            .strip_prefix("at://")
            .ok_or_else(|| AdapterError::permanent(0, format!("not an at:// uri: {uri}")))?;

        let mut parts = rest.splitn(3, '/');
        let did = parts.next().unwrap_or_default();
        let collection = parts.next().unwrap_or_default();
        let rkey = parts.next().unwrap_or_default();

        if did.is_empty() || collection.is_empty() || rkey.is_empty() {
            return Err(AdapterError::permanent(
                0,
                format!("malformed record uri: {uri}"),
            ));
        }

        Ok(Self {
            did: did.to_string(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        })
    }
}

impl std::fmt::Display for AtUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at://{}/{}/{}", self.did, self.collection, self.rkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_record_uri() {
        let uri = AtUri::parse("at://did:plc:xyz/app.bsky.feed.post/abc").unwrap();
        assert_eq!(uri.did, "did:plc:xyz");
        assert_eq!(uri.collection, "app.bsky.feed.post");
        assert_eq!(uri.rkey, "abc");
    }

    #[test]
    fn round_trips_through_display() {
        let text = "at://did:plc:xyz/app.bsky.feed.post/abc";
        let uri = AtUri::parse(text).unwrap();
        assert_eq!(uri.to_string(), text);
    }

    #[test]
    fn rejects_wrong_scheme() {
        let result = AtUri::parse("https://example.social/users/42/statuses/99");
        assert!(matches!(result, Err(AdapterError::Permanent { .. })));
    }

    #[test]
    fn rejects_missing_segments() {
        assert!(AtUri::parse("at://did:plc:xyz").is_err());
        assert!(AtUri::parse("at://did:plc:xyz/app.bsky.feed.post").is_err());
        assert!(AtUri::parse("at://did:plc:xyz//abc").is_err());
    }
}
