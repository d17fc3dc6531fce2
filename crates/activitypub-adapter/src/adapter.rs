//! [`ProtocolAdapter`] implementation for the activity protocol.

use crate::client::{status_id_from_url, ActivityClient};
use crate::convert;
use async_trait::async_trait;
use federation_core::{
    ActivityProtocolConfig, AdapterError, AdapterResult, CanonicalContent, FetchedContent,
    Protocol, ProtocolAdapter, PublishReceipt, RemoteRef, UpdateReceipt,
};
use std::time::Duration;

/// Activity-protocol adapter: statuses on an HTTP-addressed home instance.
#[derive(Debug, Clone)]
pub struct ActivityProtocolAdapter {
    client: ActivityClient,
}

impl ActivityProtocolAdapter {
    pub fn new(config: &ActivityProtocolConfig, timeout: Duration) -> Self {
        Self {
            client: ActivityClient::new(config, timeout),
        }
    }

    /// The parent reference handed over by the caller holds the parent's
    /// status URL; the instance API wants its local id.
    fn reply_ref(reply: Option<&RemoteRef>) -> AdapterResult<Option<RemoteRef>> {
        match reply {
            Some(parent) => Ok(Some(RemoteRef::new(status_id_from_url(&parent.id)?))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for ActivityProtocolAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::ActivityProtocol
    }

    async fn publish(
        &self,
        content: &CanonicalContent,
        reply: Option<&RemoteRef>,
    ) -> AdapterResult<PublishReceipt> {
        let reply = Self::reply_ref(reply)?;
        let (status, dropped) = convert::to_status(content, reply.as_ref());
        let created = self.client.create_status(&status).await?;
        Ok(PublishReceipt {
            remote: RemoteRef::new(created.url),
            dropped,
        })
    }

    async fn update(
        &self,
        remote: &RemoteRef,
        content: &CanonicalContent,
        reply: Option<&RemoteRef>,
    ) -> AdapterResult<UpdateReceipt> {
        let id = status_id_from_url(&remote.id)?;
        let reply = Self::reply_ref(reply)?;
        let (status, dropped) = convert::to_status(content, reply.as_ref());
        self.client.update_status(&id, &status).await?;
        Ok(UpdateReceipt {
            digest: None,
            dropped,
        })
    }

    async fn delete(&self, remote: &RemoteRef) -> AdapterResult<()> {
        let id = status_id_from_url(&remote.id)?;
        match self.client.delete_status(&id).await {
            Ok(()) => Ok(()),
            // Already gone counts as deleted
            Err(AdapterError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, uri: &str) -> AdapterResult<FetchedContent> {
        let object = self.client.fetch_object(uri).await?;
        let draft = convert::from_object(&object);
        Ok(FetchedContent {
            remote: RemoteRef::new(object.id),
            draft,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_reports_activity_protocol() {
        let adapter = ActivityProtocolAdapter::new(
            &ActivityProtocolConfig::default(),
            Duration::from_secs(10),
        );
        assert_eq!(adapter.protocol(), Protocol::ActivityProtocol);
    }

    #[test]
    fn reply_ref_extracts_status_id() {
        let parent = RemoteRef::new("https://example.social/users/42/statuses/99");
        let reply = ActivityProtocolAdapter::reply_ref(Some(&parent)).unwrap();
        assert_eq!(reply.unwrap().id, "99");

        assert!(ActivityProtocolAdapter::reply_ref(None).unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_rejects_malformed_remote_id() {
        let adapter = ActivityProtocolAdapter::new(
            &ActivityProtocolConfig::default(),
            Duration::from_secs(10),
        );
        let bad_remote = RemoteRef::new("at://did:plc:xyz/app.bsky.feed.post/abc");
        let result = adapter.delete(&bad_remote).await;
        assert!(matches!(result, Err(AdapterError::Permanent { .. })));
    }
}
