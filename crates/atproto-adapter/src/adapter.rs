//! [`ProtocolAdapter`] implementation for the repository protocol.

use crate::client::RepoClient;
use crate::convert;
use crate::uri::AtUri;
use async_trait::async_trait;
use federation_core::{
    AdapterError, AdapterResult, CanonicalContent, FetchedContent, Protocol, ProtocolAdapter,
    PublishReceipt, RemoteRef, RepoProtocolConfig, UpdateReceipt,
};
use std::time::Duration;

/// Repository-protocol adapter: content-addressed records in a remote repo.
#[derive(Debug, Clone)]
pub struct RepoProtocolAdapter {
    client: RepoClient,
}

impl RepoProtocolAdapter {
    pub fn new(config: &RepoProtocolConfig, timeout: Duration) -> Self {
        Self {
            client: RepoClient::new(config, timeout),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for RepoProtocolAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::RepoProtocol
    }

    async fn publish(
        &self,
        content: &CanonicalContent,
        reply: Option<&RemoteRef>,
    ) -> AdapterResult<PublishReceipt> {
        let (record, dropped) = convert::to_record(content, reply);
        let created = self.client.create_record(&record).await?;
        Ok(PublishReceipt {
            remote: RemoteRef::with_digest(created.uri, created.cid),
            dropped,
        })
    }

    async fn update(
        &self,
        remote: &RemoteRef,
        content: &CanonicalContent,
        reply: Option<&RemoteRef>,
    ) -> AdapterResult<UpdateReceipt> {
        let uri = AtUri::parse(&remote.id)?;
        let (record, dropped) = convert::to_record(content, reply);
        let updated = self.client.put_record(&uri.rkey, &record).await?;
        Ok(UpdateReceipt {
            digest: Some(updated.cid),
            dropped,
        })
    }

    async fn delete(&self, remote: &RemoteRef) -> AdapterResult<()> {
        let uri = AtUri::parse(&remote.id)?;
        match self.client.delete_record(&uri.rkey).await {
            Ok(()) => Ok(()),
            // Already gone counts as deleted
            Err(AdapterError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, uri: &str) -> AdapterResult<FetchedContent> {
        let at_uri = AtUri::parse(uri)?;
        let response = self.client.get_record(&at_uri).await?;
        let draft = convert::from_record(&response.value, &at_uri.did);
        let remote = match response.cid {
            Some(cid) => RemoteRef::with_digest(response.uri, cid),
            None => RemoteRef::new(response.uri),
        };
        Ok(FetchedContent { remote, draft })
    }
}
