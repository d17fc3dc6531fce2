//! XRPC client for the repository protocol service.

use crate::convert::PostRecord;
use crate::uri::AtUri;
use federation_core::{AdapterError, AdapterResult, RepoProtocolConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    repo: &'a str,
    collection: &'a str,
    record: &'a PostRecord,
}

#[derive(Debug, Serialize)]
struct PutRecordRequest<'a> {
    repo: &'a str,
    collection: &'a str,
    rkey: &'a str,
    record: &'a PostRecord,
}

#[derive(Debug, Serialize)]
struct DeleteRecordRequest<'a> {
    repo: &'a str,
    collection: &'a str,
    rkey: &'a str,
}

/// `{uri, cid}` pair returned by record writes.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordRef {
    pub uri: String,
    pub cid: String,
}

/// Response of `getRecord`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetRecordResponse {
    pub uri: String,
    pub cid: Option<String>,
    pub value: PostRecord,
}

/// XRPC client scoped to one repository and collection.
#[derive(Clone)]
pub struct RepoClient {
    http_client: reqwest::Client,
    service_url: String,
    repo_did: String,
    collection: String,
    access_token: String,
    timeout: Duration,
}

impl RepoClient {
    pub fn new(config: &RepoProtocolConfig, timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            service_url: config.service_url.trim_end_matches('/').to_string(),
            repo_did: config.repo_did.clone(),
            collection: config.collection.clone(),
            access_token: config.access_token.clone(),
            timeout,
        }
    }

    /// The collection records are written under.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Build the XRPC URL for a method.
    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service_url, method)
    }

    /// Create a new record, returning its `{uri, cid}`.
    pub async fn create_record(&self, record: &PostRecord) -> AdapterResult<RecordRef> {
        let url = self.xrpc_url("com.atproto.repo.createRecord");
        let body = CreateRecordRequest {
            repo: &self.repo_did,
            collection: &self.collection,
            record,
        };

        debug!(repo = %self.repo_did, "Creating repository record");
        let response = self.post(&url, &body).await?;
        let created: RecordRef = response.json().await.map_err(classify_transport)?;
        debug!(uri = %created.uri, "Repository record created");
        Ok(created)
    }

    /// Overwrite the record at `rkey`, returning the new `{uri, cid}`.
    pub async fn put_record(&self, rkey: &str, record: &PostRecord) -> AdapterResult<RecordRef> {
        let url = self.xrpc_url("com.atproto.repo.putRecord");
        let body = PutRecordRequest {
            repo: &self.repo_did,
            collection: &self.collection,
            rkey,
            record,
        };

        debug!(repo = %self.repo_did, rkey, "Updating repository record");
        let response = self.post(&url, &body).await?;
        let updated: RecordRef = response.json().await.map_err(classify_transport)?;
        debug!(uri = %updated.uri, "Repository record updated");
        Ok(updated)
    }

    /// Delete the record at `rkey`.
    pub async fn delete_record(&self, rkey: &str) -> AdapterResult<()> {
        let url = self.xrpc_url("com.atproto.repo.deleteRecord");
        let body = DeleteRecordRequest {
            repo: &self.repo_did,
            collection: &self.collection,
            rkey,
        };

        debug!(repo = %self.repo_did, rkey, "Deleting repository record");
        self.post(&url, &body).await?;
        Ok(())
    }

    /// Fetch a record by full URI. The URI's own repo and collection are
    /// used, so records outside the configured repository can be fetched.
    pub async fn get_record(&self, uri: &AtUri) -> AdapterResult<GetRecordResponse> {
        let url = self.xrpc_url("com.atproto.repo.getRecord");

        debug!(uri = %uri, "Fetching repository record");
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("repo", uri.did.as_str()),
                ("collection", uri.collection.as_str()),
                ("rkey", uri.rkey.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_transport)?;
        let response = check_response(response).await?;
        response.json().await.map_err(classify_transport)
    }

    async fn post<T: Serialize>(&self, url: &str, body: &T) -> AdapterResult<reqwest::Response> {
        let response = self
            .http_client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_transport)?;
        check_response(response).await
    }
}

impl std::fmt::Debug for RepoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoClient")
            .field("service_url", &self.service_url)
            .field("repo_did", &self.repo_did)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// Classify a transport-level failure for retry eligibility.
fn classify_transport(err: reqwest::Error) -> AdapterError {
    if err.is_decode() {
        return AdapterError::permanent(
            err.status().map(|s| s.as_u16()).unwrap_or(0),
            format!("malformed response: {err}"),
        );
    }
    AdapterError::transient(format!("transport error: {err}"))
}

/// Map a non-success status to the error taxonomy.
///
/// The service reports a missing record as a 400 with `RecordNotFound` in
/// the body rather than a 404; both are mapped to `NotFound`.
async fn check_response(response: reqwest::Response) -> AdapterResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

fn classify_status(status: reqwest::StatusCode, body: String) -> AdapterError {
    if status == reqwest::StatusCode::NOT_FOUND || body.contains("RecordNotFound") {
        return AdapterError::NotFound(body);
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AdapterError::transient(format!("{}: {}", status.as_u16(), body));
    }
    AdapterError::permanent(status.as_u16(), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn test_client() -> RepoClient {
        let config = RepoProtocolConfig {
            service_url: "https://pds.example/".to_string(),
            repo_did: "did:plc:xyz".to_string(),
            collection: "app.bsky.feed.post".to_string(),
            access_token: "token".to_string(),
        };
        RepoClient::new(&config, Duration::from_secs(10))
    }

    #[test]
    fn xrpc_url_strips_trailing_slash() {
        let client = test_client();
        assert_eq!(
            client.xrpc_url("com.atproto.repo.createRecord"),
            "https://pds.example/xrpc/com.atproto.repo.createRecord"
        );
    }

    #[test]
    fn server_errors_classify_transient() {
        let err = classify_status(StatusCode::BAD_GATEWAY, "upstream down".to_string());
        assert!(err.is_transient());

        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string());
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_classify_permanent() {
        let err = classify_status(StatusCode::UNPROCESSABLE_ENTITY, "too long".to_string());
        assert!(matches!(err, AdapterError::Permanent { status: 422, .. }));
    }

    #[test]
    fn record_not_found_body_maps_to_not_found() {
        let body = r#"{"error":"RecordNotFound","message":"Could not locate record"}"#;
        let err = classify_status(StatusCode::BAD_REQUEST, body.to_string());
        assert!(matches!(err, AdapterError::NotFound(_)));

        let err = classify_status(StatusCode::NOT_FOUND, String::new());
        assert!(matches!(err, AdapterError::NotFound(_)));
    }

    #[test]
    fn debug_omits_token() {
        let client = test_client();
        let text = format!("{:?}", client);
        assert!(text.contains("pds.example"));
        assert!(!text.contains("token"));
    }
}
