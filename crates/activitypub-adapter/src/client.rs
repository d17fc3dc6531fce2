//! REST client for the activity-protocol home instance.

use crate::convert::{ActivityObject, NewStatus, Status};
use federation_core::{ActivityProtocolConfig, AdapterError, AdapterResult};
use std::time::Duration;
use tracing::debug;

/// Media type requested when fetching remote objects.
const ACTIVITY_JSON: &str = "application/activity+json";

/// REST client bound to one home instance.
#[derive(Clone)]
pub struct ActivityClient {
    http_client: reqwest::Client,
    base_url: String,
    access_token: String,
    timeout: Duration,
}

impl ActivityClient {
    pub fn new(config: &ActivityProtocolConfig, timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            timeout,
        }
    }

    fn statuses_url(&self) -> String {
        format!("{}/api/v1/statuses", self.base_url)
    }

    /// Post a new status on the home instance.
    pub async fn create_status(&self, status: &NewStatus) -> AdapterResult<Status> {
        debug!("Creating status on home instance");
        let response = self
            .http_client
            .post(self.statuses_url())
            .bearer_auth(&self.access_token)
            .json(status)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_transport)?;
        let response = check_response(response).await?;
        let created: Status = response.json().await.map_err(classify_transport)?;
        debug!(url = %created.url, "Status created");
        Ok(created)
    }

    /// Edit an existing status by instance-local id.
    pub async fn update_status(&self, id: &str, status: &NewStatus) -> AdapterResult<Status> {
        debug!(status_id = id, "Editing status on home instance");
        let response = self
            .http_client
            .put(format!("{}/{}", self.statuses_url(), id))
            .bearer_auth(&self.access_token)
            .json(status)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_transport)?;
        let response = check_response(response).await?;
        let updated: Status = response.json().await.map_err(classify_transport)?;
        debug!(url = %updated.url, "Status edited");
        Ok(updated)
    }

    /// Delete a status by instance-local id.
    pub async fn delete_status(&self, id: &str) -> AdapterResult<()> {
        debug!(status_id = id, "Deleting status on home instance");
        let response = self
            .http_client
            .delete(format!("{}/{}", self.statuses_url(), id))
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_transport)?;
        check_response(response).await?;
        Ok(())
    }

    /// Fetch an arbitrary remote object URL as activity JSON. Unlike the
    /// status endpoints this is not scoped to the home instance.
    pub async fn fetch_object(&self, url: &str) -> AdapterResult<ActivityObject> {
        debug!(url, "Fetching activity object");
        let response = self
            .http_client
            .get(url)
            .header("Accept", ACTIVITY_JSON)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_transport)?;
        let response = check_response(response).await?;
        response.json().await.map_err(classify_transport)
    }
}

impl std::fmt::Debug for ActivityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Extract the instance-local status id from a status URL (its last path
/// segment).
pub fn status_id_from_url(url: &str) -> AdapterResult<String> {
    let id = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    if !url.starts_with("http") || id.is_empty() || id.contains(':') {
        return Err(AdapterError::permanent(0, format!("not a status url: {url}")));
    }
    Ok(id.to_string())
}

fn classify_transport(err: reqwest::Error) -> AdapterError {
    if err.is_decode() {
        return AdapterError::permanent(
            err.status().map(|s| s.as_u16()).unwrap_or(0),
            format!("malformed response: {err}"),
        );
    }
    AdapterError::transient(format!("transport error: {err}"))
}

async fn check_response(response: reqwest::Response) -> AdapterResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

fn classify_status(status: reqwest::StatusCode, body: String) -> AdapterError {
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
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

    fn test_client() -> ActivityClient {
        let config = ActivityProtocolConfig {
            base_url: "https://example.social/".to_string(),
            access_token: "token".to_string(),
        };
        ActivityClient::new(&config, Duration::from_secs(10))
    }

    #[test]
    fn statuses_url_strips_trailing_slash() {
        let client = test_client();
        assert_eq!(client.statuses_url(), "https://example.social/api/v1/statuses");
    }

    #[test]
    fn status_id_extraction() {
        let id = status_id_from_url("https://example.social/users/42/statuses/99").unwrap();
        assert_eq!(id, "99");

        let id = status_id_from_url("https://example.social/users/42/statuses/99/").unwrap();
        assert_eq!(id, "99");
    }

    #[test]
    fn status_id_rejects_non_urls() {
        assert!(status_id_from_url("at://did:plc:xyz/app.bsky.feed.post/abc").is_err());
        assert!(status_id_from_url("https://").is_err());
    }

    #[test]
    fn gone_maps_to_not_found() {
        let err = classify_status(StatusCode::GONE, String::new());
        assert!(matches!(err, AdapterError::NotFound(_)));
    }

    #[test]
    fn rate_limit_is_transient() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string());
        assert!(err.is_transient());
    }

    #[test]
    fn validation_rejection_is_permanent() {
        let err = classify_status(StatusCode::UNPROCESSABLE_ENTITY, "too long".to_string());
        assert!(matches!(err, AdapterError::Permanent { status: 422, .. }));
    }

    #[test]
    fn debug_omits_token() {
        let client = test_client();
        let text = format!("{:?}", client);
        assert!(text.contains("example.social"));
        assert!(!text.contains("token"));
    }
}
