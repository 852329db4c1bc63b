use crate::{requests, responses};
use reqwest::StatusCode;
use reqwest::header::CONTENT_RANGE;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

type ReqwestResult = Result<reqwest::Response, reqwest::Error>;

/// An API client for the managed record store (PostgREST dialect).
pub struct APIClient {
    pub address: String,
    /// Project key sent as the `apikey` header on every request.
    pub api_key: SecretString,
    /// Session token of the signed-in user. Falls back to the project key
    /// when absent.
    pub access_token: Option<SecretString>,
    pub inner_client: reqwest::Client,
}

/// Helper methods for http actions
impl APIClient {
    pub fn new(address: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            address: address.into(),
            api_key,
            access_token: None,
            inner_client: reqwest::Client::new(),
        }
    }

    pub fn with_access_token(mut self, token: SecretString) -> Self {
        self.access_token = Some(token);
        self
    }

    fn format_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.address.trim_end_matches('/'))
    }

    fn bearer(&self) -> String {
        let token = self.access_token.as_ref().unwrap_or(&self.api_key);
        format!("Bearer {}", token.expose_secret())
    }

    async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> ReqwestResult {
        let request = self
            .inner_client
            .get(self.format_url(path))
            .query(params)
            .header("apikey", self.api_key.expose_secret())
            .header("Authorization", self.bearer())
            .header("Prefer", "count=exact");

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request.send().await
    }
}

/// Methods on the record store API
impl APIClient {
    pub async fn health_check(&self) -> Result<(), ClientError> {
        let response = self.get("", &[]).await?;
        ok_empty(response).await
    }

    /// Read one page of a collection along with the total matching count.
    pub async fn query_records(
        &self,
        query: &requests::RecordQuery,
    ) -> Result<responses::RecordPage<Value>, ClientError> {
        let response =
            self.get(query.table.as_str(), &query.query_pairs()).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let rows: Vec<Value> = response.json().await?;

        let total = match content_range {
            Some(header) => match parse_content_range_total(&header) {
                Ok(Some(total)) => total,
                Ok(None) => query.offset + rows.len() as u64,
                Err(e) => return Err(e),
            },
            None => query.offset + rows.len() as u64,
        };

        Ok(responses::RecordPage { rows, total })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An error response from the record store.
    #[error("{1}")]
    APIError(StatusCode, responses::BackendError),
    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),
    #[error("Malformed Content-Range header: {0}")]
    InvalidContentRange(String),
}

/// Parse the total from a `Content-Range` header such as `0-19/45` or `*/0`.
///
/// Returns `Ok(None)` when the backend reports the total as unknown (`*`).
pub fn parse_content_range_total(
    header: &str,
) -> Result<Option<u64>, ClientError> {
    let invalid = || ClientError::InvalidContentRange(header.to_string());
    let (_, total) = header.trim().rsplit_once('/').ok_or_else(invalid)?;
    if total == "*" {
        return Ok(None);
    }
    total.parse().map(Some).map_err(|_| invalid())
}

/// Build a ClientError from a failed response, keeping the backend's error
/// body when it is well formed.
async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return ClientError::Network(e),
    };
    let body = serde_json::from_str::<responses::BackendError>(&text)
        .unwrap_or_else(|_| responses::BackendError {
            code: None,
            message: text,
            details: None,
            hint: None,
        });
    ClientError::APIError(status, body)
}

/// Check that an empty response is OK, returning a ClientError if not.
pub async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(())
}
