//! Google Cloud REST client
//!
//! Provides `GoogleClient` for making API requests against one service
//! endpoint (Cloud Storage or BigQuery).

use super::Auth;
use crate::error::{Result, StageError};
use eyre::Context;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::time::Duration;
use url::Url;

/// HTTP client bound to one Google Cloud service endpoint.
///
/// # Example
/// ```no_run
/// use shopping_etl::client::{Auth, GoogleClient};
/// use url::Url;
///
/// # async fn example() -> eyre::Result<()> {
/// let url = Url::parse("https://bigquery.googleapis.com")?;
/// let client = GoogleClient::try_new(url, Auth::None)?;
///
/// let response = client
///     .get(&["bigquery", "v2", "projects", "my-project", "jobs", "job-1"], &[])
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct GoogleClient {
    client: Client,
    url: Url,
}

impl GoogleClient {
    /// Create a new client from a base URL and credentials.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the token is
    /// not a valid header value.
    pub fn try_new(url: Url, auth: Auth) -> eyre::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Auth::Bearer(token) = auth {
            let mut value: reqwest::header::HeaderValue = format!("Bearer {}", token)
                .parse()
                .context("Access token is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, url })
    }

    /// Get the base URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Build an endpoint URL from percent-encoded path segments.
    ///
    /// Each segment is encoded on its own, so object names containing `/`
    /// stay a single segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|_| StageError::connection(format!("{} cannot be a base URL", self.url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Start a request to an endpoint.
    pub fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<RequestBuilder> {
        let url = self.endpoint(segments)?;
        log::trace!("{} {}", method, url);
        Ok(self.client.request(method, url).query(query))
    }

    /// Send a request, mapping transport errors to `ConnectionFailure`.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| StageError::connection(format!("request to {} failed: {}", self.url, e)))
    }

    /// Helper for GET requests.
    pub async fn get(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Response> {
        let request = self.request(Method::GET, segments, query)?;
        self.send(request).await
    }

    /// Helper for POST requests with a raw body.
    pub async fn post_bytes(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<Response> {
        let request = self
            .request(Method::POST, segments, query)?
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        self.send(request).await
    }

    /// Helper for POST requests with JSON value.
    pub async fn post_json_value(
        &self,
        segments: &[&str],
        value: &serde_json::Value,
    ) -> Result<Response> {
        let request = self.request(Method::POST, segments, &[])?.json(value);
        self.send(request).await
    }
}

impl std::fmt::Display for GoogleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_each_segment() {
        let url = Url::parse("https://storage.googleapis.com").unwrap();
        let client = GoogleClient::try_new(url, Auth::None).unwrap();

        let endpoint = client
            .endpoint(&["storage", "v1", "b", "bucket", "o", "cleaned/data.parquet"])
            .unwrap();
        assert_eq!(
            endpoint.as_str(),
            "https://storage.googleapis.com/storage/v1/b/bucket/o/cleaned%2Fdata.parquet"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = Url::parse("http://localhost:4443/emulator/").unwrap();
        let client = GoogleClient::try_new(url, Auth::Bearer("t".into())).unwrap();

        let endpoint = client.endpoint(&["upload", "storage", "v1"]).unwrap();
        assert_eq!(endpoint.as_str(), "http://localhost:4443/emulator/upload/storage/v1");
    }
}
