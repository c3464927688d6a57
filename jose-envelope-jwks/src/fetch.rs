//! JSON Web Key Set transport.
//!
//! The cache never reaches for the network on its own: it is handed a
//! [`JwksFetcher`]. [`HttpFetcher`] is the reqwest-backed default.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use jose_envelope_jwks::fetch::{HttpFetcher, JwksFetcher};
//! use jose_envelope_core::Result;
//!
//! async fn download() -> Result<()> {
//!     let fetcher = HttpFetcher::new()?;
//!     let document = fetcher
//!         .fetch("https://example.com/.well-known/jwks.json", Duration::from_secs(5), &[])
//!         .await?;
//!     println!("{document}");
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use jose_envelope_core::error::{Error, Result};
use reqwest::{header::ACCEPT, redirect, Client, StatusCode};
use serde_json::Value;
use tracing::debug;

/// Fetches a JSON Web Key Set document.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Fetches the JSON document at `url`.
    ///
    /// # Arguments
    ///
    /// * `url` - The JWK Set location
    /// * `timeout` - The per-request timeout
    /// * `headers` - Extra request headers
    ///
    /// # Errors
    /// * `Error::JwksTimeout` - The request timed out
    /// * `Error::Jose` - Any other transport or decoding failure
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
    ) -> Result<Value>;
}

/// HTTP(S) fetcher backed by a shared reqwest client.
///
/// Redirects are not followed.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with its own connection pool.
    ///
    /// # Errors
    /// * `Error::Jose` - If the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| Error::Jose(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn transport_error(error: &reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::JwksTimeout
    } else {
        Error::Jose(format!("JSON Web Key Set request failed: {error}"))
    }
}

#[async_trait]
impl JwksFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
    ) -> Result<Value> {
        debug!("Fetching JSON Web Key Set from {url}");

        let mut request = self
            .client
            .get(url)
            .timeout(timeout)
            .header(ACCEPT, "application/json");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| transport_error(&e))?;
        if response.status() != StatusCode::OK {
            return Err(Error::Jose(format!(
                "Expected 200 OK from the JSON Web Key Set HTTP response, got {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| transport_error(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fetch_document() {
        let server = MockServer::start().await;
        let document = json!({"keys": [{"kty": "oct", "k": "AAAA"}]});
        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .and(header("x-tenant", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let headers = vec![("x-tenant".to_string(), "acme".to_string())];
        let fetched = fetcher
            .fetch(&format!("{}/jwks.json", server.uri()), TIMEOUT, &headers)
            .await
            .unwrap();
        assert_eq!(fetched, document);
    }

    #[tokio::test]
    async fn test_non_200_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher
            .fetch(&format!("{}/jwks.json", server.uri()), TIMEOUT, &[])
            .await;
        assert!(matches!(result, Err(Error::Jose(_))));
    }

    #[tokio::test]
    async fn test_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher
            .fetch(&format!("{}/jwks.json", server.uri()), TIMEOUT, &[])
            .await;
        assert!(matches!(result, Err(Error::Jose(_))));
    }

    #[tokio::test]
    async fn test_redirect_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/jwks.json"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": []})))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher
            .fetch(&format!("{}/old", server.uri()), TIMEOUT, &[])
            .await;
        assert!(matches!(result, Err(Error::Jose(_))));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"keys": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher
            .fetch(&server.uri(), Duration::from_millis(50), &[])
            .await;
        assert!(matches!(result, Err(Error::JwksTimeout)));
    }
}
