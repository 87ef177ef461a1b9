//! reqwest-backed transport
//!
//! reqwest is async, so the transport owns a current-thread tokio runtime and
//! blocks on each request. Do not call it from inside another tokio runtime.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;

use super::{log_request, Transport, TransportError, TransportResponse};

/// Transport that posts through a reqwest HTTP client
pub struct HttpTransport {
    http_client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    debug: bool,
}

impl HttpTransport {
    /// Create a transport using the platform default timeouts
    pub fn new(debug: bool) -> Result<Self, TransportError> {
        Self::with_timeout(debug, None)
    }

    /// Create a transport with an optional overall request timeout
    pub fn with_timeout(debug: bool, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Runtime(format!("failed to create runtime: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            runtime,
            debug,
        })
    }

    async fn send(&self, url: &str, body: String) -> Result<TransportResponse, TransportError> {
        let response = self
            .http_client
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("failed to read response: {}", e)))?;

        Ok(TransportResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &str, payload: &Value) -> Result<TransportResponse, TransportError> {
        log_request(self.debug, "http", url, payload);
        let body = serde_json::to_string(payload)?;

        let result = self.runtime.block_on(self.send(url, body));
        if self.debug {
            match &result {
                Ok(response) => tracing::debug!(url = %url, status = response.status, "Request completed"),
                Err(e) => tracing::debug!(url = %url, error = %e, "Request failed"),
            }
        }
        result
    }

    fn post_and_forget(&self, url: &str, payload: &Value) {
        // reqwest gives no way to stop after the request is flushed, so the
        // answer is awaited and dropped.
        let _ = self.post(url, payload);
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds() {
        assert!(HttpTransport::new(false).is_ok());
        assert!(HttpTransport::with_timeout(true, Some(Duration::from_secs(5))).is_ok());
    }

    #[test]
    fn test_unreachable_host_is_error_not_panic() {
        let transport = HttpTransport::with_timeout(false, Some(Duration::from_secs(2))).unwrap();
        let result = transport.post("http://127.0.0.1:1/crm/events", &serde_json::json!({}));
        assert!(matches!(result, Err(TransportError::Request(_))));
        transport.post_and_forget("http://127.0.0.1:1/crm/events", &serde_json::json!({}));
    }

    #[test]
    fn test_invalid_url_is_error() {
        let transport = HttpTransport::new(false).unwrap();
        assert!(transport.post("not a url", &serde_json::json!({})).is_err());
    }
}
