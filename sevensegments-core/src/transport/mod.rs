//! Transports that carry JSON payloads to the 7SEGMENTS API
//!
//! Every transport offers two delivery modes:
//! - [`Transport::post`] blocks until the server answers and returns the raw
//!   response, or a [`TransportError`] when the request could not be completed.
//! - [`Transport::post_and_forget`] sends the request and reports nothing.
//!   Failures are swallowed; callers using it have opted out of the outcome.
//!
//! Neither mode retries. A failed attempt is final for that call.
//!
//! ## Variants
//!
//! - [`HttpTransport`]: reqwest-backed client (default)
//! - [`SocketTransport`]: hand-written HTTP/1.1 over a TCP (or TLS) socket
//! - [`MemoryTransport`]: records requests in memory, for tests

mod http;
mod memory;
mod socket;

pub use http::HttpTransport;
pub use memory::{MemoryTransport, RecordedRequest};
pub use socket::{SocketTransport, DEFAULT_CONNECT_TIMEOUT};

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Why a transport could not complete a request
#[derive(Error, Debug)]
pub enum TransportError {
    /// Target URL could not be parsed or uses an unsupported scheme
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// TCP connection could not be established
    #[error("connection failed: {0}")]
    Connect(std::io::Error),

    /// TLS setup or handshake failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Writing the request failed
    #[error("write failed: {0}")]
    Write(std::io::Error),

    /// The stream stopped accepting bytes before the whole request was sent
    #[error("request truncated: wrote {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    /// Reading the response failed
    #[error("read failed: {0}")]
    Read(std::io::Error),

    /// Status line was missing or too short to be an HTTP response
    #[error("response too short ({0} bytes)")]
    ShortResponse(usize),

    /// Response could not be parsed as HTTP
    #[error("malformed HTTP response: {0}")]
    MalformedResponse(String),

    /// Response exceeded the size the transport is willing to buffer
    #[error("response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// HTTP client reported a failure
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// Payload could not be serialized
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Runtime backing the HTTP client could not be created
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Failure injected by [`MemoryTransport`]
    #[error("scripted failure: {0}")]
    Scripted(String),
}

/// Raw response returned by [`Transport::post`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, decoded as UTF-8 (lossy)
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Capability to deliver JSON payloads to a URL
pub trait Transport: Send + Sync {
    /// Send `payload` and wait for the server's answer.
    fn post(&self, url: &str, payload: &Value) -> Result<TransportResponse, TransportError>;

    /// Send `payload` without reporting the outcome.
    fn post_and_forget(&self, url: &str, payload: &Value);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn post(&self, url: &str, payload: &Value) -> Result<TransportResponse, TransportError> {
        (**self).post(url, payload)
    }

    fn post_and_forget(&self, url: &str, payload: &Value) {
        (**self).post_and_forget(url, payload)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn post(&self, url: &str, payload: &Value) -> Result<TransportResponse, TransportError> {
        (**self).post(url, payload)
    }

    fn post_and_forget(&self, url: &str, payload: &Value) {
        (**self).post_and_forget(url, payload)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post(&self, url: &str, payload: &Value) -> Result<TransportResponse, TransportError> {
        (**self).post(url, payload)
    }

    fn post_and_forget(&self, url: &str, payload: &Value) {
        (**self).post_and_forget(url, payload)
    }
}

/// Emit the per-request debug line shared by all transports.
pub(crate) fn log_request(debug: bool, transport: &'static str, url: &str, payload: &Value) {
    if debug {
        tracing::debug!(transport, url = %url, payload = %payload, "Sending request");
    }
}
