//! In-memory transport that records requests instead of sending them

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use super::{Transport, TransportError, TransportResponse};

/// A request captured by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub url: String,
    pub payload: Value,
    /// True when sent through [`Transport::post_and_forget`]
    pub forget: bool,
}

#[derive(Debug, Default)]
struct State {
    requests: Vec<RecordedRequest>,
    responses: VecDeque<Result<TransportResponse, String>>,
    fail_all: Option<String>,
}

/// Transport that keeps every request in memory.
///
/// Clones share the same log, so a test can hand one clone to the client and
/// inspect the other. Synchronous posts answer with queued responses in order,
/// falling back to `200 {}` once the queue is empty.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose every `post` fails with a scripted error
    pub fn failing(reason: impl Into<String>) -> Self {
        let transport = Self::new();
        transport.lock().fail_all = Some(reason.into());
        transport
    }

    /// Queue a response for the next `post`
    pub fn push_response(&self, response: TransportResponse) {
        self.lock().responses.push_back(Ok(response));
    }

    /// Queue a JSON body with status 200 for the next `post`
    pub fn push_json(&self, body: &Value) {
        self.push_response(TransportResponse::new(200, body.to_string()));
    }

    /// Queue a failure for the next `post`
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.lock().responses.push_back(Err(reason.into()));
    }

    /// Snapshot of all requests seen so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Most recent request, if any
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.lock().requests.last().cloned()
    }

    pub fn clear(&self) {
        self.lock().requests.clear();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, url: &str, payload: &Value, forget: bool) {
        self.lock().requests.push(RecordedRequest {
            url: url.to_string(),
            payload: payload.clone(),
            forget,
        });
    }
}

impl Transport for MemoryTransport {
    fn post(&self, url: &str, payload: &Value) -> Result<TransportResponse, TransportError> {
        self.record(url, payload, false);

        let mut state = self.lock();
        if let Some(reason) = &state.fail_all {
            return Err(TransportError::Scripted(reason.clone()));
        }
        match state.responses.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(TransportError::Scripted(reason)),
            None => Ok(TransportResponse::new(200, "{}")),
        }
    }

    fn post_and_forget(&self, url: &str, payload: &Value) {
        self.record(url, payload, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_both_modes() {
        let transport = MemoryTransport::new();
        transport.post_and_forget("http://a/1", &json!({"a": 1}));
        transport.post("http://a/2", &json!({"b": 2})).unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].forget);
        assert!(!requests[1].forget);
        assert_eq!(requests[1].payload, json!({"b": 2}));
    }

    #[test]
    fn test_queued_responses_in_order() {
        let transport = MemoryTransport::new();
        transport.push_json(&json!({"n": 1}));
        transport.push_failure("boom");

        let first = transport.post("u", &json!({})).unwrap();
        assert_eq!(first.body, r#"{"n":1}"#);
        assert!(matches!(
            transport.post("u", &json!({})),
            Err(TransportError::Scripted(_))
        ));
        assert_eq!(transport.post("u", &json!({})).unwrap().body, "{}");
    }

    #[test]
    fn test_failing_transport() {
        let transport = MemoryTransport::failing("down");
        transport.push_json(&json!({}));
        assert!(transport.post("u", &json!({})).is_err());
        // forget never reports anything
        transport.post_and_forget("u", &json!({}));
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_clones_share_log() {
        let transport = MemoryTransport::new();
        let handle = transport.clone();
        transport.post_and_forget("u", &json!(null));
        assert_eq!(handle.requests().len(), 1);
        handle.clear();
        assert!(transport.last_request().is_none());
    }
}
