//! Mock adapter implementations
//!
//! Each mock records what it was asked and can be scripted to fail, so tests
//! can pin both the happy path and the degradation contracts.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::traits::{
    AdapterError, HttpAdapter, HttpResponse, PkceChallenge, PkceProvider, StorageAdapter,
};

/// In-memory [`StorageAdapter`] with scriptable failures
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
    fail_all: Mutex<bool>,
    failing_ops: Mutex<HashSet<&'static str>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value directly, bypassing the adapter contract
    pub fn seed(&self, key: &str, value: &str) {
        self.data.lock().insert(key.to_string(), value.to_string());
    }

    /// Read a value directly, bypassing the adapter contract
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    /// Drop all stored values
    pub fn clear(&self) {
        self.data.lock().clear();
    }

    /// Make every operation fail (or stop failing)
    pub fn fail_all(&self, failing: bool) {
        *self.fail_all.lock() = failing;
    }

    /// Make one operation fail: `set`, `get`, `remove`, or `remove_batch`
    pub fn fail_op(&self, op: &'static str, failing: bool) {
        let mut ops = self.failing_ops.lock();
        if failing {
            ops.insert(op);
        } else {
            ops.remove(op);
        }
    }

    fn check(&self, op: &str) -> Result<(), AdapterError> {
        if *self.fail_all.lock() || self.failing_ops.lock().contains(op) {
            Err(AdapterError::new(format!("storage {op} failed (scripted)")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn set(&self, key: &str, value: &str) -> Result<(), AdapterError> {
        self.check("set")?;
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AdapterError> {
        self.check("get")?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), AdapterError> {
        self.check("remove")?;
        self.data.lock().remove(key);
        Ok(())
    }

    async fn remove_batch(&self, keys: &[&str]) -> Result<(), AdapterError> {
        self.check("remove_batch")?;
        let mut data = self.data.lock();
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }
}

/// One request the mock HTTP adapter received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl RecordedRequest {
    /// Whether the form body carried an exact key/value pair
    #[must_use]
    pub fn has_param(&self, key: &str, value: &str) -> bool {
        self.params.iter().any(|(k, v)| k == key && v == value)
    }
}

/// Scripted [`HttpAdapter`] replaying queued responses in order
///
/// An unscripted request fails with a connection-style error, which keeps a
/// test honest about how many requests it expects.
#[derive(Default)]
pub struct MockHttp {
    responses: Mutex<VecDeque<Result<HttpResponse, AdapterError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttp {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next request
    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queue a connection-level failure for the next request
    pub fn push_error(&self, message: &str) {
        self.responses.lock().push_back(Err(AdapterError::new(message)));
    }

    /// The most recent request, if any
    #[must_use]
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }

    /// Every request received so far
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    fn next(&self) -> Result<HttpResponse, AdapterError> {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AdapterError::new("no scripted response")))
    }
}

#[async_trait]
impl HttpAdapter for MockHttp {
    async fn post_form(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, AdapterError> {
        self.requests
            .lock()
            .push(RecordedRequest { url: url.to_string(), params: params.to_vec() });
        self.next()
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, AdapterError> {
        self.requests
            .lock()
            .push(RecordedRequest { url: url.to_string(), params: Vec::new() });
        self.next()
    }
}

/// [`PkceProvider`] returning fixed values, optionally failing
pub struct FixedPkce {
    challenge: Option<PkceChallenge>,
    state: String,
    failure: Option<String>,
}

impl FixedPkce {
    #[must_use]
    pub fn new(challenge: &str, method: &str, verifier: &str, state: &str) -> Self {
        Self {
            challenge: Some(PkceChallenge {
                code_challenge: challenge.to_string(),
                code_challenge_method: method.to_string(),
                code_verifier: verifier.to_string(),
            }),
            state: state.to_string(),
            failure: None,
        }
    }

    /// A provider whose every call fails with the given message
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self { challenge: None, state: String::new(), failure: Some(message.to_string()) }
    }
}

#[async_trait]
impl PkceProvider for FixedPkce {
    async fn generate_challenge(&self) -> Result<PkceChallenge, AdapterError> {
        if let Some(message) = &self.failure {
            return Err(AdapterError::new(message.clone()));
        }
        self.challenge
            .clone()
            .ok_or_else(|| AdapterError::new("no challenge configured"))
    }

    async fn generate_state(&self) -> Result<String, AdapterError> {
        if let Some(message) = &self.failure {
            return Err(AdapterError::new(message.clone()));
        }
        Ok(self.state.clone())
    }
}

/// Convenience constructor bundle for coordinator-level tests
#[must_use]
pub fn adapters() -> (Arc<MemoryStorage>, Arc<MockHttp>, Arc<FixedPkce>) {
    (
        Arc::new(MemoryStorage::new()),
        Arc::new(MockHttp::new()),
        Arc::new(FixedPkce::new("c1", "S256", "v1", "s1")),
    )
}
