//! Adapter capability traits
//!
//! The core embeds no storage, network, or cryptographic primitives. These
//! traits are the seams where hosts inject them; the core only ever calls
//! their contracts and never outlives or mutates the adapters beyond that.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::keys;

/// Failure raised by an injected adapter
///
/// Deliberately opaque: the core wraps it into its own typed errors at each
/// component boundary, except on the documented raw read paths.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct AdapterError(String);

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Structured token record for the batched storage write variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    /// Absolute expiry, epoch milliseconds
    pub expiry_ms: Option<i64>,
}

/// Key-value storage capability
///
/// Holds tokens, PKCE material, and CSRF state under the fixed keys in
/// [`crate::keys`]. Implementations must be safe for repeated calls with the
/// same key; `remove` of an absent key is not an error.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Store a value under a key, replacing any prior value
    ///
    /// # Errors
    /// Returns error if the underlying store rejects the write
    async fn set(&self, key: &str, value: &str) -> Result<(), AdapterError>;

    /// Read a value, `None` if absent
    ///
    /// # Errors
    /// Returns error if the underlying store cannot be read
    async fn get(&self, key: &str) -> Result<Option<String>, AdapterError>;

    /// Remove a single key
    ///
    /// # Errors
    /// Returns error if the underlying store rejects the removal
    async fn remove(&self, key: &str) -> Result<(), AdapterError>;

    /// Remove several keys in one operation
    ///
    /// # Errors
    /// Returns error if the underlying store rejects the removal
    async fn remove_batch(&self, keys: &[&str]) -> Result<(), AdapterError>;

    /// Store a token record as its discrete keys
    ///
    /// Default implementation writes `access_token`, `refresh_token`,
    /// `token_type`, and `token_expiry`, removing the optional keys when
    /// the record omits them so stale values cannot leak across logins.
    ///
    /// # Errors
    /// Returns error if any underlying write fails
    async fn set_token_record(&self, record: &TokenRecord) -> Result<(), AdapterError> {
        self.set(keys::ACCESS_TOKEN, &record.access_token).await?;
        match &record.refresh_token {
            Some(refresh) => self.set(keys::REFRESH_TOKEN, refresh).await?,
            None => self.remove(keys::REFRESH_TOKEN).await?,
        }
        match &record.token_type {
            Some(token_type) => self.set(keys::TOKEN_TYPE, token_type).await?,
            None => self.remove(keys::TOKEN_TYPE).await?,
        }
        match record.expiry_ms {
            Some(expiry) => self.set(keys::TOKEN_EXPIRY, &expiry.to_string()).await?,
            None => self.remove(keys::TOKEN_EXPIRY).await?,
        }
        Ok(())
    }
}

/// Response returned by the HTTP capability
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Response headers, lower-cased names
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into(), headers: HashMap::new() }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header lookup by lower-cased name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// HTTP transport capability for the authorization-server endpoints
#[async_trait]
pub trait HttpAdapter: Send + Sync {
    /// POST a URL-encoded form body
    ///
    /// # Errors
    /// Returns error on connection-level failure; non-2xx responses are
    /// returned as an [`HttpResponse`], not an error
    async fn post_form(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, AdapterError>;

    /// GET a URL
    ///
    /// # Errors
    /// Returns error on connection-level failure
    async fn get(&self, url: &str) -> Result<HttpResponse, AdapterError>;
}

/// PKCE challenge triple produced by the crypto capability
///
/// The verifier is secret: it is persisted locally and only ever transmitted
/// at the token-exchange step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub code_verifier: String,
}

/// Cryptographic capability producing PKCE material and CSRF state secrets
#[async_trait]
pub trait PkceProvider: Send + Sync {
    /// Produce a fresh challenge/method/verifier triple
    ///
    /// # Errors
    /// Returns error if random generation fails
    async fn generate_challenge(&self) -> Result<PkceChallenge, AdapterError>;

    /// Produce a random opaque state string
    ///
    /// # Errors
    /// Returns error if random generation fails
    async fn generate_state(&self) -> Result<String, AdapterError>;
}

impl fmt::Display for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print token material
        write!(
            f,
            "TokenRecord(refresh: {}, type: {:?}, expiry_ms: {:?})",
            self.refresh_token.is_some(),
            self.token_type,
            self.expiry_ms
        )
    }
}
