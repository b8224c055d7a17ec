//! Core OAuth types and structures
//!
//! Defines the data carried through the orchestration pipelines: token sets,
//! token endpoint responses, callback parameters, flow results, and the
//! authentication status machine.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth 2.0 access and refresh tokens with metadata
///
/// The access token is the only required field; providers differ on whether
/// they issue refresh tokens, lifetimes, or scope echoes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token for API authentication
    pub access_token: String,

    /// Refresh token for obtaining new access tokens
    /// Optional because some OAuth providers don't issue them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Access token lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Token type (usually "Bearer")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Granted scopes (space-separated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// When the token was issued, stamped at construction when a lifetime is
    /// present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Create a new `TokenSet`, stamping `issued_at` when a lifetime is known
    #[must_use]
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: Option<i64>) -> Self {
        let issued_at = expires_in.map(|_| Utc::now());
        Self { access_token, refresh_token, expires_in, token_type: None, scope: None, issued_at }
    }

    /// Absolute expiration timestamp, derived from `issued_at + expires_in`
    ///
    /// When a lifetime is present but no issuance time was recorded, the
    /// issuance time is assumed to be "now". This is a known approximation:
    /// re-deriving at read time can understate remaining lifetime across
    /// retries.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let lifetime = chrono::Duration::seconds(self.expires_in?);
        Some(self.issued_at.unwrap_or_else(Utc::now) + lifetime)
    }

    /// Check whether the access token is expired
    ///
    /// The boundary is inclusive: a token is expired at exactly
    /// `issued_at + expires_in`. Tokens with no known lifetime never expire.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at() {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }

    /// Time remaining until expiration, zero if already past
    ///
    /// Returns `None` when the token has no known lifetime.
    #[must_use]
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let expires_at = self.expires_at()?;
        let remaining = expires_at - Utc::now();
        Some(remaining.to_std().unwrap_or(Duration::ZERO))
    }
}

/// OAuth token response from the authorization server
///
/// Standard OAuth 2.0 token response format (RFC 6749). `access_token` is
/// required; a response without one is a malformed body.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        let mut tokens =
            Self::new(response.access_token, response.refresh_token, response.expires_in);
        tokens.token_type = response.token_type;
        tokens.scope = response.scope;
        tokens
    }
}

/// Outcome of a flow handler execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthResult {
    /// Whether the flow produced tokens
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Human-readable failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Machine-readable failure code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl OAuthResult {
    /// Build a success result from an issued token set
    #[must_use]
    pub fn success(tokens: &TokenSet) -> Self {
        Self {
            success: true,
            access_token: Some(tokens.access_token.clone()),
            refresh_token: tokens.refresh_token.clone(),
            expires_in: tokens.expires_in,
            error: None,
            error_code: None,
        }
    }

    /// Build a failure result with a message and machine-readable code
    #[must_use]
    pub fn failure(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            access_token: None,
            refresh_token: None,
            expires_in: None,
            error: Some(message.into()),
            error_code: Some(code.into()),
        }
    }
}

/// Raw parameters received on an authentication callback
///
/// A thin wrapper over a key-value map, buildable from either a pre-parsed
/// collection or a raw query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    params: HashMap<String, String>,
}

impl CallbackParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string (`code=abc&state=xyz`), percent-decoding both
    /// keys and values; `+` decodes to a space
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let mut params = HashMap::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| {
                let s = s.replace('+', " ");
                urlencoding::decode(&s).map(|c| c.into_owned()).unwrap_or(s)
            };
            params.insert(decode(key), decode(value));
        }
        Self { params }
    }

    /// Insert or replace a parameter (builder-style)
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate over all parameters
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { params: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

/// Authentication status exposed by the coordinator
///
/// This is a notification surface, not a guarded state machine: any state may
/// move to any other, and observers rely on emitted events rather than a
/// transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
    Expired,
    Error,
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
            Self::Expired => "expired",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}
