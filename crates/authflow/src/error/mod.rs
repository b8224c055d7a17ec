//! Error taxonomy for the orchestration core
//!
//! Errors form a closed taxonomy rooted in [`AuthFlowError`], with one branch
//! per concern: network, token, config, validation, and flow. Every error
//! exposes a stable machine-readable code, its taxonomy branch, retryability,
//! an optional HTTP status, and structured metadata for logging.
//!
//! Propagation policy: adapter-originated failures are wrapped into the
//! appropriate branch at the boundary of the component that called the
//! adapter. Two deliberate exceptions exist: the token manager's plain
//! getters let [`crate::traits::AdapterError`] through unwrapped, and the
//! state validator's `is_state_expired`/`has_stored_state` degrade to a safe
//! boolean instead of raising.

mod aliases;

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

pub use aliases::canonical_code;

/// Standard result type for core operations
pub type AuthFlowResult<T> = Result<T, AuthFlowError>;

/// Taxonomy branch of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Network,
    Token,
    Config,
    Validation,
    Flow,
}

impl ErrorType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Token => "token",
            Self::Config => "config",
            Self::Validation => "validation",
            Self::Flow => "flow",
        }
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

/// Classification interface shared by every taxonomy branch
pub trait ErrorClassification {
    /// Check if this error is retryable
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;

    /// Check if this error requires immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}

/// HTTP and connection failures
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// Connection-level failure before a response was received
    #[error("connection failed: {0}")]
    Connection(String),

    /// Non-success status from an endpoint
    #[error("endpoint '{endpoint}' returned HTTP {status}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        /// Parsed OAuth error payload when the body was JSON
        error_payload: Option<serde_json::Value>,
        /// Delay requested by a Retry-After header, seconds
        retry_after_secs: Option<u64>,
    },

    /// Response body could not be parsed into the expected shape
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

impl NetworkError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "network_connection_failed",
            Self::HttpStatus { .. } => "network_http_error",
            Self::MalformedBody(_) => "network_malformed_body",
        }
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Computed retry delay for a given attempt number
    ///
    /// Honors a Retry-After header when the server sent one, otherwise
    /// exponential backoff (500ms base, doubled per attempt, capped at 30s).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if let Self::HttpStatus { retry_after_secs: Some(secs), .. } = self {
            return Duration::from_secs(*secs);
        }
        let exp = attempt.min(6);
        Duration::from_millis(500u64.saturating_mul(1 << exp)).min(Duration::from_secs(30))
    }
}

impl ErrorClassification for NetworkError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            // Server-side and throttling statuses may succeed on retry;
            // other 4xx will not
            Self::HttpStatus { status, .. } => {
                *status >= 500 || matches!(status, 429 | 408)
            }
            Self::MalformedBody(_) => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(_) => ErrorSeverity::Warning,
            Self::HttpStatus { status, .. } if *status == 429 => ErrorSeverity::Warning,
            Self::HttpStatus { .. } => ErrorSeverity::Error,
            Self::MalformedBody(_) => ErrorSeverity::Error,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }
        Some(self.retry_delay(0))
    }
}

/// Token lifecycle failures
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error("access token expired")]
    Expired,

    #[error("access token invalid: {0}")]
    Invalid(String),

    #[error("no access token available")]
    Missing,

    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("insufficient scope: requires '{required}'")]
    InsufficientScope { required: String },

    #[error("failed to persist tokens during '{operation}': {message}")]
    PersistFailed { operation: String, message: String },
}

impl TokenError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Expired => "token_expired",
            Self::Invalid(_) => "token_invalid",
            Self::Missing => "token_missing",
            Self::MissingRefreshToken => "refresh_token_missing",
            Self::RefreshFailed(_) => "token_refresh_failed",
            Self::InsufficientScope { .. } => "token_insufficient_scope",
            Self::PersistFailed { .. } => "token_persist_failed",
        }
    }
}

impl ErrorClassification for TokenError {
    fn is_retryable(&self) -> bool {
        // Access-token problems are recoverable through a refresh;
        // refresh-token problems require a new login
        match self {
            Self::Expired | Self::Invalid(_) | Self::Missing => true,
            Self::MissingRefreshToken
            | Self::RefreshFailed(_)
            | Self::InsufficientScope { .. }
            | Self::PersistFailed { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Expired | Self::Missing => ErrorSeverity::Info,
            Self::Invalid(_) | Self::MissingRefreshToken => ErrorSeverity::Warning,
            Self::RefreshFailed(_) | Self::InsufficientScope { .. } => ErrorSeverity::Error,
            // Tokens the server issued but we could not keep are the one
            // failure that strands the user mid-login
            Self::PersistFailed { .. } => ErrorSeverity::Critical,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Configuration and capability failures; never retryable
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("missing client id")]
    MissingClientId,

    #[error("missing or invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("missing redirect URI")]
    MissingRedirectUri,

    #[error("scope set is empty")]
    EmptyScopes,

    #[error("capability '{capability}' failed: {message}")]
    Capability { capability: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingClientId => "config_missing_client_id",
            Self::InvalidEndpoint(_) => "config_invalid_endpoint",
            Self::MissingRedirectUri => "config_missing_redirect_uri",
            Self::EmptyScopes => "config_empty_scopes",
            Self::Capability { .. } => "config_capability_failed",
            Self::Invalid(_) => "config_invalid",
        }
    }
}

impl ErrorClassification for ConfigError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Parameter and CSRF state failures; not retryable
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// CSRF state did not match the stored value (or none was stored)
    #[error("state validation failed (CSRF)")]
    StateMismatch { received: String },

    #[error("no stored state to validate against")]
    StateMissing,

    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("no PKCE verifier available for token exchange")]
    PkceVerifierMissing,

    /// Storage failure wrapped at a validator/manager boundary
    #[error("storage failure during '{operation}': {message}")]
    Storage { operation: String, message: String },
}

impl ValidationError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::StateMismatch { .. } => "state_mismatch",
            Self::StateMissing => "state_missing",
            Self::MissingParameter(_) => "missing_parameter",
            Self::PkceVerifierMissing => "pkce_verifier_missing",
            Self::Storage { .. } => "storage_failure",
        }
    }
}

impl ErrorClassification for ValidationError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::StateMismatch { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Flow detection, validation, and execution failures
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error("no compatible flow handler for callback")]
    NoCompatibleHandler,

    #[error("unknown flow '{0}'")]
    UnknownFlow(String),

    #[error("flow '{0}' is disabled by configuration")]
    Disabled(String),

    #[error("handler '{0}' is already registered")]
    DuplicateHandler(String),

    #[error("missing required flow handlers: {}", missing.join(", "))]
    MissingHandlers { missing: Vec<String> },

    #[error("flow '{flow}' validation failed")]
    ValidationFailed { flow: String },

    #[error("flow '{flow}' execution failed: {message}")]
    ExecutionFailed { flow: String, message: String },

    #[error("flow '{flow}' timed out")]
    Timeout { flow: String },

    #[error("flow '{flow}' was interrupted")]
    Interrupted { flow: String },

    /// The authorization server reported an error in the callback itself
    #[error("provider returned error '{error}'")]
    ProviderError { error: String, description: Option<String> },
}

impl FlowError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCompatibleHandler => "flow_not_detected",
            Self::UnknownFlow(_) => "flow_unknown",
            Self::Disabled(_) => "flow_disabled",
            Self::DuplicateHandler(_) => "flow_duplicate_handler",
            Self::MissingHandlers { .. } => "flow_missing_handlers",
            Self::ValidationFailed { .. } => "flow_validation_failed",
            Self::ExecutionFailed { .. } => "flow_execution_failed",
            Self::Timeout { .. } => "flow_timeout",
            Self::Interrupted { .. } => "flow_interrupted",
            Self::ProviderError { .. } => "flow_provider_error",
        }
    }
}

impl ErrorClassification for FlowError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExecutionFailed { .. } | Self::Timeout { .. } | Self::Interrupted { .. }
        )
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoCompatibleHandler | Self::UnknownFlow(_) => ErrorSeverity::Warning,
            Self::ProviderError { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Root of the error taxonomy
#[derive(Debug, Clone, Error)]
pub enum AuthFlowError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl AuthFlowError {
    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(e) => e.code(),
            Self::Token(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::Validation(e) => e.code(),
            Self::Flow(e) => e.code(),
        }
    }

    /// Taxonomy branch
    #[must_use]
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Network(_) => ErrorType::Network,
            Self::Token(_) => ErrorType::Token,
            Self::Config(_) => ErrorType::Config,
            Self::Validation(_) => ErrorType::Validation,
            Self::Flow(_) => ErrorType::Flow,
        }
    }

    /// HTTP status carried by the error, when one exists
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Network(e) => e.status_code(),
            _ => None,
        }
    }

    /// Structured metadata for logging, key-value pairs
    #[must_use]
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("error_type", self.error_type().as_str().to_string()),
            ("code", self.code().to_string()),
            ("retryable", self.is_retryable().to_string()),
        ];
        if let Some(status) = self.status_code() {
            fields.push(("status", status.to_string()));
        }
        if let Self::Network(NetworkError::HttpStatus { error_payload: Some(payload), .. }) = self {
            fields.push(("error_payload", payload.to_string()));
        }
        fields
    }
}

impl ErrorClassification for AuthFlowError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Token(e) => e.is_retryable(),
            Self::Config(e) => e.is_retryable(),
            Self::Validation(e) => e.is_retryable(),
            Self::Flow(e) => e.is_retryable(),
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Network(e) => e.severity(),
            Self::Token(e) => e.severity(),
            Self::Config(e) => e.severity(),
            Self::Validation(e) => e.severity(),
            Self::Flow(e) => e.severity(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Network(e) => e.retry_after(),
            Self::Token(e) => e.retry_after(),
            Self::Config(e) => e.retry_after(),
            Self::Validation(e) => e.retry_after(),
            Self::Flow(e) => e.retry_after(),
        }
    }
}

/// Parse a Retry-After header value into whole seconds
///
/// Only the delta-seconds form is honored; HTTP-date values are ignored.
#[must_use]
pub(crate) fn parse_retry_after(headers: &HashMap<String, String>) -> Option<u64> {
    headers.get("retry-after").and_then(|v| v.trim().parse().ok())
}
