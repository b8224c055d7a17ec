//! Client configuration
//!
//! Configuration is immutable after construction. Validation is a separate,
//! non-fatal step: problems surface as warnings through `tracing` and a
//! [`crate::events::AuthEvent::ConfigValidated`] notification, never as a
//! construction failure.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the coordinator picks a handler when no explicit flow name is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectionStrategy {
    /// Ask the registry for the highest-confidence compatible handler
    #[default]
    Auto,
    /// Require an explicit flow name on every callback
    ExplicitOnly,
}

/// Flow-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Flows that may run; `None` means every registered flow is enabled
    pub enabled: Option<Vec<String>>,
    /// Flows explicitly disabled, takes precedence over `enabled`
    pub disabled: Vec<String>,
    /// Allow `register` to replace an existing handler with the same name
    pub allow_replace: bool,
    pub detection: DetectionStrategy,
}

impl FlowConfig {
    /// Whether a flow name is currently enabled
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        if self.disabled.iter().any(|d| d == name) {
            return false;
        }
        match &self.enabled {
            Some(allowed) => allowed.iter().any(|a| a == name),
            None => true,
        }
    }
}

/// OAuth client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub revocation_endpoint: String,
    pub redirect_uri: String,
    /// Ordered, must be non-empty
    pub scopes: Vec<String>,
    #[serde(default)]
    pub flows: FlowConfig,
}

/// Non-fatal configuration problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConfigWarning {
    MissingClientId,
    MissingEndpoint(String),
    InvalidEndpoint(String),
    MissingRedirectUri,
    EmptyScopes,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingClientId => write!(f, "client_id is empty"),
            Self::MissingEndpoint(name) => write!(f, "{name} endpoint is empty"),
            Self::InvalidEndpoint(name) => {
                write!(f, "{name} endpoint is not an http(s) URL")
            }
            Self::MissingRedirectUri => write!(f, "redirect_uri is empty"),
            Self::EmptyScopes => write!(f, "scope set is empty"),
        }
    }
}

impl AuthConfig {
    /// Scopes joined with a single space, the wire form
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Enumerate configuration problems without failing
    ///
    /// Called once at coordinator construction; results are logged and
    /// surfaced as an event, never thrown.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.client_id.trim().is_empty() {
            warnings.push(ConfigWarning::MissingClientId);
        }
        for (name, url) in [
            ("authorization", &self.authorization_endpoint),
            ("token", &self.token_endpoint),
            ("revocation", &self.revocation_endpoint),
        ] {
            if url.trim().is_empty() {
                warnings.push(ConfigWarning::MissingEndpoint(name.to_string()));
            } else if !url.starts_with("http://") && !url.starts_with("https://") {
                warnings.push(ConfigWarning::InvalidEndpoint(name.to_string()));
            }
        }
        if self.redirect_uri.trim().is_empty() {
            warnings.push(ConfigWarning::MissingRedirectUri);
        }
        if self.scopes.is_empty() {
            warnings.push(ConfigWarning::EmptyScopes);
        }

        warnings
    }
}
