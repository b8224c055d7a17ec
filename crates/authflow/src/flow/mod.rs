//! Flow dispatch
//!
//! Authentication flows are polymorphic handlers behind [`FlowHandler`],
//! held in a priority-ordered [`FlowRegistry`]. Priority is a numeric rank
//! where a LOWER number means a HIGHER priority; confidence is derived as
//! `max(0, 100 - priority)` so callers can both auto-detect a flow and
//! explain why it was chosen.

mod authorization_code;
mod magic_link;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::{AuthFlowResult, FlowError};
use crate::pkce::PkceManager;
use crate::state::StateValidator;
use crate::token::TokenManager;
use crate::types::{CallbackParams, OAuthResult};

pub use authorization_code::AuthorizationCodeHandler;
pub use magic_link::MagicLinkHandler;

/// Shared collaborators a handler may use during validation and execution
pub struct FlowContext {
    pub config: AuthConfig,
    pub tokens: Arc<TokenManager>,
    pub pkce: Arc<PkceManager>,
    pub state: Arc<StateValidator>,
}

/// A named, prioritized authentication flow
#[async_trait]
pub trait FlowHandler: Send + Sync {
    /// Stable flow name used for explicit dispatch
    fn name(&self) -> &str;

    /// Numeric rank; lower number = higher priority
    fn priority(&self) -> u8;

    /// Synchronous applicability test over the raw callback parameters
    ///
    /// # Errors
    /// May fail; the registry treats a failing test as non-applicable
    fn can_handle(&self, params: &CallbackParams, config: &AuthConfig) -> AuthFlowResult<bool>;

    /// Optional validation step before execution
    ///
    /// # Errors
    /// Returns error on validation infrastructure failure; a clean negative
    /// answer is `Ok(false)`
    async fn validate(
        &self,
        _params: &CallbackParams,
        _ctx: &FlowContext,
    ) -> AuthFlowResult<bool> {
        Ok(true)
    }

    /// Run the flow to completion
    ///
    /// # Errors
    /// Returns a typed error when the flow cannot produce tokens
    async fn execute(
        &self,
        params: &CallbackParams,
        ctx: &FlowContext,
    ) -> AuthFlowResult<OAuthResult>;
}

/// Outcome of flow auto-detection
#[derive(Clone)]
pub struct FlowMatch {
    pub handler: Arc<dyn FlowHandler>,
    /// `max(0, 100 - priority)`
    pub confidence: u8,
    /// Human-readable explanation of why this handler won
    pub reason: String,
}

/// Priority-ordered collection of flow handlers keyed by name
#[derive(Clone, Default)]
pub struct FlowRegistry {
    handlers: HashMap<String, Arc<dyn FlowHandler>>,
    allow_replace: bool,
}

impl FlowRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that replaces on duplicate registration instead of failing
    #[must_use]
    pub fn with_replacement() -> Self {
        Self { handlers: HashMap::new(), allow_replace: true }
    }

    /// Add a handler keyed by its name
    ///
    /// # Errors
    /// Returns [`FlowError::DuplicateHandler`] when the name is taken and
    /// replacement is not enabled
    pub fn register(&mut self, handler: Arc<dyn FlowHandler>) -> AuthFlowResult<()> {
        let name = handler.name().to_string();
        if !self.allow_replace && self.handlers.contains_key(&name) {
            return Err(FlowError::DuplicateHandler(name).into());
        }
        debug!(flow = %name, priority = handler.priority(), "registered flow handler");
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Register several handlers, failing on the first rejection
    ///
    /// # Errors
    /// Returns [`FlowError::DuplicateHandler`] as `register` does
    pub fn register_multiple(
        &mut self,
        handlers: impl IntoIterator<Item = Arc<dyn FlowHandler>>,
    ) -> AuthFlowResult<()> {
        for handler in handlers {
            self.register(handler)?;
        }
        Ok(())
    }

    /// Remove a handler; returns whether one was removed
    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    #[must_use]
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    #[must_use]
    pub fn get_handler(&self, name: &str) -> Option<Arc<dyn FlowHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// All handlers sorted ascending by priority (lowest number first)
    #[must_use]
    pub fn get_all_handlers(&self) -> Vec<Arc<dyn FlowHandler>> {
        let mut all: Vec<_> = self.handlers.values().cloned().collect();
        all.sort_by(|a, b| {
            a.priority().cmp(&b.priority()).then_with(|| a.name().cmp(b.name()))
        });
        all
    }

    /// Every handler whose applicability test passes, priority-sorted
    ///
    /// A handler whose test fails is excluded, never propagated: one broken
    /// handler must not take down dispatch for the rest.
    #[must_use]
    pub fn get_compatible_handlers(
        &self,
        params: &CallbackParams,
        config: &AuthConfig,
    ) -> Vec<Arc<dyn FlowHandler>> {
        self.get_all_handlers()
            .into_iter()
            .filter(|handler| match handler.can_handle(params, config) {
                Ok(applicable) => applicable,
                Err(err) => {
                    debug!(flow = handler.name(), error = %err, "applicability test failed, excluding");
                    false
                }
            })
            .collect()
    }

    /// The single highest-priority compatible handler, with confidence
    #[must_use]
    pub fn detect_flow_with_confidence(
        &self,
        params: &CallbackParams,
        config: &AuthConfig,
    ) -> Option<FlowMatch> {
        let handler = self.get_compatible_handlers(params, config).into_iter().next()?;
        let priority = handler.priority();
        let confidence = 100u8.saturating_sub(priority);
        let reason = format!(
            "handler '{}' matched at priority {priority} (confidence {confidence})",
            handler.name()
        );
        Some(FlowMatch { handler, confidence, reason })
    }

    /// Check that every named handler is registered
    ///
    /// # Errors
    /// Returns [`FlowError::MissingHandlers`] naming every absent handler
    pub fn validate_required_handlers(&self, names: &[&str]) -> AuthFlowResult<()> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.has_handler(name))
            .map(|name| (*name).to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FlowError::MissingHandlers { missing }.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubHandler {
        name: &'static str,
        priority: u8,
        applicable: Option<bool>,
    }

    #[async_trait]
    impl FlowHandler for StubHandler {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        fn can_handle(&self, _: &CallbackParams, _: &AuthConfig) -> AuthFlowResult<bool> {
            self.applicable
                .ok_or_else(|| FlowError::ExecutionFailed {
                    flow: self.name.to_string(),
                    message: "applicability test broke".to_string(),
                }
                .into())
        }

        async fn execute(
            &self,
            _: &CallbackParams,
            _: &FlowContext,
        ) -> AuthFlowResult<OAuthResult> {
            Ok(OAuthResult::failure("stub", "stub"))
        }
    }

    fn stub(name: &'static str, priority: u8, applicable: Option<bool>) -> Arc<dyn FlowHandler> {
        Arc::new(StubHandler { name, priority, applicable })
    }

    fn config() -> AuthConfig {
        AuthConfig {
            client_id: "client-1".to_string(),
            authorization_endpoint: "https://auth.example/authorize".to_string(),
            token_endpoint: "https://auth.example/token".to_string(),
            revocation_endpoint: "https://auth.example/revoke".to_string(),
            redirect_uri: "app://callback".to_string(),
            scopes: vec!["read".to_string()],
            flows: Default::default(),
        }
    }

    /// Validates duplicate-registration policy.
    ///
    /// Assertions:
    /// - Ensures a duplicate name is rejected by default.
    /// - Ensures a replacement-enabled registry accepts it.
    #[test]
    fn test_duplicate_registration_policy() {
        let mut registry = FlowRegistry::new();
        registry.register(stub("login", 5, Some(true))).unwrap();
        let err = registry.register(stub("login", 7, Some(true))).unwrap_err();
        assert_eq!(err.code(), "flow_duplicate_handler");

        let mut replacing = FlowRegistry::with_replacement();
        replacing.register(stub("login", 5, Some(true))).unwrap();
        replacing.register(stub("login", 7, Some(true))).unwrap();
        assert_eq!(replacing.get_handler("login").unwrap().priority(), 7);
    }

    /// Validates `get_all_handlers` ascending priority order.
    #[test]
    fn test_handlers_sorted_by_priority() {
        let mut registry = FlowRegistry::new();
        registry
            .register_multiple([
                stub("c", 30, Some(true)),
                stub("a", 10, Some(true)),
                stub("b", 20, Some(true)),
            ])
            .unwrap();

        let names: Vec<_> =
            registry.get_all_handlers().iter().map(|h| h.name().to_string()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    /// Validates confidence derivation `max(0, 100 - priority)`.
    ///
    /// Assertions:
    /// - Confirms priority 5 yields confidence 95.
    /// - Confirms priority 150 yields confidence 0.
    #[test]
    fn test_confidence_derivation() {
        let mut registry = FlowRegistry::new();
        registry.register(stub("strong", 5, Some(true))).unwrap();
        let matched = registry
            .detect_flow_with_confidence(&CallbackParams::new(), &config())
            .unwrap();
        assert_eq!(matched.confidence, 95);
        assert_eq!(matched.handler.name(), "strong");

        let mut weak = FlowRegistry::new();
        weak.register(stub("weak", 150, Some(true))).unwrap();
        let matched =
            weak.detect_flow_with_confidence(&CallbackParams::new(), &config()).unwrap();
        assert_eq!(matched.confidence, 0);
    }

    /// Validates exclusion of handlers whose applicability test errors.
    ///
    /// Assertions:
    /// - Confirms a failing test excludes only that handler.
    /// - Confirms detection still resolves to the surviving handler.
    #[test]
    fn test_broken_applicability_test_is_excluded() {
        let mut registry = FlowRegistry::new();
        registry
            .register_multiple([stub("broken", 1, None), stub("working", 50, Some(true))])
            .unwrap();

        let compatible = registry.get_compatible_handlers(&CallbackParams::new(), &config());
        assert_eq!(compatible.len(), 1);
        assert_eq!(compatible[0].name(), "working");

        let matched = registry
            .detect_flow_with_confidence(&CallbackParams::new(), &config())
            .unwrap();
        assert_eq!(matched.handler.name(), "working");
    }

    /// Validates `detect_flow_with_confidence` with nothing compatible.
    #[test]
    fn test_no_compatible_handler_detects_nothing() {
        let mut registry = FlowRegistry::new();
        registry.register(stub("never", 10, Some(false))).unwrap();
        assert!(registry
            .detect_flow_with_confidence(&CallbackParams::new(), &config())
            .is_none());
    }

    /// Validates `validate_required_handlers` missing-name reporting.
    #[test]
    fn test_required_handler_validation() {
        let mut registry = FlowRegistry::new();
        registry.register(stub("login", 5, Some(true))).unwrap();

        assert!(registry.validate_required_handlers(&["login"]).is_ok());
        let err = registry
            .validate_required_handlers(&["login", "authorization_code", "device"])
            .unwrap_err();
        assert_eq!(err.code(), "flow_missing_handlers");
        let message = err.to_string();
        assert!(message.contains("authorization_code"));
        assert!(message.contains("device"));
    }

    /// Validates registry clone independence.
    ///
    /// Assertions:
    /// - Confirms mutating the clone leaves the original untouched.
    #[test]
    fn test_clone_is_independent() {
        let mut registry = FlowRegistry::new();
        registry.register(stub("login", 5, Some(true))).unwrap();

        let mut cloned = registry.clone();
        cloned.clear();
        assert!(!cloned.has_handler("login"));
        assert!(registry.has_handler("login"));
    }

    /// Validates `unregister` and `clear` bookkeeping.
    #[test]
    fn test_unregister_and_clear() {
        let mut registry = FlowRegistry::new();
        registry.register(stub("login", 5, Some(true))).unwrap();

        assert!(registry.unregister("login"));
        assert!(!registry.unregister("login"));
        registry.register(stub("login", 5, Some(true))).unwrap();
        registry.clear();
        assert!(registry.get_all_handlers().is_empty());
    }
}
