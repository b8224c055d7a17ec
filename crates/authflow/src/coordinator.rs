//! Flow coordination
//!
//! [`AuthCoordinator`] wires the state validator, PKCE manager, token
//! manager, refresh scheduler, and flow registry into the two main
//! pipelines: authorization-URL generation and callback handling, plus the
//! shorter refresh and logout pipelines. Status transitions are a
//! notification surface, not a guarded machine; observers subscribe to the
//! event bus.
//!
//! The coordinator assumes a single client in a single process. Public
//! operations are not serialized against each other: concurrent callers can
//! race on the shared storage keys.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::error::{
    AuthFlowError, AuthFlowResult, ErrorClassification, FlowError, TokenError, ValidationError,
};
use crate::events::{AuthEvent, EventBus};
use crate::flow::{
    AuthorizationCodeHandler, FlowContext, FlowHandler, FlowRegistry, MagicLinkHandler,
};
use crate::keys;
use crate::pkce::PkceManager;
use crate::scheduler::RefreshScheduler;
use crate::state::StateValidator;
use crate::token::TokenManager;
use crate::traits::{HttpAdapter, PkceProvider, StorageAdapter};
use crate::types::{AuthStatus, CallbackParams, OAuthResult, TokenSet};

/// Default lead time before expiry at which a refresh fires
const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// Form-style percent encoding: space becomes `+`
pub(crate) fn form_encode(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

/// Orchestrates authentication flows over injected adapter capabilities
pub struct AuthCoordinator {
    config: AuthConfig,
    storage: Arc<dyn StorageAdapter>,
    tokens: Arc<TokenManager>,
    pkce: Arc<PkceManager>,
    state: Arc<StateValidator>,
    scheduler: RefreshScheduler,
    registry: tokio::sync::RwLock<FlowRegistry>,
    events: EventBus,
    status: RwLock<AuthStatus>,
    refresh_buffer: Duration,
    auto_refresh: bool,
}

impl AuthCoordinator {
    /// Build a coordinator with the built-in flow handlers registered
    ///
    /// Configuration is validated here, non-fatally: problems are logged and
    /// surfaced as a `ConfigValidated` event, never thrown.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        storage: Arc<dyn StorageAdapter>,
        http: Arc<dyn HttpAdapter>,
        pkce_provider: Arc<dyn PkceProvider>,
    ) -> Self {
        let events = EventBus::new();

        let warnings = config.validate();
        for warning in &warnings {
            warn!(%warning, "configuration problem");
        }
        events.emit(AuthEvent::ConfigValidated {
            warnings: warnings.iter().map(ToString::to_string).collect(),
        });

        let mut registry = if config.flows.allow_replace {
            FlowRegistry::with_replacement()
        } else {
            FlowRegistry::new()
        };
        // Built-ins; registration into a fresh registry cannot collide
        let _ = registry.register(Arc::new(MagicLinkHandler::new()));
        let _ = registry.register(Arc::new(AuthorizationCodeHandler::new()));

        Self {
            tokens: Arc::new(TokenManager::new(http, storage.clone(), events.clone())),
            pkce: Arc::new(PkceManager::new(pkce_provider, storage.clone())),
            state: Arc::new(StateValidator::new(storage.clone())),
            scheduler: RefreshScheduler::new(events.clone()),
            registry: tokio::sync::RwLock::new(registry),
            status: RwLock::new(AuthStatus::Unauthenticated),
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            auto_refresh: true,
            config,
            storage,
            events,
        }
    }

    /// Disable automatic refresh scheduling after token issuance
    #[must_use]
    pub fn without_auto_refresh(mut self) -> Self {
        self.auto_refresh = false;
        self
    }

    /// Override the refresh lead time
    #[must_use]
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        *self.status.read()
    }

    /// Subscribe to lifecycle events emitted from this point on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Add a custom flow handler
    ///
    /// # Errors
    /// Returns a duplicate-handler error per the configured policy
    pub async fn register_flow(&self, handler: Arc<dyn FlowHandler>) -> AuthFlowResult<()> {
        self.registry.write().await.register(handler)
    }

    /// Remove a flow handler; returns whether one was removed
    pub async fn unregister_flow(&self, name: &str) -> bool {
        self.registry.write().await.unregister(name)
    }

    /// Check that every named flow handler is registered
    ///
    /// # Errors
    /// Returns a flow error naming every missing handler
    pub async fn validate_required_flows(&self, names: &[&str]) -> AuthFlowResult<()> {
        self.registry.read().await.validate_required_handlers(names)
    }

    /// Load persisted tokens and derive the starting status
    ///
    /// Degrades gracefully: an unreadable store leaves the coordinator
    /// unauthenticated rather than failing startup.
    pub async fn initialize(&self) -> AuthStatus {
        let access = match self.tokens.get_access_token().await {
            Ok(access) => access,
            Err(e) => {
                warn!(error = %e, "stored tokens unreadable at startup");
                None
            }
        };

        let status = match access {
            Some(_) if !self.tokens.is_token_expired().await => AuthStatus::Authenticated,
            Some(_) => {
                self.events.emit(AuthEvent::TokenExpired);
                AuthStatus::Expired
            }
            None => AuthStatus::Unauthenticated,
        };
        self.set_status(status);
        debug!(%status, "coordinator initialized");
        status
    }

    /// Build the authorization redirect URL, persisting PKCE and state
    ///
    /// # Errors
    /// Re-raises any pipeline failure after emitting an `AuthError` event
    pub async fn generate_authorization_url(
        &self,
        extra: &[(String, String)],
    ) -> AuthFlowResult<String> {
        self.events.emit(AuthEvent::LoadingStarted {
            operation: "generate_authorization_url".to_string(),
        });
        let result = self.generate_authorization_url_inner(extra).await;
        self.events.emit(AuthEvent::LoadingEnded {
            operation: "generate_authorization_url".to_string(),
        });
        result.map_err(|err| self.report(err))
    }

    async fn generate_authorization_url_inner(
        &self,
        extra: &[(String, String)],
    ) -> AuthFlowResult<String> {
        let challenge = self.pkce.generate_challenge().await?;
        self.events.emit(AuthEvent::PkceGenerated {
            code_challenge: challenge.code_challenge.clone(),
            method: challenge.code_challenge_method.clone(),
        });

        let state = self.pkce.generate_state().await?;
        // Re-store through the validator to attach the expiry bookkeeping
        self.state.store_state(&state, None).await?;
        self.events.emit(AuthEvent::StateGenerated { state: state.clone() });

        let mut query: Vec<(String, String)> = vec![
            ("client_id".to_string(), self.config.client_id.clone()),
            ("redirect_uri".to_string(), self.config.redirect_uri.clone()),
            ("response_type".to_string(), "code".to_string()),
            ("scope".to_string(), self.config.scope_string()),
            ("state".to_string(), state),
            ("code_challenge".to_string(), challenge.code_challenge),
            (
                "code_challenge_method".to_string(),
                challenge.code_challenge_method,
            ),
        ];
        query.extend_from_slice(extra);

        let query: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
            .collect();
        let url = format!("{}?{}", self.config.authorization_endpoint, query.join("&"));

        self.events.emit(AuthEvent::AuthUrlGenerated { url: url.clone() });
        info!("authorization url generated");
        Ok(url)
    }

    /// Handle a callback given as a raw query string
    ///
    /// # Errors
    /// As [`Self::handle_callback`]
    pub async fn handle_callback_query(
        &self,
        query: &str,
        explicit_flow: Option<&str>,
    ) -> AuthFlowResult<OAuthResult> {
        self.handle_callback(CallbackParams::from_query(query), explicit_flow).await
    }

    /// Dispatch a callback to the owning flow handler and run it
    ///
    /// With an explicit flow name the exact handler is resolved (or an
    /// unknown-flow error raised); otherwise the registry picks the
    /// highest-confidence compatible handler.
    ///
    /// # Errors
    /// Re-raises any pipeline failure after emitting an `AuthError` event
    /// and moving the status to `Error`
    pub async fn handle_callback(
        &self,
        params: CallbackParams,
        explicit_flow: Option<&str>,
    ) -> AuthFlowResult<OAuthResult> {
        self.events.emit(AuthEvent::CallbackStarted {
            explicit_flow: explicit_flow.map(ToString::to_string),
        });
        self.set_status(AuthStatus::Authenticating);

        match self.handle_callback_inner(&params, explicit_flow).await {
            Ok((flow, result)) => {
                self.events.emit(AuthEvent::TokensStored);
                self.events.emit(AuthEvent::AuthSuccess { flow: flow.clone() });
                self.events.emit(AuthEvent::CallbackCompleted { flow, success: true });
                self.set_status(AuthStatus::Authenticated);
                Ok(result)
            }
            Err(err) => {
                self.set_status(AuthStatus::Error);
                Err(self.report(err))
            }
        }
    }

    async fn handle_callback_inner(
        &self,
        params: &CallbackParams,
        explicit_flow: Option<&str>,
    ) -> AuthFlowResult<(String, OAuthResult)> {
        // A provider error in the callback itself precludes any handler
        if let Some(error) = params.get("error") {
            return Err(FlowError::ProviderError {
                error: error.to_string(),
                description: params.get("error_description").map(ToString::to_string),
            }
            .into());
        }

        let handler = self.resolve_handler(params, explicit_flow).await?;
        let flow = handler.name().to_string();

        let ctx = FlowContext {
            config: self.config.clone(),
            tokens: Arc::clone(&self.tokens),
            pkce: Arc::clone(&self.pkce),
            state: Arc::clone(&self.state),
        };

        if !handler.validate(params, &ctx).await? {
            return Err(FlowError::ValidationFailed { flow }.into());
        }

        let result = handler.execute(params, &ctx).await?;
        if !result.success {
            let message = result.error.clone().unwrap_or_else(|| "flow reported failure".into());
            return Err(FlowError::ExecutionFailed { flow, message }.into());
        }

        if self.auto_refresh {
            if let Some(access) = &result.access_token {
                let tokens = TokenSet::new(
                    access.clone(),
                    result.refresh_token.clone(),
                    result.expires_in,
                );
                self.arm_refresh(&tokens);
            }
        }

        Ok((flow, result))
    }

    async fn resolve_handler(
        &self,
        params: &CallbackParams,
        explicit_flow: Option<&str>,
    ) -> AuthFlowResult<Arc<dyn FlowHandler>> {
        let registry = self.registry.read().await;

        if let Some(name) = explicit_flow {
            if !self.config.flows.is_enabled(name) {
                return Err(FlowError::Disabled(name.to_string()).into());
            }
            return registry
                .get_handler(name)
                .ok_or_else(|| FlowError::UnknownFlow(name.to_string()).into());
        }

        if self.config.flows.detection == crate::config::DetectionStrategy::ExplicitOnly {
            return Err(FlowError::NoCompatibleHandler.into());
        }

        let matched = registry
            .detect_flow_with_confidence(params, &self.config)
            .ok_or(FlowError::NoCompatibleHandler)?;
        self.events.emit(AuthEvent::FlowDetected {
            flow: matched.handler.name().to_string(),
            confidence: matched.confidence,
            reason: matched.reason.clone(),
        });
        debug!(reason = %matched.reason, "flow detected");
        Ok(matched.handler)
    }

    /// Refresh the access token using the stored refresh token
    ///
    /// # Errors
    /// Re-raises any failure after emitting an `AuthError` event; a
    /// definitive refresh rejection moves the status to `Expired`, other
    /// failures to `Error`
    pub async fn refresh_access_token(&self) -> AuthFlowResult<TokenSet> {
        self.set_status(AuthStatus::Refreshing);
        self.events.emit(AuthEvent::LoadingStarted { operation: "refresh".to_string() });
        let result = self.refresh_access_token_inner().await;
        self.events.emit(AuthEvent::LoadingEnded { operation: "refresh".to_string() });

        match result {
            Ok(tokens) => {
                self.events.emit(AuthEvent::TokenRefreshed { expires_in: tokens.expires_in });
                if self.auto_refresh {
                    self.arm_refresh(&tokens);
                }
                self.set_status(AuthStatus::Authenticated);
                Ok(tokens)
            }
            Err(err) => {
                if matches!(err, AuthFlowError::Token(TokenError::RefreshFailed(_))) {
                    self.events.emit(AuthEvent::TokenExpired);
                    self.set_status(AuthStatus::Expired);
                } else {
                    self.set_status(AuthStatus::Error);
                }
                Err(self.report(err))
            }
        }
    }

    async fn refresh_access_token_inner(&self) -> AuthFlowResult<TokenSet> {
        let refresh = self
            .tokens
            .get_refresh_token()
            .await
            .map_err(|e| ValidationError::Storage {
                operation: "get_refresh_token".to_string(),
                message: e.to_string(),
            })?
            .ok_or(TokenError::MissingRefreshToken)?;

        self.tokens.refresh_token(&refresh, &self.config).await
    }

    /// Tear down the session: cancel refresh, revoke, clear local material
    ///
    /// Remote revocation is best-effort; PKCE and state cleanup failures are
    /// logged and swallowed. Only a failure to clear local tokens is raised.
    ///
    /// # Errors
    /// Re-raises a local token-clear failure after emitting an `AuthError`
    pub async fn logout(&self, reason: Option<&str>) -> AuthFlowResult<()> {
        self.scheduler.cancel_scheduled_refresh();

        self.tokens
            .revoke_tokens(&self.config)
            .await
            .map_err(|err| self.report(err))?;
        self.events.emit(AuthEvent::TokensCleared);

        if let Err(err) = self.pkce.clear_pkce_data().await {
            warn!(error = %err, "pkce cleanup failed during logout");
        }
        if let Err(err) =
            self.storage.remove_batch(&[keys::OAUTH_STATE, keys::OAUTH_STATE_EXPIRY]).await
        {
            warn!(error = %err, "state cleanup failed during logout");
        }

        self.events.emit(AuthEvent::LoggedOut { reason: reason.map(ToString::to_string) });
        self.set_status(AuthStatus::Unauthenticated);
        info!("logged out");
        Ok(())
    }

    /// Whether a refresh timer is currently armed
    #[must_use]
    pub fn is_refresh_scheduled(&self) -> bool {
        self.scheduler.is_refresh_scheduled()
    }

    /// Cancel any armed refresh timer
    pub fn cancel_scheduled_refresh(&self) {
        self.scheduler.cancel_scheduled_refresh();
    }

    /// Cancel timers and detach the scheduler from the event bus
    pub fn destroy(&self) {
        self.scheduler.destroy();
    }

    fn arm_refresh(&self, tokens: &TokenSet) {
        let manager = Arc::clone(&self.tokens);
        let config = self.config.clone();
        let events = self.events.clone();

        self.scheduler.schedule_refresh(tokens, self.refresh_buffer, move || async move {
            let refresh = manager
                .get_refresh_token()
                .await
                .map_err(|e| ValidationError::Storage {
                    operation: "get_refresh_token".to_string(),
                    message: e.to_string(),
                })?
                .ok_or(TokenError::MissingRefreshToken)?;
            let tokens = manager.refresh_token(&refresh, &config).await?;
            events.emit(AuthEvent::TokenRefreshed { expires_in: tokens.expires_in });
            Ok(())
        });
    }

    fn set_status(&self, to: AuthStatus) {
        let mut status = self.status.write();
        let from = *status;
        if from == to {
            return;
        }
        *status = to;
        drop(status);
        debug!(%from, %to, "status changed");
        self.events.emit(AuthEvent::StatusChanged { from, to });
    }

    fn report(&self, err: AuthFlowError) -> AuthFlowError {
        self.events.emit(AuthEvent::AuthError {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        });
        err
    }
}
