//! Authorization-code-with-PKCE flow

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthFlowResult, ValidationError};
use crate::types::{CallbackParams, OAuthResult};

use super::{FlowContext, FlowHandler};

pub const AUTHORIZATION_CODE_FLOW: &str = "authorization_code";
const PRIORITY: u8 = 10;

/// Redeems an authorization code using the stored PKCE verifier
///
/// Applies to any callback carrying a `code` parameter. Validation enforces
/// the CSRF state; execution consumes the stored verifier at the token
/// exchange and clears PKCE material afterward on a best-effort basis.
#[derive(Debug, Default)]
pub struct AuthorizationCodeHandler;

impl AuthorizationCodeHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FlowHandler for AuthorizationCodeHandler {
    fn name(&self) -> &str {
        AUTHORIZATION_CODE_FLOW
    }

    fn priority(&self) -> u8 {
        PRIORITY
    }

    fn can_handle(&self, params: &CallbackParams, config: &AuthConfig) -> AuthFlowResult<bool> {
        Ok(params.contains("code") && config.flows.is_enabled(self.name()))
    }

    async fn validate(&self, params: &CallbackParams, ctx: &FlowContext) -> AuthFlowResult<bool> {
        let Some(state) = params.get("state") else {
            return Ok(false);
        };
        ctx.state.validate_state(state).await
    }

    async fn execute(
        &self,
        params: &CallbackParams,
        ctx: &FlowContext,
    ) -> AuthFlowResult<OAuthResult> {
        let code = params
            .get("code")
            .ok_or_else(|| ValidationError::MissingParameter("code".to_string()))?;
        let verifier = ctx
            .pkce
            .get_code_verifier()
            .await?
            .ok_or(ValidationError::PkceVerifierMissing)?;

        let tokens = ctx
            .tokens
            .exchange_authorization_code(code, &verifier, &ctx.config)
            .await?;

        // The verifier is spent; cleanup is best-effort
        if let Err(err) = ctx.pkce.clear_pkce_data().await {
            warn!(error = %err, "pkce cleanup failed after code exchange");
        }

        info!("authorization code flow completed");
        Ok(OAuthResult::success(&tokens))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::events::EventBus;
    use crate::keys;
    use crate::pkce::PkceManager;
    use crate::state::StateValidator;
    use crate::testing::mocks::{FixedPkce, MemoryStorage, MockHttp};
    use crate::token::TokenManager;
    use crate::traits::HttpResponse;

    fn context() -> (FlowContext, Arc<MockHttp>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let http = Arc::new(MockHttp::new());
        let ctx = FlowContext {
            config: AuthConfig {
                client_id: "client-1".to_string(),
                authorization_endpoint: "https://auth.example/authorize".to_string(),
                token_endpoint: "https://auth.example/token".to_string(),
                revocation_endpoint: "https://auth.example/revoke".to_string(),
                redirect_uri: "app://callback".to_string(),
                scopes: vec!["read".to_string()],
                flows: Default::default(),
            },
            tokens: Arc::new(TokenManager::new(http.clone(), storage.clone(), EventBus::new())),
            pkce: Arc::new(PkceManager::new(
                Arc::new(FixedPkce::new("c1", "S256", "v1", "s1")),
                storage.clone(),
            )),
            state: Arc::new(StateValidator::new(storage.clone())),
        };
        (ctx, http, storage)
    }

    /// Validates applicability over the `code` parameter.
    #[test]
    fn test_can_handle_requires_code() {
        let (ctx, _http, _storage) = context();
        let handler = AuthorizationCodeHandler::new();

        let with_code = CallbackParams::new().with("code", "abc");
        assert!(handler.can_handle(&with_code, &ctx.config).unwrap());
        assert!(!handler.can_handle(&CallbackParams::new(), &ctx.config).unwrap());
    }

    /// Validates CSRF enforcement in the validation step.
    ///
    /// Assertions:
    /// - Confirms a matching state validates.
    /// - Confirms a missing state parameter is a clean negative.
    #[tokio::test]
    async fn test_validate_enforces_state() {
        let (ctx, _http, _storage) = context();
        let handler = AuthorizationCodeHandler::new();
        ctx.state.store_state("s1", None).await.unwrap();

        let missing = CallbackParams::new().with("code", "abc");
        assert!(!handler.validate(&missing, &ctx).await.unwrap());

        let matching = CallbackParams::new().with("code", "abc").with("state", "s1");
        assert!(handler.validate(&matching, &ctx).await.unwrap());
    }

    /// Validates execution consumes the stored verifier and clears PKCE data.
    ///
    /// Assertions:
    /// - Confirms the exchange sends the stored verifier.
    /// - Confirms PKCE keys are cleared afterward.
    #[tokio::test]
    async fn test_execute_consumes_verifier() {
        let (ctx, http, storage) = context();
        ctx.pkce.generate_challenge().await.unwrap();
        http.push_response(HttpResponse::new(
            200,
            r#"{"access_token":"a1","expires_in":3600}"#,
        ));

        let handler = AuthorizationCodeHandler::new();
        let params = CallbackParams::new().with("code", "abc");
        let result = handler.execute(&params, &ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.access_token.as_deref(), Some("a1"));
        assert!(http.last_request().unwrap().has_param("code_verifier", "v1"));
        assert!(storage.value(keys::PKCE_CODE_VERIFIER).is_none());
    }

    /// Validates execution without a stored verifier.
    #[tokio::test]
    async fn test_execute_without_verifier_fails() {
        let (ctx, _http, _storage) = context();
        let handler = AuthorizationCodeHandler::new();

        let params = CallbackParams::new().with("code", "abc");
        let err = handler.execute(&params, &ctx).await.unwrap_err();
        assert_eq!(err.code(), "pkce_verifier_missing");
    }
}
