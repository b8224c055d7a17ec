//! Magic-link login flow

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthFlowResult, ValidationError};
use crate::types::{CallbackParams, OAuthResult};

use super::{FlowContext, FlowHandler};

pub const MAGIC_LINK_FLOW: &str = "login";
const PRIORITY: u8 = 5;

/// Exchanges a one-time magic-link token for OAuth tokens
///
/// Applies when the callback carries a `token` parameter and names this
/// flow explicitly via `flow=login`. No CSRF state is involved: the token
/// itself is single-use and bound server-side.
#[derive(Debug, Default)]
pub struct MagicLinkHandler;

impl MagicLinkHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FlowHandler for MagicLinkHandler {
    fn name(&self) -> &str {
        MAGIC_LINK_FLOW
    }

    fn priority(&self) -> u8 {
        PRIORITY
    }

    fn can_handle(&self, params: &CallbackParams, config: &AuthConfig) -> AuthFlowResult<bool> {
        let named = params.get("flow") == Some(self.name());
        Ok(named && params.contains("token") && config.flows.is_enabled(self.name()))
    }

    async fn execute(
        &self,
        params: &CallbackParams,
        ctx: &FlowContext,
    ) -> AuthFlowResult<OAuthResult> {
        let token = params
            .get("token")
            .ok_or_else(|| ValidationError::MissingParameter("token".to_string()))?;

        let tokens = ctx
            .tokens
            .exchange_magic_link_token(token, &ctx.config, &[])
            .await?;

        // A magic-link login makes any pending PKCE attempt moot
        if let Err(err) = ctx.pkce.clear_pkce_data().await {
            warn!(error = %err, "pkce cleanup failed after magic link exchange");
        }

        info!("magic link flow completed");
        Ok(OAuthResult::success(&tokens))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::FlowConfig;
    use crate::events::EventBus;
    use crate::pkce::PkceManager;
    use crate::state::StateValidator;
    use crate::testing::mocks::{FixedPkce, MemoryStorage, MockHttp};
    use crate::token::TokenManager;
    use crate::traits::HttpResponse;

    fn context() -> (FlowContext, Arc<MockHttp>) {
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
                flows: FlowConfig::default(),
            },
            tokens: Arc::new(TokenManager::new(http.clone(), storage.clone(), EventBus::new())),
            pkce: Arc::new(PkceManager::new(
                Arc::new(FixedPkce::new("c1", "S256", "v1", "s1")),
                storage.clone(),
            )),
            state: Arc::new(StateValidator::new(storage)),
        };
        (ctx, http)
    }

    /// Validates applicability requires both `token` and `flow=login`.
    #[test]
    fn test_can_handle_requires_token_and_flow_name() {
        let (ctx, _http) = context();
        let handler = MagicLinkHandler::new();

        let full = CallbackParams::new().with("token", "t1").with("flow", "login");
        assert!(handler.can_handle(&full, &ctx.config).unwrap());

        let unnamed = CallbackParams::new().with("token", "t1");
        assert!(!handler.can_handle(&unnamed, &ctx.config).unwrap());

        let tokenless = CallbackParams::new().with("flow", "login");
        assert!(!handler.can_handle(&tokenless, &ctx.config).unwrap());
    }

    /// Validates a disabled flow is not applicable.
    #[test]
    fn test_disabled_flow_is_not_applicable() {
        let (mut ctx, _http) = context();
        ctx.config.flows.disabled = vec!["login".to_string()];
        let handler = MagicLinkHandler::new();

        let params = CallbackParams::new().with("token", "t1").with("flow", "login");
        assert!(!handler.can_handle(&params, &ctx.config).unwrap());
    }

    /// Validates execution exchanges the one-time token.
    ///
    /// Assertions:
    /// - Confirms the exchange body carries the magic-link grant.
    /// - Confirms the result exposes the issued access token.
    #[tokio::test]
    async fn test_execute_exchanges_token() {
        let (ctx, http) = context();
        http.push_response(HttpResponse::new(
            200,
            r#"{"access_token":"a1","expires_in":3600}"#,
        ));

        let handler = MagicLinkHandler::new();
        let params = CallbackParams::new().with("token", "t1").with("flow", "login");
        let result = handler.execute(&params, &ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.access_token.as_deref(), Some("a1"));
        let request = http.last_request().unwrap();
        assert!(request.has_param("grant_type", "magic_link"));
        assert!(request.has_param("token", "t1"));
    }

    /// Validates best-effort PKCE cleanup survives a storage failure.
    #[tokio::test]
    async fn test_pkce_cleanup_failure_is_swallowed() {
        let storage = Arc::new(MemoryStorage::new());
        let http = Arc::new(MockHttp::new());
        http.push_response(HttpResponse::new(200, r#"{"access_token":"a1"}"#));
        storage.fail_op("remove_batch", true);

        let ctx = FlowContext {
            config: context().0.config,
            tokens: Arc::new(TokenManager::new(http.clone(), storage.clone(), EventBus::new())),
            pkce: Arc::new(PkceManager::new(
                Arc::new(FixedPkce::new("c1", "S256", "v1", "s1")),
                storage.clone(),
            )),
            state: Arc::new(StateValidator::new(storage)),
        };

        let handler = MagicLinkHandler::new();
        let params = CallbackParams::new().with("token", "t1").with("flow", "login");
        let result = handler.execute(&params, &ctx).await.unwrap();
        assert!(result.success);
    }
}
