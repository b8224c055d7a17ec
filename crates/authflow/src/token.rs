//! Token lifecycle
//!
//! Exchanges authorization artifacts for tokens at the configured token
//! endpoint, persists them as four discrete storage keys so any subset can
//! be read independently, tracks expiration, and handles revocation.
//!
//! Propagation note: write paths wrap storage failures into typed errors;
//! the plain getters let [`AdapterError`] propagate unwrapped. That
//! asymmetry is part of the contract, documented per method.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::error::{parse_retry_after, AuthFlowResult, NetworkError, TokenError};
use crate::events::{AuthEvent, EventBus};
use crate::keys;
use crate::traits::{AdapterError, HttpAdapter, HttpResponse, StorageAdapter, TokenRecord};
use crate::types::{TokenResponse, TokenSet};

/// Exchanges, persists, and revokes OAuth tokens
pub struct TokenManager {
    http: Arc<dyn HttpAdapter>,
    storage: Arc<dyn StorageAdapter>,
    events: EventBus,
}

impl TokenManager {
    pub fn new(http: Arc<dyn HttpAdapter>, storage: Arc<dyn StorageAdapter>, events: EventBus) -> Self {
        Self { http, storage, events }
    }

    /// Exchange an authorization code plus PKCE verifier for tokens
    ///
    /// # Errors
    /// Returns a network error on transport/status/parse failure, a token
    /// error when persistence fails
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        verifier: &str,
        config: &AuthConfig,
    ) -> AuthFlowResult<TokenSet> {
        let params = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), config.redirect_uri.clone()),
            ("code_verifier".to_string(), verifier.to_string()),
            ("client_id".to_string(), config.client_id.clone()),
        ];

        let response = self.post_token_endpoint(&config.token_endpoint, params).await?;
        let tokens = self.parse_and_persist(&config.token_endpoint, response).await?;
        info!("authorization code exchanged");
        Ok(tokens)
    }

    /// Exchange a magic-link token for tokens
    ///
    /// `extra` parameters are appended to the form body unmodified.
    ///
    /// # Errors
    /// Returns a network error on transport/status/parse failure, a token
    /// error when persistence fails
    pub async fn exchange_magic_link_token(
        &self,
        token: &str,
        config: &AuthConfig,
        extra: &[(String, String)],
    ) -> AuthFlowResult<TokenSet> {
        let mut params = vec![
            ("grant_type".to_string(), "magic_link".to_string()),
            ("token".to_string(), token.to_string()),
            ("client_id".to_string(), config.client_id.clone()),
        ];
        params.extend_from_slice(extra);

        let response = self.post_token_endpoint(&config.token_endpoint, params).await?;
        let tokens = self.parse_and_persist(&config.token_endpoint, response).await?;
        info!("magic link token exchanged");
        Ok(tokens)
    }

    /// Redeem a refresh token for a fresh token set
    ///
    /// # Errors
    /// Returns [`TokenError::RefreshFailed`] when the server rejects the
    /// refresh token, a network error for transport/server trouble, a token
    /// error when persistence fails
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        config: &AuthConfig,
    ) -> AuthFlowResult<TokenSet> {
        let params = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("client_id".to_string(), config.client_id.clone()),
        ];

        let response = match self.post_token_endpoint(&config.token_endpoint, params).await {
            Ok(response) => response,
            // A definitive rejection means the refresh token is dead, which
            // is a token-class failure, not a transient network one
            Err(err) if matches!(err.status_code(), Some(400 | 401 | 403)) => {
                return Err(TokenError::RefreshFailed(err.to_string()).into());
            }
            Err(err) => return Err(err),
        };
        let tokens = self.parse_and_persist(&config.token_endpoint, response).await?;
        info!("access token refreshed");
        Ok(tokens)
    }

    /// Read the stored access token
    ///
    /// # Errors
    /// Lets the raw storage failure propagate unwrapped
    pub async fn get_access_token(&self) -> Result<Option<String>, AdapterError> {
        self.storage.get(keys::ACCESS_TOKEN).await
    }

    /// Read the stored refresh token
    ///
    /// # Errors
    /// Lets the raw storage failure propagate unwrapped
    pub async fn get_refresh_token(&self) -> Result<Option<String>, AdapterError> {
        self.storage.get(keys::REFRESH_TOKEN).await
    }

    /// Whether the stored token has passed its expiry
    ///
    /// Defaults to not-expired when no expiry was ever stored, the
    /// optimistic reading: a token without a known lifetime is assumed
    /// usable until the server says otherwise.
    pub async fn is_token_expired(&self) -> bool {
        match self.storage.get(keys::TOKEN_EXPIRY).await {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(expiry_ms) => Utc::now().timestamp_millis() >= expiry_ms,
                Err(_) => false,
            },
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "token expiry unreadable, assuming not expired");
                false
            }
        }
    }

    /// Remove all four token keys
    ///
    /// # Errors
    /// Returns a token error wrapping the storage failure
    pub async fn clear_tokens(&self) -> AuthFlowResult<()> {
        self.storage
            .remove_batch(&[
                keys::ACCESS_TOKEN,
                keys::REFRESH_TOKEN,
                keys::TOKEN_TYPE,
                keys::TOKEN_EXPIRY,
            ])
            .await
            .map_err(|e| TokenError::PersistFailed {
                operation: "clear_tokens".to_string(),
                message: e.to_string(),
            })?;
        debug!("cleared stored tokens");
        Ok(())
    }

    /// Best-effort revocation, then unconditional local clear
    ///
    /// Remote revocation is a courtesy to the server: any HTTP failure is
    /// logged and swallowed, and local tokens are cleared regardless.
    ///
    /// # Errors
    /// Returns a token error only when the local clear fails
    pub async fn revoke_tokens(&self, config: &AuthConfig) -> AuthFlowResult<()> {
        let access = self.get_access_token().await.unwrap_or_else(|e| {
            warn!(error = %e, "access token unreadable before revocation");
            None
        });
        let refresh = self.get_refresh_token().await.unwrap_or_else(|e| {
            warn!(error = %e, "refresh token unreadable before revocation");
            None
        });

        if let Some(token) = access {
            let mut params = vec![
                ("token".to_string(), token),
                ("client_id".to_string(), config.client_id.clone()),
            ];
            if let Some(refresh) = refresh {
                params.push(("refresh_token".to_string(), refresh));
            }

            match self.http.post_form(&config.revocation_endpoint, &params).await {
                Ok(response) if response.is_success() => {
                    debug!("tokens revoked at server");
                }
                Ok(response) => {
                    warn!(status = response.status, "revocation endpoint rejected request");
                }
                Err(e) => {
                    warn!(error = %e, "revocation request failed");
                }
            }
        }

        self.clear_tokens().await
    }

    async fn post_token_endpoint(
        &self,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> AuthFlowResult<HttpResponse> {
        self.events.emit(AuthEvent::NetworkRequestStarted { endpoint: endpoint.to_string() });

        let response = match self.http.post_form(endpoint, &params).await {
            Ok(response) => response,
            Err(e) => {
                self.events.emit(AuthEvent::NetworkRequestFailed {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                });
                return Err(NetworkError::Connection(e.to_string()).into());
            }
        };

        self.events.emit(AuthEvent::NetworkRequestCompleted {
            endpoint: endpoint.to_string(),
            status: response.status,
        });

        if !response.is_success() {
            let error_payload = serde_json::from_str(&response.body).ok();
            return Err(NetworkError::HttpStatus {
                endpoint: endpoint.to_string(),
                status: response.status,
                error_payload,
                retry_after_secs: parse_retry_after(&response.headers),
            }
            .into());
        }
        Ok(response)
    }

    async fn parse_and_persist(
        &self,
        endpoint: &str,
        response: HttpResponse,
    ) -> AuthFlowResult<TokenSet> {
        let parsed: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            NetworkError::MalformedBody(format!("token response from '{endpoint}': {e}"))
        })?;
        let tokens = TokenSet::from(parsed);
        self.persist(&tokens).await?;
        Ok(tokens)
    }

    async fn persist(&self, tokens: &TokenSet) -> AuthFlowResult<()> {
        let expiry_ms = tokens.expires_at().map(|at| at.timestamp_millis());
        let record = TokenRecord {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            token_type: tokens.token_type.clone(),
            expiry_ms,
        };

        self.storage.set_token_record(&record).await.map_err(|e| {
            TokenError::PersistFailed {
                operation: "persist_tokens".to_string(),
                message: e.to_string(),
            }
        })?;
        debug!(%record, "persisted tokens");
        Ok(())
    }
}
