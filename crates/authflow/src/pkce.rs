//! PKCE challenge lifecycle
//!
//! Requests challenge material from the injected crypto capability, persists
//! it, and reads it back for the token-exchange step. TTL enforcement is not
//! this module's job; [`crate::state::StateValidator`] owns time-bounded
//! state, and callers needing both guarantees compose the two explicitly.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AuthFlowResult, ConfigError, ValidationError};
use crate::keys;
use crate::traits::{PkceChallenge, PkceProvider, StorageAdapter};

/// Everything persisted for one authorization attempt, null-filled if absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PkceData {
    pub code_verifier: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub state: Option<String>,
}

/// Manages PKCE material through the crypto and storage capabilities
pub struct PkceManager {
    provider: Arc<dyn PkceProvider>,
    storage: Arc<dyn StorageAdapter>,
}

impl PkceManager {
    pub fn new(provider: Arc<dyn PkceProvider>, storage: Arc<dyn StorageAdapter>) -> Self {
        Self { provider, storage }
    }

    /// Produce and persist a fresh challenge triple
    ///
    /// # Errors
    /// Returns a config error when the crypto capability fails, a validation
    /// error when persistence fails
    pub async fn generate_challenge(&self) -> AuthFlowResult<PkceChallenge> {
        let challenge = self
            .provider
            .generate_challenge()
            .await
            .map_err(|e| Self::capability_error(&e.to_string()))?;

        self.set(keys::PKCE_CODE_VERIFIER, &challenge.code_verifier).await?;
        self.set(keys::PKCE_CODE_CHALLENGE, &challenge.code_challenge).await?;
        self.set(keys::PKCE_CODE_CHALLENGE_METHOD, &challenge.code_challenge_method).await?;

        debug!(method = %challenge.code_challenge_method, "generated pkce challenge");
        Ok(challenge)
    }

    /// Produce and persist a random state string
    ///
    /// Persisted under `oauth_state`; coexists with the state validator's
    /// own expiry bookkeeping on the same key.
    ///
    /// # Errors
    /// Returns a config error when the crypto capability fails, a validation
    /// error when persistence fails
    pub async fn generate_state(&self) -> AuthFlowResult<String> {
        let state = self
            .provider
            .generate_state()
            .await
            .map_err(|e| Self::capability_error(&e.to_string()))?;

        self.set(keys::OAUTH_STATE, &state).await?;
        debug!("generated oauth state");
        Ok(state)
    }

    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn get_code_verifier(&self) -> AuthFlowResult<Option<String>> {
        self.get(keys::PKCE_CODE_VERIFIER).await
    }

    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn get_code_challenge(&self) -> AuthFlowResult<Option<String>> {
        self.get(keys::PKCE_CODE_CHALLENGE).await
    }

    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn get_stored_state(&self) -> AuthFlowResult<Option<String>> {
        self.get(keys::OAUTH_STATE).await
    }

    /// Remove verifier, challenge, and method in one batch
    ///
    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn clear_pkce_data(&self) -> AuthFlowResult<()> {
        self.storage
            .remove_batch(&[
                keys::PKCE_CODE_VERIFIER,
                keys::PKCE_CODE_CHALLENGE,
                keys::PKCE_CODE_CHALLENGE_METHOD,
            ])
            .await
            .map_err(|e| Self::storage_error("clear_pkce_data", &e.to_string()))?;
        debug!("cleared pkce data");
        Ok(())
    }

    /// Read back all four persisted fields in one call
    ///
    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn get_all_pkce_data(&self) -> AuthFlowResult<PkceData> {
        Ok(PkceData {
            code_verifier: self.get(keys::PKCE_CODE_VERIFIER).await?,
            code_challenge: self.get(keys::PKCE_CODE_CHALLENGE).await?,
            code_challenge_method: self.get(keys::PKCE_CODE_CHALLENGE_METHOD).await?,
            state: self.get(keys::OAUTH_STATE).await?,
        })
    }

    /// Whether a verifier is currently persisted
    ///
    /// Read failures are suppressed to `false` rather than raised.
    pub async fn has_pkce_data(&self) -> bool {
        match self.storage.get(keys::PKCE_CODE_VERIFIER).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                warn!(error = %e, "pkce verifier unreadable, treating as absent");
                false
            }
        }
    }

    /// Plain equality check against the stored state, TTL-independent
    ///
    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn validate_state(&self, candidate: &str) -> AuthFlowResult<bool> {
        Ok(self.get_stored_state().await?.as_deref() == Some(candidate))
    }

    async fn set(&self, key: &str, value: &str) -> AuthFlowResult<()> {
        self.storage
            .set(key, value)
            .await
            .map_err(|e| Self::storage_error(key, &e.to_string()).into())
    }

    async fn get(&self, key: &str) -> AuthFlowResult<Option<String>> {
        self.storage
            .get(key)
            .await
            .map_err(|e| Self::storage_error(key, &e.to_string()).into())
    }

    fn capability_error(message: &str) -> ConfigError {
        ConfigError::Capability {
            capability: "pkce".to_string(),
            message: message.to_string(),
        }
    }

    fn storage_error(operation: &str, message: &str) -> ValidationError {
        ValidationError::Storage {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{FixedPkce, MemoryStorage};

    fn manager() -> (PkceManager, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let provider = Arc::new(FixedPkce::new("c1", "S256", "v1", "s1"));
        (PkceManager::new(provider, storage.clone()), storage)
    }

    /// Validates `generate_challenge` persistence.
    ///
    /// Assertions:
    /// - Confirms the triple is returned as produced by the capability.
    /// - Confirms verifier, challenge, and method land under their keys.
    #[tokio::test]
    async fn test_generate_challenge_persists_triple() {
        let (manager, storage) = manager();
        let challenge = manager.generate_challenge().await.unwrap();

        assert_eq!(challenge.code_challenge, "c1");
        assert_eq!(challenge.code_verifier, "v1");
        assert_eq!(storage.value(keys::PKCE_CODE_VERIFIER).as_deref(), Some("v1"));
        assert_eq!(storage.value(keys::PKCE_CODE_CHALLENGE).as_deref(), Some("c1"));
        assert_eq!(storage.value(keys::PKCE_CODE_CHALLENGE_METHOD).as_deref(), Some("S256"));
    }

    /// Validates `generate_state` persistence and `validate_state` equality.
    #[tokio::test]
    async fn test_state_roundtrip() {
        let (manager, storage) = manager();
        let state = manager.generate_state().await.unwrap();

        assert_eq!(state, "s1");
        assert_eq!(storage.value(keys::OAUTH_STATE).as_deref(), Some("s1"));
        assert!(manager.validate_state("s1").await.unwrap());
        assert!(!manager.validate_state("s2").await.unwrap());
    }

    /// Validates `clear_pkce_data` scope.
    ///
    /// Assertions:
    /// - Confirms verifier, challenge, and method are removed.
    /// - Confirms the stored state is untouched by the batch clear.
    #[tokio::test]
    async fn test_clear_pkce_data_leaves_state() {
        let (manager, storage) = manager();
        manager.generate_challenge().await.unwrap();
        manager.generate_state().await.unwrap();

        manager.clear_pkce_data().await.unwrap();
        assert!(storage.value(keys::PKCE_CODE_VERIFIER).is_none());
        assert!(storage.value(keys::PKCE_CODE_CHALLENGE).is_none());
        assert_eq!(storage.value(keys::OAUTH_STATE).as_deref(), Some("s1"));
    }

    /// Validates `has_pkce_data` presence check and error suppression.
    ///
    /// Assertions:
    /// - Confirms false before generation and true after.
    /// - Confirms a storage failure is suppressed to false, not raised.
    #[tokio::test]
    async fn test_has_pkce_data_suppresses_read_errors() {
        let (manager, storage) = manager();
        assert!(!manager.has_pkce_data().await);

        manager.generate_challenge().await.unwrap();
        assert!(manager.has_pkce_data().await);

        storage.fail_all(true);
        assert!(!manager.has_pkce_data().await);
    }

    /// Validates `get_all_pkce_data` null-filled read.
    #[tokio::test]
    async fn test_get_all_pkce_data() {
        let (manager, _storage) = manager();
        assert_eq!(manager.get_all_pkce_data().await.unwrap(), PkceData::default());

        manager.generate_challenge().await.unwrap();
        manager.generate_state().await.unwrap();
        let data = manager.get_all_pkce_data().await.unwrap();
        assert_eq!(data.code_verifier.as_deref(), Some("v1"));
        assert_eq!(data.state.as_deref(), Some("s1"));
    }

    /// Validates crypto-capability failure wrapping in `generate_challenge`.
    #[tokio::test]
    async fn test_capability_failure_is_wrapped() {
        let storage = Arc::new(MemoryStorage::new());
        let provider = Arc::new(FixedPkce::failing("rng unavailable"));
        let manager = PkceManager::new(provider, storage);

        let err = manager.generate_challenge().await.unwrap_err();
        assert_eq!(err.code(), "config_capability_failed");
    }
}
