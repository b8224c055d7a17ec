//! CSRF state validation
//!
//! Issues and checks the opaque state value round-tripped through the
//! authorization redirect. State is single-use with an absolute expiry: a
//! successful validation consumes it, a mismatch leaves storage untouched so
//! the legitimate callback can still complete.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{AuthFlowResult, ValidationError};
use crate::keys;
use crate::traits::StorageAdapter;

/// Default state lifetime, ten minutes
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Validates CSRF state tokens against a persisted value and expiry
pub struct StateValidator {
    storage: Arc<dyn StorageAdapter>,
}

impl StateValidator {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Persist a state value with an absolute expiry of `now + ttl`
    ///
    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn store_state(&self, state: &str, ttl: Option<Duration>) -> AuthFlowResult<()> {
        let ttl = ttl.unwrap_or(DEFAULT_STATE_TTL);
        let expiry_ms = Utc::now().timestamp_millis() + ttl.as_millis() as i64;

        self.storage
            .set(keys::OAUTH_STATE, state)
            .await
            .map_err(|e| Self::storage_error("store_state", &e.to_string()))?;
        self.storage
            .set(keys::OAUTH_STATE_EXPIRY, &expiry_ms.to_string())
            .await
            .map_err(|e| Self::storage_error("store_state", &e.to_string()))?;

        debug!(ttl_secs = ttl.as_secs(), "stored oauth state");
        Ok(())
    }

    /// Read back the stored state, `None` if absent
    ///
    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn get_stored_state(&self) -> AuthFlowResult<Option<String>> {
        self.storage
            .get(keys::OAUTH_STATE)
            .await
            .map_err(|e| Self::storage_error("get_stored_state", &e.to_string()).into())
    }

    /// Whether the stored state has expired
    ///
    /// Missing expiry or `now >= expiry` means expired (inclusive boundary).
    /// A storage failure degrades to `true` rather than raising: an
    /// unreadable expiry is treated as expired, the fail-closed answer.
    pub async fn is_state_expired(&self) -> bool {
        match self.storage.get(keys::OAUTH_STATE_EXPIRY).await {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(expiry_ms) => Utc::now().timestamp_millis() >= expiry_ms,
                Err(_) => true,
            },
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "state expiry unreadable, treating as expired");
                true
            }
        }
    }

    /// Whether a stored, unexpired state exists
    ///
    /// A storage failure degrades to `false` rather than raising.
    pub async fn has_stored_state(&self) -> bool {
        let present = matches!(self.storage.get(keys::OAUTH_STATE).await, Ok(Some(_)));
        present && !self.is_state_expired().await
    }

    /// Validate a candidate against the stored state
    ///
    /// Returns `true` only if a stored, unexpired state exists and matches
    /// exactly; success clears both state and expiry (single-use). A
    /// mismatch leaves storage untouched.
    ///
    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn validate_state(&self, candidate: &str) -> AuthFlowResult<bool> {
        let stored = self.get_stored_state().await?;
        let Some(stored) = stored else {
            debug!("state validation failed: nothing stored");
            return Ok(false);
        };

        if self.is_state_expired().await {
            debug!("state validation failed: stored state expired");
            return Ok(false);
        }
        if stored != candidate {
            warn!("state validation failed: mismatch");
            return Ok(false);
        }

        // Consume on success so the state cannot validate twice
        self.storage
            .remove_batch(&[keys::OAUTH_STATE, keys::OAUTH_STATE_EXPIRY])
            .await
            .map_err(|e| Self::storage_error("validate_state", &e.to_string()))?;
        debug!("state validated and consumed");
        Ok(true)
    }

    /// Validate a candidate, raising on failure
    ///
    /// # Errors
    /// Returns [`ValidationError::StateMismatch`] when validation fails,
    /// or a wrapped storage failure
    pub async fn validate_state_or_raise(&self, candidate: &str) -> AuthFlowResult<()> {
        if self.validate_state(candidate).await? {
            Ok(())
        } else {
            Err(ValidationError::StateMismatch { received: candidate.to_string() }.into())
        }
    }

    /// Push the stored expiry further into the future
    ///
    /// # Errors
    /// Returns [`ValidationError::StateMissing`] when no expiry is stored,
    /// or a wrapped storage failure
    pub async fn extend_state_expiry(&self, extra: Duration) -> AuthFlowResult<()> {
        let raw = self
            .storage
            .get(keys::OAUTH_STATE_EXPIRY)
            .await
            .map_err(|e| Self::storage_error("extend_state_expiry", &e.to_string()))?;
        let current: i64 = raw
            .and_then(|v| v.parse().ok())
            .ok_or(ValidationError::StateMissing)?;

        let extended = current + extra.as_millis() as i64;
        self.storage
            .set(keys::OAUTH_STATE_EXPIRY, &extended.to_string())
            .await
            .map_err(|e| Self::storage_error("extend_state_expiry", &e.to_string()))?;
        debug!(extra_ms = extra.as_millis() as u64, "extended state expiry");
        Ok(())
    }

    /// Remove the stored state if it has expired
    ///
    /// Returns whether anything was removed.
    ///
    /// # Errors
    /// Returns a validation error wrapping any storage failure
    pub async fn cleanup_expired_state(&self) -> AuthFlowResult<bool> {
        if !self.is_state_expired().await {
            return Ok(false);
        }
        let had_state = self.get_stored_state().await?.is_some();
        if !had_state {
            return Ok(false);
        }
        self.storage
            .remove_batch(&[keys::OAUTH_STATE, keys::OAUTH_STATE_EXPIRY])
            .await
            .map_err(|e| Self::storage_error("cleanup_expired_state", &e.to_string()))?;
        debug!("removed expired state");
        Ok(true)
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
    use crate::testing::mocks::MemoryStorage;

    fn validator() -> (StateValidator, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (StateValidator::new(storage.clone()), storage)
    }

    /// Validates `validate_state` single-use enforcement.
    ///
    /// Assertions:
    /// - Confirms the first validation of a stored state succeeds.
    /// - Confirms the same candidate fails a second validation because the
    ///   first success consumed it.
    #[tokio::test]
    async fn test_state_is_single_use() {
        let (validator, _storage) = validator();
        validator.store_state("s1", None).await.unwrap();

        assert!(validator.validate_state("s1").await.unwrap());
        assert!(!validator.validate_state("s1").await.unwrap());
    }

    /// Validates `validate_state` mismatch behavior.
    ///
    /// Assertions:
    /// - Ensures a wrong candidate returns false.
    /// - Ensures the stored state survives the mismatch so the legitimate
    ///   callback can still validate.
    #[tokio::test]
    async fn test_mismatch_leaves_state_intact() {
        let (validator, _storage) = validator();
        validator.store_state("s1", None).await.unwrap();

        assert!(!validator.validate_state("wrong").await.unwrap());
        assert!(validator.validate_state("s1").await.unwrap());
    }

    /// Validates `is_state_expired` boundary and fail-closed behavior.
    ///
    /// Assertions:
    /// - Confirms a zero-TTL state reads as expired (inclusive boundary).
    /// - Confirms a missing expiry reads as expired.
    /// - Confirms a storage failure degrades to expired.
    #[tokio::test]
    async fn test_expiry_is_inclusive_and_fail_closed() {
        let (validator, storage) = validator();
        validator.store_state("s1", Some(Duration::ZERO)).await.unwrap();
        assert!(validator.is_state_expired().await);

        storage.clear();
        assert!(validator.is_state_expired().await);

        storage.fail_all(true);
        assert!(validator.is_state_expired().await);
    }

    /// Validates `has_stored_state` composite requirement.
    ///
    /// Assertions:
    /// - Confirms true only when a state is present and unexpired.
    /// - Confirms a storage failure degrades to false.
    #[tokio::test]
    async fn test_has_stored_state() {
        let (validator, storage) = validator();
        assert!(!validator.has_stored_state().await);

        validator.store_state("s1", None).await.unwrap();
        assert!(validator.has_stored_state().await);

        storage.fail_all(true);
        assert!(!validator.has_stored_state().await);
    }

    /// Validates `get_stored_state` storage-failure wrapping.
    ///
    /// Assertions:
    /// - Confirms a storage failure surfaces as a wrapped validation error,
    ///   not a raw adapter error.
    #[tokio::test]
    async fn test_get_stored_state_wraps_storage_errors() {
        let (validator, storage) = validator();
        validator.store_state("s1", None).await.unwrap();

        storage.fail_all(true);
        let err = validator.get_stored_state().await.unwrap_err();
        assert_eq!(err.code(), "storage_failure");
    }

    /// Validates `validate_state_or_raise` error mapping.
    #[tokio::test]
    async fn test_validate_or_raise() {
        let (validator, _storage) = validator();
        validator.store_state("s1", None).await.unwrap();

        let err = validator.validate_state_or_raise("other").await.unwrap_err();
        assert_eq!(err.code(), "state_mismatch");
        assert!(validator.validate_state_or_raise("s1").await.is_ok());
    }

    /// Validates `extend_state_expiry` on an expired state.
    ///
    /// Assertions:
    /// - Confirms extending a zero-TTL state makes it valid again.
    /// - Confirms extending with nothing stored raises `state_missing`.
    #[tokio::test]
    async fn test_extend_state_expiry() {
        let (validator, storage) = validator();
        validator.store_state("s1", Some(Duration::ZERO)).await.unwrap();
        assert!(validator.is_state_expired().await);

        validator.extend_state_expiry(Duration::from_secs(60)).await.unwrap();
        assert!(!validator.is_state_expired().await);

        storage.clear();
        let err = validator.extend_state_expiry(Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err.code(), "state_missing");
    }

    /// Validates `cleanup_expired_state` housekeeping.
    ///
    /// Assertions:
    /// - Confirms an expired state is removed and reported.
    /// - Confirms an unexpired state is left alone.
    #[tokio::test]
    async fn test_cleanup_expired_state() {
        let (validator, _storage) = validator();
        validator.store_state("s1", Some(Duration::ZERO)).await.unwrap();
        assert!(validator.cleanup_expired_state().await.unwrap());
        assert!(validator.get_stored_state().await.unwrap().is_none());

        validator.store_state("s2", None).await.unwrap();
        assert!(!validator.cleanup_expired_state().await.unwrap());
        assert_eq!(validator.get_stored_state().await.unwrap().as_deref(), Some("s2"));
    }
}
