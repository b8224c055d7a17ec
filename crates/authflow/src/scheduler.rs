//! Automatic refresh scheduling
//!
//! Arms a single, cancellable timer that fires a caller-supplied refresh
//! callback shortly before token expiration. At most one timer may be armed
//! at a time; scheduling a new one cancels any prior one, and the scheduler
//! never re-arms itself after a fire. Retry policy stays with the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::AuthFlowResult;
use crate::events::{AuthEvent, EventBus};
use crate::types::TokenSet;

/// Smallest delay worth arming a timer for
pub const DEFAULT_MIN_REFRESH_DELAY: Duration = Duration::from_secs(1);
/// Largest delay a single timer may cover
pub const DEFAULT_MAX_REFRESH_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// One-shot refresh timer over the tokio clock
pub struct RefreshScheduler {
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    events: Mutex<Option<EventBus>>,
    min_delay: Duration,
    max_delay: Duration,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self::with_bounds(events, DEFAULT_MIN_REFRESH_DELAY, DEFAULT_MAX_REFRESH_DELAY)
    }

    #[must_use]
    pub fn with_bounds(events: EventBus, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            handle: Arc::new(Mutex::new(None)),
            events: Mutex::new(Some(events)),
            min_delay,
            max_delay,
        }
    }

    /// Arm a refresh timer for a token set
    ///
    /// The delay is `max(0, time_until_expiration - buffer)`, clamped to the
    /// configured bounds. When the unclamped delay is already below the
    /// minimum the token needs refreshing now; nothing is armed and a
    /// warning surfaces instead. Returns whether a timer was armed.
    ///
    /// Any previously armed timer is cancelled first. On fire the callback
    /// runs exactly once; its failure is reported, never retried here.
    pub fn schedule_refresh<F, Fut>(&self, tokens: &TokenSet, buffer: Duration, callback: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AuthFlowResult<()>> + Send + 'static,
    {
        let Some(remaining) = tokens.time_until_expiration() else {
            warn!("refresh not scheduled: token has no known lifetime");
            self.emit(AuthEvent::RefreshSkipped {
                reason: "token has no known lifetime".to_string(),
            });
            return false;
        };

        let unclamped = remaining.saturating_sub(buffer);
        if unclamped < self.min_delay {
            warn!(
                remaining_secs = remaining.as_secs(),
                buffer_secs = buffer.as_secs(),
                "refresh not scheduled: token expires too soon"
            );
            self.emit(AuthEvent::RefreshSkipped {
                reason: "token expires too soon to schedule a refresh".to_string(),
            });
            return false;
        }

        let delay = unclamped.clamp(self.min_delay, self.max_delay);
        self.cancel_scheduled_refresh();

        let fire_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(24));
        self.emit(AuthEvent::RefreshScheduled { fire_at, buffer_ms: buffer.as_millis() as u64 });
        debug!(delay_secs = delay.as_secs(), "refresh scheduled");

        let slot = Arc::clone(&self.handle);
        let events = self.events.lock().clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = callback().await;
            // The timer is spent either way; drop the handle so a stale
            // `is_refresh_scheduled` cannot read true
            slot.lock().take();
            if let Err(err) = result {
                warn!(error = %err, "scheduled refresh callback failed");
                if let Some(bus) = events {
                    bus.emit(AuthEvent::AuthError {
                        code: err.code().to_string(),
                        message: err.to_string(),
                        retryable: crate::error::ErrorClassification::is_retryable(&err),
                    });
                }
            }
        });
        *self.handle.lock() = Some(task);
        true
    }

    /// Cancel any armed timer
    ///
    /// Clearing the handle before aborting means a cancelled timer can
    /// never double-execute its callback.
    pub fn cancel_scheduled_refresh(&self) {
        if let Some(task) = self.handle.lock().take() {
            task.abort();
            debug!("cancelled scheduled refresh");
        }
    }

    /// Whether a timer is currently armed
    #[must_use]
    pub fn is_refresh_scheduled(&self) -> bool {
        self.handle.lock().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel and detach from the notification sink
    pub fn destroy(&self) {
        self.cancel_scheduled_refresh();
        self.events.lock().take();
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &*self.events.lock() {
            bus.emit(event);
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.handle.lock().take() {
            task.abort();
        }
    }
}
