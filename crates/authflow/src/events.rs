//! Lifecycle event surface
//!
//! Every observable moment in the pipelines is a variant of [`AuthEvent`],
//! delivered through an [`EventBus`] backed by a `tokio` broadcast channel.
//! Components receive the bus at construction and never reach into a global
//! emitter. Zero subscribers is legal; emission is fire-and-forget.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::AuthStatus;

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 64;

/// Lifecycle notification with a fixed payload shape
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    StatusChanged { from: AuthStatus, to: AuthStatus },
    TokenRefreshed { expires_in: Option<i64> },
    TokenExpired,
    RefreshScheduled { fire_at: DateTime<Utc>, buffer_ms: u64 },
    /// A refresh was requested but the token expires too soon to arm a timer
    RefreshSkipped { reason: String },
    AuthSuccess { flow: String },
    AuthError { code: String, message: String, retryable: bool },
    LoadingStarted { operation: String },
    LoadingEnded { operation: String },
    LoggedOut { reason: Option<String> },
    ConfigValidated { warnings: Vec<String> },
    PkceGenerated { code_challenge: String, method: String },
    StateGenerated { state: String },
    AuthUrlGenerated { url: String },
    CallbackStarted { explicit_flow: Option<String> },
    CallbackCompleted { flow: String, success: bool },
    FlowDetected { flow: String, confidence: u8, reason: String },
    TokensStored,
    TokensCleared,
    NetworkRequestStarted { endpoint: String },
    NetworkRequestCompleted { endpoint: String, status: u16 },
    NetworkRequestFailed { endpoint: String, message: String },
}

/// Broadcast fan-out for [`AuthEvent`]
///
/// Cloning shares the underlying channel. Lagged subscribers drop the oldest
/// events, the standard `broadcast` trade-off.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers
    ///
    /// A send error only means nobody is listening; that is not a failure.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.sender.send(event);
    }

    /// Open a new subscription; only events emitted after this call arrive
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
