//! Client-side OAuth flow orchestration
//!
//! This crate drives authorization-code-with-PKCE and magic-link flows
//! against an OAuth-compatible backend without embedding any network,
//! storage, or cryptographic implementation. Hosts inject those as adapter
//! capabilities ([`traits::StorageAdapter`], [`traits::HttpAdapter`],
//! [`traits::PkceProvider`]); the crate supplies the orchestration:
//!
//! - [`flow::FlowRegistry`]: priority-ordered flow dispatch with
//!   confidence-scored auto-detection
//! - [`state::StateValidator`]: single-use, time-bounded CSRF state
//! - [`pkce::PkceManager`]: PKCE challenge lifecycle
//! - [`token::TokenManager`]: token exchange, refresh, revocation, and
//!   expiration tracking
//! - [`scheduler::RefreshScheduler`]: bounded, cancellable refresh timing
//! - [`coordinator::AuthCoordinator`]: the composition root, sequencing
//!   the pipelines and emitting [`events::AuthEvent`] notifications
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use authflow::config::AuthConfig;
//! use authflow::coordinator::AuthCoordinator;
//! # use authflow::testing::mocks::{FixedPkce, MemoryStorage, MockHttp};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig {
//!     client_id: "client-1".into(),
//!     authorization_endpoint: "https://auth.example/authorize".into(),
//!     token_endpoint: "https://auth.example/token".into(),
//!     revocation_endpoint: "https://auth.example/revoke".into(),
//!     redirect_uri: "app://callback".into(),
//!     scopes: vec!["read".into(), "write".into()],
//!     flows: Default::default(),
//! };
//! let coordinator = AuthCoordinator::new(
//!     config,
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(MockHttp::new()),
//!     Arc::new(FixedPkce::new("c1", "S256", "v1", "s1")),
//! );
//!
//! let url = coordinator.generate_authorization_url(&[]).await?;
//! // ...redirect the user, then:
//! let result = coordinator.handle_callback_query("?code=abc&state=s1", None).await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod flow;
pub mod keys;
pub mod pkce;
pub mod scheduler;
pub mod state;
pub mod testing;
pub mod token;
pub mod traits;
pub mod types;

pub use config::{AuthConfig, ConfigWarning, DetectionStrategy, FlowConfig};
pub use coordinator::AuthCoordinator;
pub use error::{
    AuthFlowError, AuthFlowResult, ConfigError, ErrorClassification, ErrorSeverity, ErrorType,
    FlowError, NetworkError, TokenError, ValidationError,
};
pub use events::{AuthEvent, EventBus};
pub use flow::{
    AuthorizationCodeHandler, FlowContext, FlowHandler, FlowMatch, FlowRegistry, MagicLinkHandler,
};
pub use pkce::{PkceData, PkceManager};
pub use scheduler::RefreshScheduler;
pub use state::StateValidator;
pub use token::TokenManager;
pub use traits::{
    AdapterError, HttpAdapter, HttpResponse, PkceChallenge, PkceProvider, StorageAdapter,
    TokenRecord,
};
pub use types::{AuthStatus, CallbackParams, OAuthResult, TokenResponse, TokenSet};
