//! Persisted storage keys
//!
//! All values live under one conceptual flat namespace in the injected
//! storage capability. Hosts that need isolation between clients should
//! namespace the storage adapter itself, not these keys.

/// PKCE code verifier (secret, only transmitted at token exchange)
pub const PKCE_CODE_VERIFIER: &str = "pkce_code_verifier";
/// PKCE code challenge
pub const PKCE_CODE_CHALLENGE: &str = "pkce_code_challenge";
/// PKCE challenge method (usually "S256")
pub const PKCE_CODE_CHALLENGE_METHOD: &str = "pkce_code_challenge_method";
/// CSRF state round-tripped through the authorization redirect
pub const OAUTH_STATE: &str = "oauth_state";
/// Absolute CSRF state expiry, epoch milliseconds
pub const OAUTH_STATE_EXPIRY: &str = "oauth_state_expiry";
/// Issued access token
pub const ACCESS_TOKEN: &str = "access_token";
/// Issued refresh token
pub const REFRESH_TOKEN: &str = "refresh_token";
/// Issued token type
pub const TOKEN_TYPE: &str = "token_type";
/// Absolute access token expiry, epoch milliseconds
pub const TOKEN_EXPIRY: &str = "token_expiry";
