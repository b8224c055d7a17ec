//! Deprecated error-code aliases
//!
//! Earlier releases exposed a different set of machine codes. The mapping
//! lives here so internal logic never matches on legacy strings; hosts that
//! still receive old codes from persisted queues or logs can normalize them
//! at their boundary.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static LEGACY_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("oauth_http_error", "network_http_error"),
        ("oauth_network_error", "network_connection_failed"),
        ("oauth_parse_error", "network_malformed_body"),
        ("oauth_token_expired", "token_expired"),
        ("oauth_no_refresh_token", "refresh_token_missing"),
        ("oauth_refresh_failed", "token_refresh_failed"),
        ("oauth_state_invalid", "state_mismatch"),
        ("oauth_state_expired", "state_missing"),
        ("oauth_flow_not_found", "flow_not_detected"),
        ("oauth_flow_error", "flow_execution_failed"),
    ])
});

/// Resolve a possibly-legacy code to its canonical form
///
/// Unknown codes pass through unchanged so current codes resolve to
/// themselves.
#[must_use]
pub fn canonical_code(code: &str) -> &str {
    LEGACY_CODES.get(code).copied().unwrap_or(code)
}
