//! Test support utilities
//!
//! In-memory adapter implementations used by the crate's own tests and
//! available to hosts writing tests against the coordinator without real
//! storage, network, or crypto.

pub mod mocks;
