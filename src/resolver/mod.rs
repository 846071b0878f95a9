// src/resolver/mod.rs
//! Cache-key and status resolution
//!
//! Pure functions shared by the interception pipeline and the orchestration
//! layer:
//!
//! - **Cache Key**: canonical request fingerprints invariant to query and
//!   JSON key ordering, with volatile cache-buster parameters stripped
//! - **Status**: CACHE / RECOVERY / ERROR_NO_CACHE classification against
//!   the temporary-server-error code set

pub mod cache_key;
pub mod status;

// Re-export commonly used types
pub use cache_key::{canonical_key, normalize_url, stable_params, url_apart, UrlParts};
pub use cache_key::VOLATILE_QUERY_PARAMS;
pub use status::{classify, is_server_temp_error, ProcessStatus, SERVER_TEMP_ERROR_CODES};
