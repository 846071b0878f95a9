// src/utils/errors.rs
//! Engine error types
//!
//! Every fallible path in the crate returns [`Result`]. Errors at the
//! interception boundary are logged and degraded rather than propagated into
//! the caller's own code path.

use thiserror::Error;

/// Engine-wide error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// A registered hook returned an error or panicked
    #[error("hook execution failed: {0}")]
    HookFailed(String),

    /// A body was not valid JSON when JSON handling was attempted
    #[error("response parse failed: {0}")]
    ParseFailed(String),

    /// Interception pipeline failure
    #[error("interception failed: {0}")]
    InterceptionFailed(String),

    /// Underlying transport failure
    #[error("transport failed: {0}")]
    TransportFailed(String),

    /// Durable store failure
    #[error("storage failed: {0}")]
    StorageFailed(String),

    /// Durable write exceeded the backing medium's byte quota
    #[error("storage quota exceeded: {size} bytes > {limit} bytes")]
    QuotaExceeded { size: u64, limit: u64 },

    /// Configuration loading or validation failure
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The request was aborted without a response handler
    #[error("request aborted")]
    Aborted,
}

/// Engine-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;
