// src/observability/mod.rs
//! Tracing and logging initialization
//!
//! Structured logging via `tracing`. Set `RUST_LOG` (e.g. `reqguard=debug`)
//! to control verbosity; `REQGUARD_LOG_JSON=1` switches to JSON output.

use crate::utils::errors::{EngineError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber
///
/// Idempotent in practice: a second call fails with `ConfigError` instead of
/// panicking, so embedding hosts that already installed a subscriber can
/// ignore the result.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_output = std::env::var("REQGUARD_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let result = if json_output {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    result.map_err(|e| EngineError::ConfigError(format!("Failed to init tracing: {}", e)))
}
