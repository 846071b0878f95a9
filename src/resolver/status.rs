// src/resolver/status.rs
//! Response classification
//!
//! Classifies each completed exchange into one of three processing outcomes
//! driving the disaster-recovery decision. Pure function, no I/O.

use serde::{Deserialize, Serialize};

/// Status codes treated as temporary server errors
///
/// 404 is included deliberately: origins under partial outage are frequently
/// observed returning 404 for routes that exist. 520-526 are the CDN-edge
/// codes for an unreachable or failing origin.
pub const SERVER_TEMP_ERROR_CODES: &[u16] = &[
    404, 500, 502, 503, 504, 520, 521, 522, 523, 524, 525, 526,
];

/// Processing outcome for one classified exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Healthy response: cache (or refresh) the body
    Cache,

    /// Temporary server error with a cached body available: substitute it
    Recovery,

    /// Temporary server error and nothing cached: pass the error through
    ErrorNoCache,
}

/// Whether a status code is in the temporary server error set
pub fn is_server_temp_error(status: u16) -> bool {
    SERVER_TEMP_ERROR_CODES.contains(&status)
}

/// Classify a response status against cache availability
pub fn classify(status: u16, has_cache_entry: bool) -> ProcessStatus {
    let is_error = is_server_temp_error(status);
    if is_error && !has_cache_entry {
        ProcessStatus::ErrorNoCache
    } else if is_error && has_cache_entry {
        ProcessStatus::Recovery
    } else {
        ProcessStatus::Cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_without_cache() {
        assert_eq!(classify(500, false), ProcessStatus::ErrorNoCache);
        assert_eq!(classify(503, false), ProcessStatus::ErrorNoCache);
        assert_eq!(classify(524, false), ProcessStatus::ErrorNoCache);
    }

    #[test]
    fn test_classify_error_with_cache() {
        assert_eq!(classify(500, true), ProcessStatus::Recovery);
        assert_eq!(classify(404, true), ProcessStatus::Recovery);
    }

    #[test]
    fn test_classify_healthy() {
        assert_eq!(classify(200, false), ProcessStatus::Cache);
        assert_eq!(classify(200, true), ProcessStatus::Cache);
        assert_eq!(classify(201, false), ProcessStatus::Cache);
        // 4xx outside the temp-error set is not recovery material
        assert_eq!(classify(401, true), ProcessStatus::Cache);
    }

    #[test]
    fn test_temp_error_set() {
        assert!(is_server_temp_error(502));
        assert!(is_server_temp_error(526));
        assert!(!is_server_temp_error(501));
        assert!(!is_server_temp_error(200));
    }
}
