// src/orchestration/mock_rules.rs
//! Mock rule registry
//!
//! Rules are supplied externally and read-only to the core. A rule matches
//! by fingerprint, by URL pattern (`:param` and `*` wildcards), or — in
//! path-match mode — by origin plus pure path. Disabled rules never match.

use crate::resolver::url_apart;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

fn default_enabled() -> bool {
    true
}

/// One configured mock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockRule {
    /// Fingerprint to match on (default matching mode)
    #[serde(default)]
    pub cache_key: Option<String>,

    /// URL pattern with `:param` and `*` wildcards
    #[serde(default)]
    pub url_pattern: Option<String>,

    /// Origin for path-match mode
    #[serde(default)]
    pub origin: Option<String>,

    /// Pure path for path-match mode
    #[serde(default)]
    pub pure_path: Option<String>,

    pub method: String,

    /// Params substituted into the outgoing request when enabled
    #[serde(default)]
    pub params: Option<Value>,

    /// Payload substituted for the response
    pub response: Value,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Delay before the mocked response is delivered
    #[serde(default)]
    pub delay_ms: u64,
}

impl MockRule {
    /// Fingerprint-matched rule
    pub fn for_cache_key(
        cache_key: impl Into<String>,
        method: impl Into<String>,
        response: Value,
    ) -> Self {
        Self {
            cache_key: Some(cache_key.into()),
            url_pattern: None,
            origin: None,
            pure_path: None,
            method: method.into(),
            params: None,
            response,
            enabled: true,
            delay_ms: 0,
        }
    }

    /// Path-matched rule
    pub fn for_path(
        origin: impl Into<String>,
        pure_path: impl Into<String>,
        method: impl Into<String>,
        response: Value,
    ) -> Self {
        Self {
            cache_key: None,
            url_pattern: None,
            origin: Some(origin.into()),
            pure_path: Some(pure_path.into()),
            method: method.into(),
            params: None,
            response,
            enabled: true,
            delay_ms: 0,
        }
    }

    fn matches(&self, url: &str, method: &str, cache_key: &str, path_match: bool) -> bool {
        if !self.enabled || !self.method.eq_ignore_ascii_case(method) {
            return false;
        }

        if path_match {
            return match (&self.origin, &self.pure_path) {
                (Some(origin), Some(path)) => {
                    let parts = url_apart(url);
                    *origin == parts.origin && *path == parts.pure_path
                }
                _ => false,
            };
        }

        if let Some(key) = &self.cache_key {
            return key == cache_key;
        }
        if let Some(pattern) = &self.url_pattern {
            return pattern_to_regex(pattern)
                .map(|regex| regex.is_match(url))
                .unwrap_or(false);
        }
        false
    }
}

/// Compile a `:param`/`*` pattern into an anchored regex
fn pattern_to_regex(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern);
    // regex::escape leaves ':' and word characters alone, so :param survives
    let with_params = match Regex::new(r":\w+") {
        Ok(param) => param.replace_all(&escaped, "([^/]+)").into_owned(),
        Err(_) => escaped,
    };
    let with_wildcards = with_params.replace(r"\*", ".*");
    Regex::new(&format!("^{}$", with_wildcards)).ok()
}

/// Read-mostly registry of mock rules
pub struct MockRegistry {
    rules: RwLock<Vec<MockRule>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }

    /// Replace the rule list wholesale
    pub fn replace(&self, rules: Vec<MockRule>) {
        debug!("Loaded {} mock rules", rules.len());
        *self.rules.write() = rules;
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// First matching enabled rule, if any
    pub fn find_match(
        &self,
        url: &str,
        method: &str,
        cache_key: &str,
        path_match: bool,
    ) -> Option<MockRule> {
        self.rules
            .read()
            .iter()
            .find(|rule| rule.matches(url, method, cache_key, path_match))
            .cloned()
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
