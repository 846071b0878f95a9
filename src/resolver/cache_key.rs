// src/resolver/cache_key.rs
//! Canonical request fingerprints
//!
//! A fingerprint is the xxh3 hash of the normalized URL, the stably
//! serialized request parameters, and the upper-cased method. Volatile
//! cache-busting query parameters are stripped and the rest sorted so that
//! equivalent requests always hash to the same key. Collisions degrade to a
//! cache miss, never to corruption.

use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

/// Query parameters that only exist to defeat HTTP caches
pub const VOLATILE_QUERY_PARAMS: &[&str] = &[
    "t",
    "timestamp",
    "_t",
    "_timestamp",
    "time",
    "ts",
    "v",
    "_",
    "taskUuid",
];

/// URL split into origin, path and query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    /// `scheme://host[:port]`, empty for relative URLs
    pub origin: String,

    /// Path without query or fragment
    pub pure_path: String,

    /// Raw query string without the leading `?`
    pub query: String,
}

/// Strip volatile query parameters and sort the remainder
pub fn normalize_url(url: &str) -> String {
    let (without_fragment, fragment) = match url.split_once('#') {
        Some((u, f)) => (u, Some(f)),
        None => (url, None),
    };
    let (base, query) = match without_fragment.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (without_fragment, None),
    };

    let mut normalized = String::from(base);

    if let Some(query) = query {
        let mut pairs: Vec<(&str, &str)> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let key = pair.split_once('=').map(|(k, _)| k).unwrap_or(pair);
                (key, pair)
            })
            .filter(|(key, _)| !VOLATILE_QUERY_PARAMS.contains(key))
            .collect();

        pairs.sort();

        if !pairs.is_empty() {
            normalized.push('?');
            for (i, (_, pair)) in pairs.iter().enumerate() {
                if i > 0 {
                    normalized.push('&');
                }
                normalized.push_str(pair);
            }
        }
    }

    if let Some(fragment) = fragment {
        normalized.push('#');
        normalized.push_str(fragment);
    }

    normalized
}

/// Recursively sort object keys into a stable serialization
///
/// Insertion order of the source value never leaks into the output.
pub fn stable_params(value: &Value) -> String {
    deep_sort(value).to_string()
}

fn deep_sort(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), deep_sort(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(deep_sort).collect()),
        other => other.clone(),
    }
}

/// Compute the canonical fingerprint for a request
///
/// Without params the fingerprint covers `url|METHOD`; with params it covers
/// `url|stableParams|METHOD`, so the two cases never collide on the same
/// input text.
pub fn canonical_key(url: &str, params: Option<&Value>, method: &str) -> String {
    let normalized = normalize_url(url);
    let method = method.to_ascii_uppercase();

    let fingerprint = match params {
        Some(params) => format!("{}|{}|{}", normalized, stable_params(params), method),
        None => format!("{}|{}", normalized, method),
    };

    format!("{:016x}", xxh3_64(fingerprint.as_bytes()))
}

/// Split a URL into origin, pure path and query
pub fn url_apart(url: &str) -> UrlParts {
    let without_fragment = match url.split_once('#') {
        Some((u, _)) => u,
        None => url,
    };
    let (base, query) = match without_fragment.split_once('?') {
        Some((b, q)) => (b, q),
        None => (without_fragment, ""),
    };

    if let Some(scheme_end) = base.find("://") {
        let authority = &base[scheme_end + 3..];
        match authority.find('/') {
            Some(path_start) => UrlParts {
                origin: base[..scheme_end + 3 + path_start].to_string(),
                pure_path: authority[path_start..].to_string(),
                query: query.to_string(),
            },
            None => UrlParts {
                origin: base.to_string(),
                pure_path: "/".to_string(),
                query: query.to_string(),
            },
        }
    } else {
        UrlParts {
            origin: String::new(),
            pure_path: base.to_string(),
            query: query.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_normalize_strips_volatile_params() {
        assert_eq!(
            normalize_url("https://api.example.com/list?t=9999"),
            "https://api.example.com/list"
        );
        assert_eq!(
            normalize_url("https://api.example.com/list?t=1&page=2&_=42"),
            "https://api.example.com/list?page=2"
        );
    }

    #[test]
    fn test_normalize_sorts_query_params() {
        assert_eq!(
            normalize_url("https://a/b?y=2&x=1"),
            normalize_url("https://a/b?x=1&y=2")
        );
        assert_eq!(normalize_url("https://a/b?y=2&x=1"), "https://a/b?x=1&y=2");
    }

    #[test]
    fn test_key_invariant_to_reordering() {
        let a = canonical_key("https://a?x=1&y=2", Some(&json!({"b": 2, "a": 1})), "GET");
        let b = canonical_key("https://a?y=2&x=1", Some(&json!({"a": 1, "b": 2})), "GET");
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_strips_volatile_params() {
        let a = canonical_key("https://a?t=9999", Some(&json!({})), "GET");
        let b = canonical_key("https://a?t=1", Some(&json!({})), "GET");
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_without_params_distinct() {
        let with = canonical_key("https://a/b", Some(&json!({})), "GET");
        let without = canonical_key("https://a/b", None, "GET");
        assert_ne!(with, without);
    }

    #[test]
    fn test_key_sensitive_to_method() {
        let get = canonical_key("https://a/b", None, "GET");
        let post = canonical_key("https://a/b", None, "POST");
        assert_ne!(get, post);
        // Method case does not matter
        assert_eq!(get, canonical_key("https://a/b", None, "get"));
    }

    #[test]
    fn test_stable_params_nested() {
        let a = json!({"outer": {"b": [1, {"y": 2, "x": 1}], "a": 0}});
        let b = json!({"outer": {"a": 0, "b": [1, {"x": 1, "y": 2}]}});
        assert_eq!(stable_params(&a), stable_params(&b));
    }

    #[test]
    fn test_url_apart_absolute() {
        let parts = url_apart("https://api.example.com:8443/v1/list?page=2#frag");
        assert_eq!(parts.origin, "https://api.example.com:8443");
        assert_eq!(parts.pure_path, "/v1/list");
        assert_eq!(parts.query, "page=2");
    }

    #[test]
    fn test_url_apart_relative() {
        let parts = url_apart("/v1/list?page=2");
        assert_eq!(parts.origin, "");
        assert_eq!(parts.pure_path, "/v1/list");
        assert_eq!(parts.query, "page=2");
    }

    #[test]
    fn test_url_apart_bare_origin() {
        let parts = url_apart("https://api.example.com");
        assert_eq!(parts.origin, "https://api.example.com");
        assert_eq!(parts.pure_path, "/");
    }

    proptest! {
        #[test]
        fn prop_key_invariant_to_query_order(
            mut params in proptest::collection::vec(("[a-m]{1,4}", "[0-9]{1,4}"), 1..6)
        ) {
            params.sort();
            params.dedup_by(|a, b| a.0 == b.0);

            let forward = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            let reversed = params
                .iter()
                .rev()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");

            let a = canonical_key(&format!("https://a/b?{}", forward), None, "GET");
            let b = canonical_key(&format!("https://a/b?{}", reversed), None, "GET");
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_stable_params_invariant_to_insertion_order(
            keys in proptest::collection::hash_set("[a-z]{1,6}", 1..8)
        ) {
            let keys: Vec<String> = keys.into_iter().collect();

            let mut forward = serde_json::Map::new();
            for (i, key) in keys.iter().enumerate() {
                forward.insert(key.clone(), json!(i));
            }
            let mut reversed = serde_json::Map::new();
            for (i, key) in keys.iter().enumerate().rev() {
                reversed.insert(key.clone(), json!(i));
            }

            prop_assert_eq!(
                stable_params(&Value::Object(forward)),
                stable_params(&Value::Object(reversed))
            );
        }
    }
}
