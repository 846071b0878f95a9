// src/orchestration/bootstrap.rs
//! Per-context bootstrap
//!
//! Wires the interception pipeline, the resolver and the cache manager
//! together: one hook computes the request fingerprint and applies
//! request-side mock substitution, then installs a response handler that
//! filters for JSON exchanges, classifies the outcome, applies mock or
//! disaster-recovery substitution and publishes observation events.
//!
//! Configuration can arrive after the first requests are already in flight;
//! bootstrap waits for it with a bounded, small-fixed-interval retry loop.
//! That loop exists only for late configuration, never for network timing.

use crate::cache::{CacheEntry, CacheManager};
use crate::interception::hook_engine::{modify_json, HookEngine, HookSet};
use crate::interception::response::InterceptedResponse;
use crate::orchestration::mock_rules::{MockRegistry, MockRule};
use crate::orchestration::observer::{ExchangeEvent, ExchangeEventType, ObservationQueue};
use crate::resolver::{canonical_key, classify, ProcessStatus};
use crate::utils::config::{BootstrapSettings, EngineConfig};
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Runtime flags controlling the decision pipeline
#[derive(Debug, Clone)]
pub struct HookConfig {
    /// Publish a `current_request` event per matched JSON exchange
    pub monitor_enabled: bool,

    /// Substitute cached bodies on temporary server errors
    pub disaster_recovery: bool,

    /// Consult the mock rule list at all
    pub mock_enabled: bool,

    /// Match mocks on origin + pure path instead of fingerprint
    pub path_match: bool,

    /// Substitute the response body from a matched rule
    pub mock_response: bool,

    /// Substitute the outgoing request params from a matched rule
    pub mock_request_body: bool,

    pub mock_rules: Vec<MockRule>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            monitor_enabled: true,
            disaster_recovery: false,
            mock_enabled: true,
            path_match: false,
            mock_response: true,
            mock_request_body: false,
            mock_rules: Vec::new(),
        }
    }
}

/// Late-arriving configuration slot
pub struct ConfigHandle {
    slot: Mutex<Option<HookConfig>>,
}

impl ConfigHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
        })
    }

    /// Deliver the configuration; bootstrap picks it up on its next poll
    pub fn provide(&self, config: HookConfig) {
        *self.slot.lock() = Some(config);
    }

    pub fn get(&self) -> Option<HookConfig> {
        self.slot.lock().clone()
    }

    /// Bounded fixed-interval wait for the configuration to arrive
    async fn wait(&self, settings: &BootstrapSettings) -> Option<HookConfig> {
        for _ in 0..settings.config_poll_attempts {
            if let Some(config) = self.get() {
                return Some(config);
            }
            tokio::time::sleep(Duration::from_millis(settings.config_poll_interval_ms)).await;
        }
        self.get()
    }
}

/// Per-context wiring of engine, cache, mocks and observer
pub struct ContextBootstrap {
    engine: Arc<HookEngine>,
    cache: Arc<CacheManager>,
    mocks: Arc<MockRegistry>,
    observer: Arc<ObservationQueue>,
    config: Arc<ConfigHandle>,
    settings: BootstrapSettings,
}

impl ContextBootstrap {
    pub fn new(
        engine: Arc<HookEngine>,
        cache: Arc<CacheManager>,
        config: Arc<ConfigHandle>,
        engine_config: &EngineConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            mocks: Arc::new(MockRegistry::new()),
            observer: Arc::new(ObservationQueue::new(
                engine_config.interception.observation_queue_size,
            )),
            config,
            settings: engine_config.bootstrap.clone(),
        }
    }

    /// Queue the external observer drains
    pub fn observer(&self) -> Arc<ObservationQueue> {
        Arc::clone(&self.observer)
    }

    pub fn mocks(&self) -> Arc<MockRegistry> {
        Arc::clone(&self.mocks)
    }

    /// Wait for configuration, then register the decision pipeline
    pub async fn start(&self) -> Result<Arc<HookSet>> {
        let config = self.config.wait(&self.settings).await.ok_or_else(|| {
            EngineError::ConfigError("Hook configuration never arrived".to_string())
        })?;

        self.mocks.replace(config.mock_rules.clone());
        let flags = Arc::new(config);

        info!(
            "Context bootstrap for {}: monitor={} recovery={} mock={} ({} rules)",
            self.cache.origin(),
            flags.monitor_enabled,
            flags.disaster_recovery,
            flags.mock_enabled,
            self.mocks.len()
        );

        let set = self.engine.hook_set();
        let cache = Arc::clone(&self.cache);
        let mocks = Arc::clone(&self.mocks);
        let observer = Arc::clone(&self.observer);
        let origin = self.cache.origin().to_string();

        set.register(move |request| {
            let absolute_url = if request.url.starts_with("http") {
                request.url.clone()
            } else {
                format!("{}{}", origin, request.url)
            };
            let mut params = request.json_body();
            let cache_key = canonical_key(&absolute_url, params.as_ref(), &request.method);

            let mock_rule = if flags.mock_enabled {
                mocks.find_match(&absolute_url, &request.method, &cache_key, flags.path_match)
            } else {
                None
            };

            if let Some(rule) = &mock_rule {
                if flags.mock_request_body {
                    if let Some(rule_params) = &rule.params {
                        debug!("Substituting request params from mock for {}", absolute_url);
                        request.body = Some(Bytes::from(rule_params.to_string()));
                        // Observation events report what was actually sent
                        params = Some(rule_params.clone());
                    }
                }
            }

            let exchange = ExchangeContext {
                cache: Arc::clone(&cache),
                observer: Arc::clone(&observer),
                flags: Arc::clone(&flags),
                mock_rule,
                method: request.method.clone(),
                headers: request.headers.clone(),
                params,
                cache_key,
            };
            request.set_response_handler(move |response| exchange.handle(response));
            Ok(())
        });

        Ok(set)
    }
}

/// Everything one response-phase decision needs, captured at request time
struct ExchangeContext {
    cache: Arc<CacheManager>,
    observer: Arc<ObservationQueue>,
    flags: Arc<HookConfig>,
    mock_rule: Option<MockRule>,
    method: String,
    headers: HashMap<String, String>,
    params: Option<Value>,
    cache_key: String,
}

impl ExchangeContext {
    fn handle(&self, response: &mut InterceptedResponse) -> Result<()> {
        if !is_json_exchange(response) {
            return Ok(());
        }
        if response.json().is_err() {
            debug!("Body is not valid JSON, passing through untouched");
            return Ok(());
        }

        let status = classify(response.status, self.cache.has(&self.cache_key));
        let final_url = response.final_url.clone();

        let mock = if self.flags.mock_enabled && self.flags.mock_response {
            self.mock_rule
                .as_ref()
                .map(|rule| (rule.response.clone(), rule.delay_ms))
        } else {
            None
        };
        let is_mock = mock.is_some();
        let recovering = self.flags.disaster_recovery && status == ProcessStatus::Recovery;

        if is_mock || recovering {
            response.set_status(200, "OK");
        }

        modify_json(response, |json| {
            let mut out = json;

            if let Some((payload, _)) = &mock {
                out = payload.clone();
            }

            if self.flags.monitor_enabled {
                self.observer.publish(ExchangeEvent {
                    event_type: ExchangeEventType::CurrentRequest,
                    url: final_url.clone(),
                    method: self.method.clone(),
                    params: self.params.clone(),
                    response: out.clone(),
                    cache_key: self.cache_key.clone(),
                    headers: self.headers.clone(),
                    time: ExchangeEvent::now_millis(),
                    is_mock,
                });
            }

            // A mock short-circuits the cache entirely: no write, no recovery
            if is_mock {
                return out;
            }

            if self.flags.disaster_recovery {
                match status {
                    ProcessStatus::Recovery => {
                        if let Some(entry) = self.cache.get(&self.cache_key) {
                            out = entry.cache_response;
                        }
                        self.observer.publish(ExchangeEvent {
                            event_type: ExchangeEventType::CacheHit,
                            url: final_url.clone(),
                            method: self.method.clone(),
                            params: self.params.clone(),
                            response: out.clone(),
                            cache_key: self.cache_key.clone(),
                            headers: self.headers.clone(),
                            time: ExchangeEvent::now_millis(),
                            is_mock: false,
                        });
                    }
                    ProcessStatus::Cache => {
                        self.cache.set(
                            self.cache_key.clone(),
                            CacheEntry::new(out.clone(), self.params.clone()),
                        );
                    }
                    ProcessStatus::ErrorNoCache => {}
                }
            }

            out
        });

        if let Some((payload, delay_ms)) = mock {
            if delay_ms > 0 {
                response.defer_json(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(payload)
                });
            }
        }

        Ok(())
    }
}

/// JSON exchange filter: content type and body shape must both look like JSON
fn is_json_exchange(response: &InterceptedResponse) -> bool {
    let Some(content_type) = response.headers.get("content-type") else {
        return false;
    };
    if !content_type.to_ascii_lowercase().contains("json") {
        return false;
    }

    let text = response.text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::interception::promise_call::{dispatch, RequestInit};
    use crate::interception::transport::testing::ScriptedTransport;
    use crate::interception::transport::{Transport, TransportResponse};
    use crate::utils::config::CacheSettings;
    use serde_json::json;

    struct Harness {
        engine: Arc<HookEngine>,
        transport: Arc<ScriptedTransport>,
        cache: Arc<CacheManager>,
        bootstrap: ContextBootstrap,
        config: Arc<ConfigHandle>,
    }

    fn harness(responses: Vec<TransportResponse>) -> Harness {
        let transport = Arc::new(ScriptedTransport::new(responses));
        let engine = HookEngine::new(Arc::clone(&transport) as Arc<dyn Transport>);
        let cache = CacheManager::new(
            "https://origin.test",
            Arc::new(MemoryStore::default()) as _,
            CacheSettings::default(),
        );
        let config = ConfigHandle::new();
        let bootstrap = ContextBootstrap::new(
            Arc::clone(&engine),
            Arc::clone(&cache),
            Arc::clone(&config),
            &EngineConfig::default(),
        );
        Harness {
            engine,
            transport,
            cache,
            bootstrap,
            config,
        }
    }

    async fn start_with(harness: &Harness, config: HookConfig) {
        harness.config.provide(config);
        harness.bootstrap.start().await.unwrap();
    }

    fn recovery_config() -> HookConfig {
        HookConfig {
            disaster_recovery: true,
            ..HookConfig::default()
        }
    }

    #[tokio::test]
    async fn test_error_without_cache_passes_through() {
        let h = harness(vec![ScriptedTransport::json_response(
            503,
            r#"{"error":"down"}"#,
        )]);
        start_with(&h, recovery_config()).await;

        let response = dispatch(&h.engine, "/api/list?t=100", RequestInit::default())
            .await
            .unwrap();

        // The caller observes the real 503 and its body
        assert_eq!(response.status, 503);
        assert_eq!(response.json().unwrap(), json!({"error": "down"}));
        assert!(h.cache.is_empty());

        let events = h.bootstrap.observer().drain_all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ExchangeEventType::CurrentRequest);
        assert!(!events[0].is_mock);
    }

    #[tokio::test]
    async fn test_recovery_substitutes_cached_body() {
        let h = harness(vec![
            ScriptedTransport::json_response(200, r#"{"items":[1,2,3]}"#),
            ScriptedTransport::json_response(503, r#"{"error":"down"}"#),
        ]);
        start_with(&h, recovery_config()).await;

        // First exchange succeeds and is cached
        let first = dispatch(&h.engine, "/api/list?t=100", RequestInit::default())
            .await
            .unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(h.cache.len(), 1);

        // Identical request modulo the volatile param hits the same key
        let second = dispatch(&h.engine, "/api/list?t=999", RequestInit::default())
            .await
            .unwrap();
        assert_eq!(second.status, 200);
        assert_eq!(second.status_text, "OK");
        assert_eq!(second.json().unwrap(), json!({"items": [1, 2, 3]}));

        let events = h.bootstrap.observer().drain_all();
        let cache_hits: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == ExchangeEventType::CacheHit)
            .collect();
        assert_eq!(cache_hits.len(), 1);
        assert_eq!(cache_hits[0].response, json!({"items": [1, 2, 3]}));
    }

    #[tokio::test]
    async fn test_healthy_response_refreshes_cache() {
        let h = harness(vec![
            ScriptedTransport::json_response(200, r#"{"v":1}"#),
            ScriptedTransport::json_response(200, r#"{"v":2}"#),
        ]);
        start_with(&h, recovery_config()).await;

        dispatch(&h.engine, "/api/thing", RequestInit::default())
            .await
            .unwrap();
        dispatch(&h.engine, "/api/thing", RequestInit::default())
            .await
            .unwrap();

        assert_eq!(h.cache.len(), 1);
        let key = canonical_key("https://origin.test/api/thing", None, "GET");
        assert_eq!(
            h.cache.get(&key).unwrap().cache_response,
            json!({"v": 2})
        );
    }

    #[tokio::test]
    async fn test_mock_overrides_response_without_cache_write() {
        let h = harness(vec![ScriptedTransport::json_response(
            503,
            r#"{"error":"down"}"#,
        )]);

        let key = canonical_key("https://origin.test/api/list", None, "GET");
        let mut config = recovery_config();
        config.mock_rules = vec![MockRule::for_cache_key(
            key.clone(),
            "GET",
            json!({"mocked": true}),
        )];
        start_with(&h, config).await;

        let response = dispatch(&h.engine, "/api/list", RequestInit::default())
            .await
            .unwrap();

        // Regardless of the classify() outcome the mock wins
        assert_eq!(response.status, 200);
        assert_eq!(response.json().unwrap(), json!({"mocked": true}));
        assert!(h.cache.is_empty());

        let events = h.bootstrap.observer().drain_all();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_mock);
        assert_eq!(events[0].response, json!({"mocked": true}));
        assert_eq!(events[0].cache_key, key);
    }

    #[tokio::test]
    async fn test_mock_delay_still_delivers_payload() {
        let h = harness(vec![ScriptedTransport::json_response(200, r#"{"real":1}"#)]);

        let key = canonical_key("https://origin.test/api/list", None, "GET");
        let mut rule = MockRule::for_cache_key(key, "GET", json!({"mocked": true}));
        rule.delay_ms = 20;
        let config = HookConfig {
            mock_rules: vec![rule],
            ..HookConfig::default()
        };
        start_with(&h, config).await;

        let response = dispatch(&h.engine, "/api/list", RequestInit::default())
            .await
            .unwrap();
        assert_eq!(response.json().unwrap(), json!({"mocked": true}));
    }

    #[tokio::test]
    async fn test_path_match_mode_ignores_query() {
        let h = harness(vec![ScriptedTransport::json_response(200, r#"{"real":1}"#)]);

        let config = HookConfig {
            path_match: true,
            mock_rules: vec![MockRule::for_path(
                "https://origin.test",
                "/api/list",
                "GET",
                json!({"mocked": true}),
            )],
            ..HookConfig::default()
        };
        start_with(&h, config).await;

        let response = dispatch(&h.engine, "/api/list?page=3&sort=asc", RequestInit::default())
            .await
            .unwrap();
        assert_eq!(response.json().unwrap(), json!({"mocked": true}));
    }

    #[tokio::test]
    async fn test_mock_request_body_substitution() {
        let h = harness(vec![ScriptedTransport::json_response(200, r#"{"ok":1}"#)]);

        let key = canonical_key(
            "https://origin.test/api/search",
            Some(&json!({"q": "original"})),
            "POST",
        );
        let mut rule = MockRule::for_cache_key(key, "POST", json!({"ok": 1}));
        rule.params = Some(json!({"q": "substituted"}));
        let config = HookConfig {
            mock_request_body: true,
            mock_response: false,
            mock_rules: vec![rule],
            ..HookConfig::default()
        };
        start_with(&h, config).await;

        let init = RequestInit {
            body: Some(Bytes::from(r#"{"q":"original"}"#)),
            method: Some("POST".to_string()),
            ..RequestInit::default()
        };
        dispatch(&h.engine, "/api/search", init).await.unwrap();

        let forwarded = h.transport.seen.lock();
        assert_eq!(
            forwarded[0].body.as_ref().unwrap(),
            &Bytes::from(r#"{"q":"substituted"}"#)
        );
    }

    #[tokio::test]
    async fn test_non_json_exchange_untouched() {
        let mut html = ScriptedTransport::json_response(503, "<html>down</html>");
        html.headers = crate::interception::transport::normalize_headers([(
            "content-type",
            "text/html",
        )]);
        let h = harness(vec![html]);
        start_with(&h, recovery_config()).await;

        let response = dispatch(&h.engine, "/page", RequestInit::default())
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.text(), "<html>down</html>");
        assert!(h.bootstrap.observer().is_empty());
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_json_content_type_with_broken_body_untouched() {
        // Looks like a JSON object but does not parse
        let h = harness(vec![ScriptedTransport::json_response(200, r#"{"a":}"#)]);
        start_with(&h, recovery_config()).await;

        let response = dispatch(&h.engine, "/api/list", RequestInit::default())
            .await
            .unwrap();

        assert_eq!(response.text(), r#"{"a":}"#);
        assert!(h.cache.is_empty());
        assert!(h.bootstrap.observer().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_waits_for_late_config() {
        let h = harness(vec![ScriptedTransport::json_response(200, "{}")]);

        let config = Arc::clone(&h.config);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            config.provide(HookConfig::default());
        });

        h.bootstrap.start().await.unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_fails_without_config() {
        let h = harness(Vec::new());
        let mut engine_config = EngineConfig::default();
        engine_config.bootstrap.config_poll_attempts = 3;
        let bootstrap = ContextBootstrap::new(
            Arc::clone(&h.engine),
            Arc::clone(&h.cache),
            ConfigHandle::new(),
            &engine_config,
        );

        let result = bootstrap.start().await;
        assert!(matches!(result, Err(EngineError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_event_driven_shape_end_to_end() {
        use crate::interception::event_call::EventDrivenCall;

        let h = harness(vec![
            ScriptedTransport::json_response(200, r#"{"items":[1]}"#),
            ScriptedTransport::json_response(503, r#"{"error":"down"}"#),
        ]);
        start_with(&h, recovery_config()).await;

        let mut call = EventDrivenCall::new(Arc::clone(&h.engine));
        call.open("GET", "https://origin.test/api/list");
        call.send(None).await.unwrap();
        assert_eq!(call.status(), 200);

        let mut call = EventDrivenCall::new(Arc::clone(&h.engine));
        call.open("GET", "https://origin.test/api/list");
        call.send(None).await.unwrap();

        // Recovery: forced 200 with the previously cached body
        assert_eq!(call.status(), 200);
        assert_eq!(call.response_json().unwrap(), json!({"items": [1]}));
    }

    #[test]
    fn test_is_json_exchange_filter() {
        let json_resp =
            InterceptedResponse::from_transport(ScriptedTransport::json_response(200, r#"{"a":1}"#));
        assert!(is_json_exchange(&json_resp));

        let array_resp =
            InterceptedResponse::from_transport(ScriptedTransport::json_response(200, "[1,2]"));
        assert!(is_json_exchange(&array_resp));

        let mut html = ScriptedTransport::json_response(200, "<html>");
        html.headers =
            crate::interception::transport::normalize_headers([("content-type", "text/html")]);
        assert!(!is_json_exchange(&InterceptedResponse::from_transport(html)));

        // JSON content type but non-JSON body shape
        let shaped = ScriptedTransport::json_response(200, "plain words");
        assert!(!is_json_exchange(&InterceptedResponse::from_transport(
            shaped
        )));
    }
}
