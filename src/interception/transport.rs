// src/interception/transport.rs
//! The real network primitive behind the interception façade
//!
//! Both call shapes funnel into [`Transport`]. The engine saves the real
//! transport once at install time and forwards through it after the request
//! phase of the pipeline; callers that never touch a hook cannot observe the
//! difference.

use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::collections::HashMap;
use tracing::debug;

/// Plain request descriptor handed to the transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

/// Raw response produced by the transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub final_url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

/// Outbound network primitive
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Normalize header pairs: lower-cased names, duplicates comma-joined
pub fn normalize_headers<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for (name, value) in pairs {
        let name = name.to_ascii_lowercase();
        match headers.get_mut(&name) {
            Some(existing) => {
                let merged = format!("{}, {}", existing, value);
                *existing = merged;
            }
            None => {
                headers.insert(name, value.to_string());
            }
        }
    }
    headers
}

/// HTTP/1 transport over the hyper client stack
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        debug!("Forwarding {} {}", request.method, request.url);

        let mut builder = hyper::Request::builder()
            .method(request.method.as_str())
            .uri(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = request.body.clone().unwrap_or_default();
        let outbound = builder.body(Full::new(body)).map_err(|e| {
            EngineError::TransportFailed(format!("Request build error: {}", e))
        })?;

        let response = self.client.request(outbound).await.map_err(|e| {
            EngineError::TransportFailed(format!("Request failed: {}", e))
        })?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| EngineError::TransportFailed(format!("Response body error: {}", e)))?
            .to_bytes();

        let headers = normalize_headers(parts.headers.iter().filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str(), v))
        }));

        Ok(TransportResponse {
            final_url: request.url,
            status: parts.status.as_u16(),
            status_text: parts
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Transport double replaying scripted responses in order
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<TransportResponse>>,
        pub seen: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<TransportResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn json_response(status: u16, body: &str) -> TransportResponse {
            TransportResponse {
                final_url: String::new(),
                status,
                status_text: match status {
                    200 => "OK".to_string(),
                    503 => "Service Unavailable".to_string(),
                    _ => String::new(),
                },
                headers: normalize_headers([("content-type", "application/json")]),
                body: Bytes::from(body.to_string()),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.seen.lock().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
            let url = request.url.clone();
            self.seen.lock().push(request);
            let mut response = self
                .responses
                .lock()
                .pop_front()
                .ok_or_else(|| EngineError::TransportFailed("No scripted response".into()))?;
            if response.final_url.is_empty() {
                response.final_url = url;
            }
            Ok(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_headers_lowercases() {
        let headers = normalize_headers([("Content-Type", "application/json")]);
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn test_normalize_headers_joins_duplicates() {
        let headers = normalize_headers([("Accept", "text/html"), ("accept", "application/json")]);
        assert_eq!(headers.get("accept").unwrap(), "text/html, application/json");
    }

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = testing::ScriptedTransport::new(vec![
            testing::ScriptedTransport::json_response(200, "{}"),
            testing::ScriptedTransport::json_response(503, "{}"),
        ]);

        let request = TransportRequest {
            url: "https://a/b".to_string(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        };

        let first = transport.execute(request.clone()).await.unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(first.final_url, "https://a/b");

        let second = transport.execute(request).await.unwrap();
        assert_eq!(second.status, 503);
        assert_eq!(transport.request_count(), 2);
    }
}
