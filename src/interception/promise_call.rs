// src/interception/promise_call.rs
//! Promise-returning call shape
//!
//! The functional counterpart to [`EventDrivenCall`]: one call, one future,
//! one response. Structured request inputs are normalized into a plain
//! descriptor before any hook runs, so hooks see the same request shape
//! regardless of how the caller constructed it.

use crate::interception::hook_engine::HookEngine;
use crate::interception::request::{CallShape, InterceptedRequest};
use crate::interception::response::InterceptedResponse;
use crate::interception::transport::normalize_headers;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Call options; explicit values override request-object values
#[derive(Debug, Default, Clone)]
pub struct RequestInit {
    pub method: Option<String>,
    pub headers: Option<Vec<(String, String)>>,
    pub body: Option<Bytes>,
}

/// Accepted request inputs
pub enum RequestInput {
    /// Bare URL
    Url(String),

    /// Structured request object
    Request(hyper::Request<Bytes>),
}

impl From<&str> for RequestInput {
    fn from(url: &str) -> Self {
        RequestInput::Url(url.to_string())
    }
}

impl From<String> for RequestInput {
    fn from(url: String) -> Self {
        RequestInput::Url(url)
    }
}

impl From<hyper::Request<Bytes>> for RequestInput {
    fn from(request: hyper::Request<Bytes>) -> Self {
        RequestInput::Request(request)
    }
}

/// Dispatch one call through the hook pipeline
///
/// Equivalent to the native promise-returning primitive for callers that
/// never touch a hook. Aborting without a response handler fails with
/// [`EngineError::Aborted`]; with a handler a fabricated success response is
/// populated and returned without any network trip.
pub async fn dispatch(
    engine: &Arc<HookEngine>,
    input: impl Into<RequestInput>,
    init: RequestInit,
) -> Result<InterceptedResponse> {
    let (url, method, headers, body) = normalize_input(input.into(), init);

    let mut request = InterceptedRequest::new(CallShape::PromiseCall, url, method, true);
    request.headers = headers;
    request.body = body;

    engine.run_request_phase(&mut request).await;

    if request.abort {
        if request.response_handler().is_some() {
            debug!("Aborting {} {} with synthesized response", request.method, request.url);
            let mut response = InterceptedResponse::synthesized(request.url.clone());
            engine.run_response_phase(&request, &mut response).await;
            return Ok(response);
        }
        return Err(EngineError::Aborted);
    }

    let raw = engine.forward(&request).await?;
    let mut response = InterceptedResponse::from_transport(raw);
    engine.run_response_phase(&request, &mut response).await;
    Ok(response)
}

/// Flatten any input into (url, METHOD, headers, body)
fn normalize_input(
    input: RequestInput,
    init: RequestInit,
) -> (String, String, HashMap<String, String>, Option<Bytes>) {
    match input {
        RequestInput::Url(url) => {
            let method = init.method.unwrap_or_else(|| "GET".to_string());
            let headers = init
                .headers
                .map(|pairs| {
                    normalize_headers(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                })
                .unwrap_or_default();
            (url, method, headers, init.body)
        }
        RequestInput::Request(request) => {
            let (parts, request_body) = request.into_parts();
            let url = parts.uri.to_string();
            let method = init
                .method
                .unwrap_or_else(|| parts.method.as_str().to_string());
            let headers = match init.headers {
                Some(pairs) => {
                    normalize_headers(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                }
                None => normalize_headers(parts.headers.iter().filter_map(|(name, value)| {
                    value.to_str().ok().map(|v| (name.as_str(), v))
                })),
            };
            let body = init.body.or_else(|| {
                if request_body.is_empty() {
                    None
                } else {
                    Some(request_body)
                }
            });
            (url, method, headers, body)
        }
    }
}
