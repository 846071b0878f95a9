// src/interception/request.rs
//! Intercepted request descriptor
//!
//! Created at call interception, mutated by hooks, consumed once by the real
//! transport or a synthesized short-circuit. Hooks mutate the plain fields
//! directly; a hook that needs async work installs a deferred value for the
//! field instead. Before the forwarding decision the engine awaits every
//! deferred value (asynchronous calls) or discards them so the fields keep
//! their pre-hook snapshot (synchronous calls cannot await).

use crate::interception::response::InterceptedResponse;
use crate::utils::errors::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// The two call shapes offered by the hosting environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// Stateful, event-driven request object
    EventDriven,

    /// Promise-returning request function
    PromiseCall,
}

/// Response-phase mutation hook installed by a request-phase hook
pub type ResponseHandler = Arc<dyn Fn(&mut InterceptedResponse) -> Result<()> + Send + Sync>;

type Deferred<T> = BoxFuture<'static, Result<T>>;

#[derive(Default)]
struct DeferredFields {
    url: Option<Deferred<String>>,
    method: Option<Deferred<String>>,
    abort: Option<Deferred<bool>>,
    headers: Option<Deferred<HashMap<String, String>>>,
    body: Option<Deferred<Option<Bytes>>>,
}

impl DeferredFields {
    fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.method.is_none()
            && self.abort.is_none()
            && self.headers.is_none()
            && self.body.is_none()
    }
}

/// One outbound call passing through the pipeline
pub struct InterceptedRequest {
    shape: CallShape,
    async_mode: bool,

    pub url: String,
    pub method: String,
    /// Lower-cased header names, duplicate values comma-joined
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// One-shot short-circuit flag, checked once after the request phase
    pub abort: bool,

    response_handler: Option<ResponseHandler>,
    deferred: DeferredFields,
}

impl InterceptedRequest {
    pub fn new(
        shape: CallShape,
        url: impl Into<String>,
        method: impl Into<String>,
        async_mode: bool,
    ) -> Self {
        Self {
            shape,
            async_mode,
            url: url.into(),
            method: method.into().to_ascii_uppercase(),
            headers: HashMap::new(),
            body: None,
            abort: false,
            response_handler: None,
            deferred: DeferredFields::default(),
        }
    }

    pub fn shape(&self) -> CallShape {
        self.shape
    }

    pub fn async_mode(&self) -> bool {
        self.async_mode
    }

    /// Accumulate a header, comma-joining repeated names
    pub fn set_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.headers.get_mut(&name) {
            Some(existing) => {
                let merged = format!("{}, {}", existing, value);
                *existing = merged;
            }
            None => {
                self.headers.insert(name, value.to_string());
            }
        }
    }

    /// Parse the body as JSON, if there is one and it parses
    pub fn json_body(&self) -> Option<Value> {
        let body = self.body.as_ref()?;
        serde_json::from_slice(body).ok()
    }

    /// Install the response-phase mutation handler
    pub fn set_response_handler(
        &mut self,
        handler: impl Fn(&mut InterceptedResponse) -> Result<()> + Send + Sync + 'static,
    ) {
        self.response_handler = Some(Arc::new(handler));
    }

    pub fn response_handler(&self) -> Option<ResponseHandler> {
        self.response_handler.clone()
    }

    pub fn defer_url(&mut self, fut: impl Future<Output = Result<String>> + Send + 'static) {
        self.deferred.url = Some(Box::pin(fut));
    }

    pub fn defer_method(&mut self, fut: impl Future<Output = Result<String>> + Send + 'static) {
        self.deferred.method = Some(Box::pin(fut));
    }

    pub fn defer_abort(&mut self, fut: impl Future<Output = Result<bool>> + Send + 'static) {
        self.deferred.abort = Some(Box::pin(fut));
    }

    pub fn defer_headers(
        &mut self,
        fut: impl Future<Output = Result<HashMap<String, String>>> + Send + 'static,
    ) {
        self.deferred.headers = Some(Box::pin(fut));
    }

    pub fn defer_body(
        &mut self,
        fut: impl Future<Output = Result<Option<Bytes>>> + Send + 'static,
    ) {
        self.deferred.body = Some(Box::pin(fut));
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Await every deferred field; a failed future keeps the snapshot value
    pub(crate) async fn resolve_deferred(&mut self) {
        if let Some(fut) = self.deferred.url.take() {
            match fut.await {
                Ok(url) => self.url = url,
                Err(e) => warn!("Deferred url failed, keeping snapshot: {}", e),
            }
        }
        if let Some(fut) = self.deferred.method.take() {
            match fut.await {
                Ok(method) => self.method = method.to_ascii_uppercase(),
                Err(e) => warn!("Deferred method failed, keeping snapshot: {}", e),
            }
        }
        if let Some(fut) = self.deferred.abort.take() {
            match fut.await {
                Ok(abort) => self.abort = abort,
                Err(e) => warn!("Deferred abort failed, keeping snapshot: {}", e),
            }
        }
        if let Some(fut) = self.deferred.headers.take() {
            match fut.await {
                Ok(headers) => self.headers = headers,
                Err(e) => warn!("Deferred headers failed, keeping snapshot: {}", e),
            }
        }
        if let Some(fut) = self.deferred.body.take() {
            match fut.await {
                Ok(body) => self.body = body,
                Err(e) => warn!("Deferred body failed, keeping snapshot: {}", e),
            }
        }
    }

    /// Synchronous fast-path: drop deferred values, fields keep the snapshot
    pub(crate) fn discard_deferred(&mut self) {
        self.deferred = DeferredFields::default();
    }
}

impl fmt::Debug for InterceptedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedRequest")
            .field("shape", &self.shape)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("abort", &self.abort)
            .field("async_mode", &self.async_mode)
            .field("has_handler", &self.response_handler.is_some())
            .field("has_deferred", &(!self.deferred.is_empty()))
            .finish()
    }
}
