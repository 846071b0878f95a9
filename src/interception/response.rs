// src/interception/response.rs
//! Intercepted response with lazily materialized body
//!
//! The body arrives as raw bytes. Text and JSON representations are computed
//! on first read only; an unread representation is never computed. Mutations
//! through [`InterceptedResponse::set_json`] / [`set_text`] write back across
//! every representation, so whatever a later consumer reads stays consistent.

use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tracing::warn;

use crate::interception::transport::TransportResponse;

type Deferred<T> = BoxFuture<'static, Result<T>>;

#[derive(Default)]
struct DeferredFields {
    status: Option<Deferred<u16>>,
    status_text: Option<Deferred<String>>,
    text: Option<Deferred<String>>,
    json: Option<Deferred<Value>>,
}

impl DeferredFields {
    fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.status_text.is_none()
            && self.text.is_none()
            && self.json.is_none()
    }
}

#[derive(Debug, Clone)]
struct BodyState {
    raw: Bytes,
    text: Option<String>,
    json: Option<Value>,
}

/// Lazy body cell shared between representations
struct BodyCell(Mutex<BodyState>);

impl BodyCell {
    fn new(raw: Bytes) -> Self {
        Self(Mutex::new(BodyState {
            raw,
            text: None,
            json: None,
        }))
    }

    fn snapshot(&self) -> BodyState {
        self.0.lock().clone()
    }

    fn restore(&self, state: BodyState) {
        *self.0.lock() = state;
    }
}

/// One completed exchange as observed by the page's caller
pub struct InterceptedResponse {
    pub final_url: String,
    pub status: u16,
    pub status_text: String,
    /// Lower-cased header names, duplicate values comma-joined
    pub headers: HashMap<String, String>,
    body: BodyCell,
    deferred: DeferredFields,
}

impl InterceptedResponse {
    /// Build from a completed transport exchange
    pub fn from_transport(response: TransportResponse) -> Self {
        Self {
            final_url: response.final_url,
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            body: BodyCell::new(response.body),
            deferred: DeferredFields::default(),
        }
    }

    /// Fabricated success response for the abort short-circuit
    pub fn synthesized(final_url: impl Into<String>) -> Self {
        Self {
            final_url: final_url.into(),
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body: BodyCell::new(Bytes::from_static(b"{}")),
            deferred: DeferredFields::default(),
        }
    }

    /// Current canonical body bytes
    pub fn body_bytes(&self) -> Bytes {
        self.body.0.lock().raw.clone()
    }

    /// Body as text, materialized on first read
    pub fn text(&self) -> String {
        let mut state = self.body.0.lock();
        if state.text.is_none() {
            state.text = Some(String::from_utf8_lossy(&state.raw).into_owned());
        }
        state.text.clone().unwrap_or_default()
    }

    /// Body as parsed JSON, materialized on first read
    pub fn json(&self) -> Result<Value> {
        let mut state = self.body.0.lock();
        if state.json.is_none() {
            let parsed: Value = serde_json::from_slice(&state.raw)
                .map_err(|e| EngineError::ParseFailed(format!("Invalid JSON body: {}", e)))?;
            state.json = Some(parsed);
        }
        state
            .json
            .clone()
            .ok_or_else(|| EngineError::ParseFailed("Empty JSON body".to_string()))
    }

    /// Replace the body as JSON; text and raw representations follow
    pub fn set_json(&mut self, value: Value) {
        let serialized = value.to_string();
        let mut state = self.body.0.lock();
        state.raw = Bytes::from(serialized.clone());
        state.text = Some(serialized);
        state.json = Some(value);
    }

    /// Replace the body as text; the JSON representation is re-parsed lazily
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        let mut state = self.body.0.lock();
        state.raw = Bytes::from(text.clone());
        state.text = Some(text);
        state.json = None;
    }

    /// Set status and reason phrase together
    pub fn set_status(&mut self, status: u16, status_text: impl Into<String>) {
        self.status = status;
        self.status_text = status_text.into();
    }

    pub fn defer_status(&mut self, fut: impl Future<Output = Result<u16>> + Send + 'static) {
        self.deferred.status = Some(Box::pin(fut));
    }

    pub fn defer_status_text(
        &mut self,
        fut: impl Future<Output = Result<String>> + Send + 'static,
    ) {
        self.deferred.status_text = Some(Box::pin(fut));
    }

    pub fn defer_text(&mut self, fut: impl Future<Output = Result<String>> + Send + 'static) {
        self.deferred.text = Some(Box::pin(fut));
    }

    pub fn defer_json(&mut self, fut: impl Future<Output = Result<Value>> + Send + 'static) {
        self.deferred.json = Some(Box::pin(fut));
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Await deferred fields; a failed future reverts that one field
    pub(crate) async fn resolve_deferred(&mut self) {
        if let Some(fut) = self.deferred.text.take() {
            match fut.await {
                Ok(text) => self.set_text(text),
                Err(e) => warn!("Deferred body text failed, keeping original: {}", e),
            }
        }
        if let Some(fut) = self.deferred.json.take() {
            match fut.await {
                Ok(json) => self.set_json(json),
                Err(e) => warn!("Deferred body json failed, keeping original: {}", e),
            }
        }
        if let Some(fut) = self.deferred.status.take() {
            match fut.await {
                Ok(status) => self.status = status,
                Err(e) => warn!("Deferred status failed, keeping original: {}", e),
            }
        }
        if let Some(fut) = self.deferred.status_text.take() {
            match fut.await {
                Ok(text) => self.status_text = text,
                Err(e) => warn!("Deferred status text failed, keeping original: {}", e),
            }
        }
    }

    /// Synchronous fast-path: drop deferred values
    pub(crate) fn discard_deferred(&mut self) {
        self.deferred = DeferredFields::default();
    }

    /// Snapshot for response-handler isolation
    pub(crate) fn isolation_snapshot(&self) -> ResponseSnapshot {
        ResponseSnapshot {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.snapshot(),
        }
    }

    /// Restore a snapshot after a failed handler; the original passes through
    pub(crate) fn restore_snapshot(&mut self, snapshot: ResponseSnapshot) {
        self.status = snapshot.status;
        self.status_text = snapshot.status_text;
        self.headers = snapshot.headers;
        self.body.restore(snapshot.body);
        self.deferred = DeferredFields::default();
    }
}

pub(crate) struct ResponseSnapshot {
    status: u16,
    status_text: String,
    headers: HashMap<String, String>,
    body: BodyState,
}

impl fmt::Debug for InterceptedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedResponse")
            .field("final_url", &self.final_url)
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("headers", &self.headers)
            .field("has_deferred", &(!self.deferred.is_empty()))
            .finish()
    }
}
