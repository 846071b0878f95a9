// src/interception/event_call.rs
//! Stateful, event-driven call shape
//!
//! Mirrors the configure/send/header-set lifecycle of the host's stateful
//! request object: `open` captures method and URL, header-set calls
//! accumulate, `send` snapshots the body and runs the pipeline. Completion
//! fires ReadyStateChange, Load and LoadEnd listeners in that order, whether
//! the response came off the wire or was synthesized by an abort
//! short-circuit.
//!
//! The rare synchronous mode (`open_with_mode(..., false)`) does not change
//! the control flow here; it switches deferred hook values to the
//! resolve-to-snapshot fast-path, since a synchronous caller cannot await.

use crate::interception::hook_engine::HookEngine;
use crate::interception::request::{CallShape, InterceptedRequest};
use crate::interception::response::InterceptedResponse;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Lifecycle states of an event-driven call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

/// Completion signals consumers can listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    ReadyStateChange,
    Load,
    LoadEnd,
}

type EventListener = Box<dyn Fn(&EventDrivenCall) + Send + Sync>;

/// Stateful request object routed through the hook pipeline
pub struct EventDrivenCall {
    engine: Arc<HookEngine>,
    request: Option<InterceptedRequest>,
    listeners: Vec<(CallEvent, EventListener)>,
    ready_state: ReadyState,
    response: Option<InterceptedResponse>,
}

impl EventDrivenCall {
    pub fn new(engine: Arc<HookEngine>) -> Self {
        Self {
            engine,
            request: None,
            listeners: Vec::new(),
            ready_state: ReadyState::Unsent,
            response: None,
        }
    }

    /// Configure the call; resets any previous exchange state
    pub fn open(&mut self, method: &str, url: &str) {
        self.open_with_mode(method, url, true);
    }

    /// Configure with an explicit sync/async mode
    pub fn open_with_mode(&mut self, method: &str, url: &str, async_mode: bool) {
        self.request = Some(InterceptedRequest::new(
            CallShape::EventDriven,
            url,
            method,
            async_mode,
        ));
        self.response = None;
        self.ready_state = ReadyState::Opened;
    }

    /// Accumulate a request header
    pub fn set_request_header(&mut self, name: &str, value: &str) {
        if let Some(request) = &mut self.request {
            request.set_header(name, value);
        }
    }

    /// Register a completion listener
    pub fn add_event_listener(
        &mut self,
        event: CallEvent,
        listener: impl Fn(&EventDrivenCall) + Send + Sync + 'static,
    ) {
        self.listeners.push((event, Box::new(listener)));
    }

    /// Snapshot the body and run the exchange through the pipeline
    pub async fn send(&mut self, body: Option<Bytes>) -> Result<()> {
        let mut request = self.request.take().ok_or_else(|| {
            EngineError::InterceptionFailed("send called before open".to_string())
        })?;
        request.body = body;

        self.engine.run_request_phase(&mut request).await;

        if request.abort {
            if request.response_handler().is_some() {
                // Short-circuit: fabricate a success response, let the
                // handler populate it, synthesize the completion signals
                let mut response = InterceptedResponse::synthesized(request.url.clone());
                self.engine.run_response_phase(&request, &mut response).await;
                self.complete(request, response);
            } else {
                debug!("Aborted without handler, dropping call to {}", request.url);
                self.request = Some(request);
            }
            return Ok(());
        }

        match self.engine.forward(&request).await {
            Ok(raw) => {
                let mut response = InterceptedResponse::from_transport(raw);
                self.engine.run_response_phase(&request, &mut response).await;
                self.complete(request, response);
                Ok(())
            }
            Err(e) => {
                self.request = Some(request);
                self.ready_state = ReadyState::Done;
                self.dispatch(CallEvent::ReadyStateChange);
                self.dispatch(CallEvent::LoadEnd);
                Err(e)
            }
        }
    }

    fn complete(&mut self, request: InterceptedRequest, response: InterceptedResponse) {
        self.request = Some(request);
        self.response = Some(response);
        self.ready_state = ReadyState::Done;
        self.dispatch(CallEvent::ReadyStateChange);
        self.dispatch(CallEvent::Load);
        self.dispatch(CallEvent::LoadEnd);
    }

    fn dispatch(&self, event: CallEvent) {
        for (kind, listener) in &self.listeners {
            if *kind == event {
                listener(self);
            }
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Response status, 0 until the exchange completes
    pub fn status(&self) -> u16 {
        self.response.as_ref().map(|r| r.status).unwrap_or(0)
    }

    pub fn status_text(&self) -> String {
        self.response
            .as_ref()
            .map(|r| r.status_text.clone())
            .unwrap_or_default()
    }

    pub fn final_url(&self) -> Option<&str> {
        self.response.as_ref().map(|r| r.final_url.as_str())
    }

    /// Body text, materialized on first read
    pub fn response_text(&self) -> Option<String> {
        self.response.as_ref().map(|r| r.text())
    }

    /// Body JSON, materialized on first read
    pub fn response_json(&self) -> Result<serde_json::Value> {
        self.response
            .as_ref()
            .ok_or_else(|| EngineError::InterceptionFailed("no response yet".to_string()))?
            .json()
    }

    /// The full intercepted response once the exchange completed
    pub fn response(&self) -> Option<&InterceptedResponse> {
        self.response.as_ref()
    }
}
