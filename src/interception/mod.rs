// src/interception/mod.rs
//! Request interception layer
//!
//! This module makes every outbound call pass through a replaceable decision
//! pipeline, indistinguishably from the native primitives for callers that
//! never touch a hook:
//!
//! - **Hook Engine**: idempotent installation, ordered cooperating hook sets,
//!   filters, per-hook isolation, JSON body mutation
//! - **Event Call**: the stateful, event-driven call shape
//! - **Promise Call**: the promise-returning call shape
//! - **Request / Response**: pipeline descriptors with deferred (future-like)
//!   field values and a lazily materialized response body
//! - **Transport**: the saved real primitive behind the forwarding façade
//!
//! # Architecture
//!
//! ```text
//! Caller (unmodified)
//!     │
//!     ├─ EventDrivenCall ──┐
//!     │                    ├─ request hooks → forward / short-circuit
//!     └─ dispatch() ───────┘         │
//!                                    └─ response handler → caller observes
//! ```

pub mod event_call;
pub mod hook_engine;
pub mod promise_call;
pub mod request;
pub mod response;
pub mod transport;

// Re-export commonly used types
pub use event_call::{CallEvent, EventDrivenCall, ReadyState};
pub use hook_engine::{modify_json, HookEngine, HookFilter, HookSet, UrlPattern, HOOK_LAYER_VERSION};
pub use promise_call::{dispatch, RequestInit, RequestInput};
pub use request::{CallShape, InterceptedRequest, ResponseHandler};
pub use response::InterceptedResponse;
pub use transport::{normalize_headers, HttpTransport, Transport, TransportRequest, TransportResponse};
