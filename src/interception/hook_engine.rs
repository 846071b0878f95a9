// src/interception/hook_engine.rs
//! Hook pipeline and idempotent installation
//!
//! A forwarding façade holds the real transport and dispatches every call
//! through the registered interceptor chain. Installation is guarded by a
//! process-wide version marker so independent hook sets cooperate through
//! one shared ordered list instead of double-wrapping the primitives.
//!
//! # Ordering
//!
//! Hook sets run in installation order, hooks within a set in registration
//! order. For a single exchange all request-phase hooks complete before the
//! real (or synthesized) call is issued, and the response-phase handler
//! completes before the caller observes the response.
//!
//! # Isolation
//!
//! A failing or panicking hook is logged and skipped; it never blocks other
//! hooks or the real call. A failing response handler leaves the original
//! response untouched.

use crate::interception::request::{CallShape, InterceptedRequest};
use crate::interception::response::InterceptedResponse;
use crate::interception::transport::{Transport, TransportRequest, TransportResponse};
use crate::utils::errors::Result;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Version marker for the shared installation
pub const HOOK_LAYER_VERSION: &str = "1.0.0";

/// Request-phase hook
pub type HookFn = Arc<dyn Fn(&mut InterceptedRequest) -> Result<()> + Send + Sync>;

/// URL matcher used by filters
#[derive(Debug, Clone)]
pub enum UrlPattern {
    /// Substring containment
    Substring(String),

    /// Full regular expression
    Pattern(Regex),
}

impl UrlPattern {
    fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Substring(needle) => url.contains(needle.as_str()),
            UrlPattern::Pattern(regex) => regex.is_match(url),
        }
    }
}

/// Allow-list entry restricting which requests reach a hook set
///
/// Every present condition must hold; a request passes the set's filter list
/// when the list is empty or any entry matches.
#[derive(Debug, Clone, Default)]
pub struct HookFilter {
    pub shape: Option<CallShape>,
    pub url: Option<UrlPattern>,
    pub method: Option<String>,
    pub async_mode: Option<bool>,
}

impl HookFilter {
    fn matches(&self, request: &InterceptedRequest) -> bool {
        if let Some(shape) = self.shape {
            if shape != request.shape() {
                return false;
            }
        }
        if let Some(url) = &self.url {
            if !url.matches(&request.url) {
                return false;
            }
        }
        if let Some(method) = &self.method {
            if !method.eq_ignore_ascii_case(&request.method) {
                return false;
            }
        }
        if let Some(async_mode) = self.async_mode {
            if async_mode != request.async_mode() {
                return false;
            }
        }
        true
    }
}

/// One cooperating set of hooks with its own allow-list
pub struct HookSet {
    id: u64,
    hooks: Mutex<Vec<HookFn>>,
    filters: Mutex<Vec<HookFilter>>,
}

impl HookSet {
    fn new(id: u64) -> Self {
        Self {
            id,
            hooks: Mutex::new(Vec::new()),
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Append a hook; hooks run in registration order
    pub fn register(
        &self,
        hook: impl Fn(&mut InterceptedRequest) -> Result<()> + Send + Sync + 'static,
    ) {
        self.hooks.lock().push(Arc::new(hook));
    }

    /// Replace the allow-list restricting which requests reach this set
    pub fn register_filter(&self, filters: Vec<HookFilter>) {
        *self.filters.lock() = filters;
    }

    fn allows(&self, request: &InterceptedRequest) -> bool {
        let filters = self.filters.lock();
        filters.is_empty() || filters.iter().any(|filter| filter.matches(request))
    }

    fn hooks(&self) -> Vec<HookFn> {
        self.hooks.lock().clone()
    }
}

/// Forwarding façade around the real transport
pub struct HookEngine {
    version: &'static str,
    transport: Arc<dyn Transport>,
    hook_sets: Mutex<Vec<Arc<HookSet>>>,
    next_set_id: AtomicU64,
    protected: AtomicBool,
}

static GLOBAL_ENGINE: OnceCell<Arc<HookEngine>> = OnceCell::new();

impl HookEngine {
    /// Build a private engine; the real transport is saved here, once
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            version: HOOK_LAYER_VERSION,
            transport,
            hook_sets: Mutex::new(Vec::new()),
            next_set_id: AtomicU64::new(1),
            protected: AtomicBool::new(false),
        })
    }

    /// Idempotent process-global installation
    ///
    /// The first call saves the transport and installs the engine; repeated
    /// calls return the same engine so independent hook sets compose instead
    /// of re-wrapping the primitives.
    pub fn install(transport: Arc<dyn Transport>) -> Arc<Self> {
        let engine = GLOBAL_ENGINE
            .get_or_init(|| {
                info!("Installing hook layer v{}", HOOK_LAYER_VERSION);
                Self::new(transport)
            })
            .clone();

        if engine.version != HOOK_LAYER_VERSION {
            warn!(
                "Hook layer version mismatch ({} installed, {} requested): conflicts possible",
                engine.version, HOOK_LAYER_VERSION
            );
        }
        engine
    }

    /// Create and append a new cooperating hook set
    pub fn hook_set(&self) -> Arc<HookSet> {
        let set = Arc::new(HookSet::new(self.next_set_id.fetch_add(1, Ordering::Relaxed)));
        self.hook_sets.lock().push(Arc::clone(&set));
        set
    }

    /// Remove a hook set; refused once the installation is protected
    pub fn unhook(&self, set_id: u64) -> bool {
        if self.protected.load(Ordering::Relaxed) {
            warn!("Installation is protected, refusing to unhook set {}", set_id);
            return false;
        }
        let mut sets = self.hook_sets.lock();
        let before = sets.len();
        sets.retain(|set| set.id != set_id);
        before != sets.len()
    }

    /// Forbid further unhooking
    pub fn protect(&self) {
        self.protected.store(true, Ordering::Relaxed);
    }

    /// Number of live hook sets
    pub fn hook_set_count(&self) -> usize {
        self.hook_sets.lock().len()
    }

    /// Run the request phase: all matching hooks, then deferred resolution
    pub(crate) async fn run_request_phase(&self, request: &mut InterceptedRequest) {
        let sets: Vec<Arc<HookSet>> = self.hook_sets.lock().clone();
        for set in sets {
            if !set.allows(request) {
                continue;
            }
            for hook in set.hooks() {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    hook(request)
                }));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Hook execution error: {}", e),
                    Err(_) => error!("Hook panicked, continuing"),
                }
            }
        }

        if request.async_mode() {
            request.resolve_deferred().await;
        } else {
            request.discard_deferred();
        }
    }

    /// Run the response phase: the handler, then deferred resolution
    ///
    /// A failing handler restores the pre-handler response so the original
    /// body passes through unmodified.
    pub(crate) async fn run_response_phase(
        &self,
        request: &InterceptedRequest,
        response: &mut InterceptedResponse,
    ) {
        let Some(handler) = request.response_handler() else {
            return;
        };

        let snapshot = response.isolation_snapshot();
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(response)));
        match outcome {
            Ok(Ok(())) => {
                if request.async_mode() {
                    response.resolve_deferred().await;
                } else {
                    response.discard_deferred();
                }
            }
            Ok(Err(e)) => {
                error!("Response handler error, passing original through: {}", e);
                response.restore_snapshot(snapshot);
            }
            Err(_) => {
                error!("Response handler panicked, passing original through");
                response.restore_snapshot(snapshot);
            }
        }
    }

    /// Issue the real call through the saved transport
    pub(crate) async fn forward(&self, request: &InterceptedRequest) -> Result<TransportResponse> {
        debug!("Forwarding {} {}", request.method, request.url);
        self.transport
            .execute(TransportRequest {
                url: request.url.clone(),
                method: request.method.clone(),
                headers: request.headers.clone(),
                body: request.body.clone(),
            })
            .await
    }
}

/// Materialize the body as JSON, apply `transform`, write the result back
///
/// Works identically for both call shapes: the unified body cell keeps the
/// raw, text and JSON representations consistent, so no per-shape branch is
/// needed. A body that is not valid JSON is logged and passed through
/// unmodified.
pub fn modify_json<F>(response: &mut InterceptedResponse, transform: F)
where
    F: FnOnce(Value) -> Value,
{
    let parsed = match response.json() {
        Ok(value) => value,
        Err(e) => {
            error!(
                "Failed to modify JSON response for {}: {}",
                response.final_url, e
            );
            return;
        }
    };
    response.set_json(transform(parsed));
}
