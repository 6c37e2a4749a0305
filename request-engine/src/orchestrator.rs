//! Request orchestration - compose, dispatch, record
//!
//! `RequestOrchestrator::send` is the single entry point for one send:
//! validate, resolve variables, merge auth material, append the query
//! string, consult mock routes, and dispatch through the current transport
//! under the retry policy. Completion records history and best-effort
//! saves dirty collection items back to storage.

use crate::auth::AuthConfig;
use crate::error::{EngineError, EngineResult};
use crate::history::HistoryStore;
use crate::retry::{CircuitBreaker, RetryExecutor, RetryPolicy};
use crate::scope::VariableScopes;
use crate::transport::TransportStack;
use async_trait::async_trait;
use reqforge_common::{status_text, KeyValueEntry, MockRoute, RequestData, ResponseData};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// External persistence for collection items
///
/// The auto-save path treats any error as non-fatal; a failed save never
/// surfaces to the caller of `send`.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn patch_item(&self, item_id: &str, payload: &serde_json::Value) -> EngineResult<()>;
}

/// The editable request state, as composed in the request editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSpec {
    pub method: String,
    pub url: String,
    pub headers: Vec<KeyValueEntry>,
    pub params: Vec<KeyValueEntry>,
    pub body: Option<String>,
    pub auth: AuthConfig,
    /// Backing collection item, when the request was opened from one
    pub item_id: Option<String>,
    /// Unsaved edits relative to the backing item
    pub dirty: bool,
}

impl RequestSpec {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
            auth: AuthConfig::None,
            item_id: None,
            dirty: false,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(KeyValueEntry::new(key, value));
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(KeyValueEntry::new(key, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Tie the spec to a persisted collection item with unsaved edits
    pub fn from_item(mut self, item_id: impl Into<String>, dirty: bool) -> Self {
        self.item_id = Some(item_id.into());
        self.dirty = dirty;
        self
    }
}

/// Orchestrates a single send end to end
pub struct RequestOrchestrator {
    scopes: Arc<RwLock<VariableScopes>>,
    transport: Arc<TransportStack>,
    executor: RetryExecutor,
    policy: RwLock<RetryPolicy>,
    mock_routes: RwLock<Vec<MockRoute>>,
    history: Arc<HistoryStore>,
    store: Option<Arc<dyn CollectionStore>>,
}

impl RequestOrchestrator {
    /// Create an orchestrator over the given transport provider
    pub fn new(transport: Arc<TransportStack>) -> Self {
        Self {
            scopes: Arc::new(RwLock::new(VariableScopes::new())),
            transport,
            executor: RetryExecutor::new(CircuitBreaker::new()),
            policy: RwLock::new(RetryPolicy::default()),
            mock_routes: RwLock::new(Vec::new()),
            history: Arc::new(HistoryStore::new()),
            store: None,
        }
    }

    /// Use a specific circuit breaker instance
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.executor = RetryExecutor::new(breaker);
        self
    }

    /// Attach the persistence collaborator used by auto-save
    pub fn with_store(mut self, store: Arc<dyn CollectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Shared handle to the variable scopes
    pub fn scopes(&self) -> Arc<RwLock<VariableScopes>> {
        self.scopes.clone()
    }

    /// The history store backing this orchestrator
    pub fn history(&self) -> Arc<HistoryStore> {
        self.history.clone()
    }

    /// The shared circuit breaker
    pub fn breaker(&self) -> &CircuitBreaker {
        self.executor.breaker()
    }

    /// Replace the retry policy used for subsequent sends
    pub async fn set_policy(&self, policy: RetryPolicy) {
        *self.policy.write().await = policy;
    }

    /// Replace the mock route table
    pub async fn set_mock_routes(&self, routes: Vec<MockRoute>) {
        *self.mock_routes.write().await = routes;
    }

    /// Append one mock route
    pub async fn add_mock_route(&self, route: MockRoute) {
        self.mock_routes.write().await.push(route);
    }

    /// Execute one send
    pub async fn send(&self, spec: &RequestSpec) -> EngineResult<ResponseData> {
        if spec.url.trim().is_empty() {
            return Err(EngineError::validation("url", "URL must not be blank"));
        }

        let request = self.compose(spec).await;
        debug!("composed {} {}", request.method, request.url);

        let response = match self.find_mock(&request.url).await {
            Some(route) => {
                info!("mock route matched {} - bypassing network", request.url);
                let started = Instant::now();
                tokio::time::sleep(Duration::from_millis(route.latency_ms)).await;
                ResponseData::new(route.status, status_text(route.status), route.body.clone())
                    .with_header("Content-Type", route.content_type.clone())
                    .with_elapsed(started.elapsed().as_millis() as u64)
                    .with_mock_flag()
            }
            None => {
                let policy = self.policy.read().await.clone();
                let transport = self.transport.current();
                self.executor
                    .execute(transport.as_ref(), &request, &policy)
                    .await?
            }
        };

        self.history.record(&request.method, &request.url).await;
        self.auto_save(spec).await;

        Ok(response)
    }

    /// Resolve variables, merge auth, and append the query string
    async fn compose(&self, spec: &RequestSpec) -> RequestData {
        let scopes = self.scopes.read().await;

        let mut url = scopes.resolve(spec.url.trim());

        // User headers first, auth material second: on a name collision the
        // synthesized auth header wins.
        let mut headers = HashMap::new();
        for entry in spec.headers.iter().filter(|e| e.enabled) {
            let key = scopes.resolve(&entry.key);
            if key.is_empty() {
                continue;
            }
            headers.insert(key, scopes.resolve(&entry.value));
        }
        headers.extend(spec.auth.headers(&scopes));

        let mut params: Vec<(String, String)> = spec
            .params
            .iter()
            .filter(|e| e.enabled)
            .map(|e| (scopes.resolve(&e.key), scopes.resolve(&e.value)))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        params.extend(spec.auth.query_params(&scopes));

        for (key, value) in params {
            let sep = if url.contains('?') { '&' } else { '?' };
            url.push(sep);
            url.push_str(&key);
            url.push('=');
            url.push_str(&value);
        }

        let method = spec.method.trim().to_uppercase();
        let mut request = RequestData {
            method,
            url,
            headers,
            body: None,
        };

        if let Some(body) = &spec.body {
            if !body.is_empty() {
                request.body = Some(body.clone());
                let has_content_type = request
                    .headers
                    .keys()
                    .any(|k| k.eq_ignore_ascii_case("content-type"));
                if request.method != "GET" && !has_content_type {
                    request.set_header("Content-Type", "application/json");
                }
            }
        }

        request
    }

    /// First mock route whose declared path appears in the final URL
    async fn find_mock(&self, url: &str) -> Option<MockRoute> {
        self.mock_routes
            .read()
            .await
            .iter()
            .find(|route| route.matches_url(url))
            .cloned()
    }

    /// Best-effort PATCH of a dirty collection item; failures are swallowed
    async fn auto_save(&self, spec: &RequestSpec) {
        let Some(store) = &self.store else { return };
        let Some(item_id) = &spec.item_id else { return };
        if !spec.dirty {
            return;
        }

        let payload = serde_json::json!({
            "method": spec.method,
            "url": spec.url,
            "headers": spec.headers,
            "body": spec.body,
            "params": spec.params,
        });

        if let Err(e) = store.patch_item(item_id, &payload).await {
            warn!("auto-save failed for item {}: {}", item_id, e);
        }
    }
}
