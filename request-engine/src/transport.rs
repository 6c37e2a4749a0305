//! Transport abstraction and the stack-based provider
//!
//! The orchestrator and load driver never call the network directly; they
//! ask the `TransportStack` for the current transport. Interceptors install
//! themselves on the stack and restore the previous transport on stop, so
//! nested overrides unwind cleanly.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use reqforge_common::{status_text, RequestData, ResponseData};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::debug;

/// A single outbound HTTP call
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dispatch the request and return a response snapshot
    ///
    /// Transport-level failures map to `EngineError::Network`; any HTTP
    /// status, including 4xx/5xx, is a successful dispatch.
    async fn dispatch(&self, request: &RequestData) -> EngineResult<ResponseData>;
}

/// Real network transport backed by reqwest
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(&self, request: &RequestData) -> EngineResult<ResponseData> {
        let method = reqwest::Method::from_str(&request.method)
            .map_err(|_| EngineError::validation("method", "unknown HTTP method"))?;

        let mut builder = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or_else(|| status_text(status));

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.to_string(), value.to_string());
            }
        }

        let body = response.text().await?;
        let elapsed = started.elapsed().as_millis() as u64;
        debug!("{} {} -> {} in {}ms", request.method, request.url, status, elapsed);

        Ok(ResponseData::new(status, reason, body)
            .with_headers(headers)
            .with_elapsed(elapsed))
    }
}

/// Stack of transport overrides over a base transport
///
/// `current()` returns the top of the stack, or the base when nothing is
/// installed. Install/restore are push/pop, so a test or interceptor that
/// wraps the transport always hands back exactly what it replaced.
pub struct TransportStack {
    base: Arc<dyn Transport>,
    overrides: RwLock<Vec<Arc<dyn Transport>>>,
}

impl TransportStack {
    /// Create a stack over the given base transport
    pub fn new(base: Arc<dyn Transport>) -> Self {
        Self {
            base,
            overrides: RwLock::new(Vec::new()),
        }
    }

    /// Stack over the real network
    pub fn over_network() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }

    /// The transport requests currently go through
    pub fn current(&self) -> Arc<dyn Transport> {
        let overrides = self.overrides.read().expect("transport stack poisoned");
        overrides.last().cloned().unwrap_or_else(|| self.base.clone())
    }

    /// Push an override; it becomes the current transport
    pub fn install(&self, transport: Arc<dyn Transport>) {
        self.overrides
            .write()
            .expect("transport stack poisoned")
            .push(transport);
    }

    /// Pop the top override, restoring the previous transport
    ///
    /// Returns false when no override was installed.
    pub fn restore(&self) -> bool {
        self.overrides
            .write()
            .expect("transport stack poisoned")
            .pop()
            .is_some()
    }

    /// Number of installed overrides
    pub fn depth(&self) -> usize {
        self.overrides.read().expect("transport stack poisoned").len()
    }
}
