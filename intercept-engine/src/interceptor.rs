//! The interceptor transport wrapper
//!
//! Installed on the `TransportStack`, the interceptor sees every outgoing
//! request. Evaluation order: proxy rules (when proxy mode is enabled),
//! then mock routes, then the wrapped transport. Synthesized responses
//! (block, redirect, mock, no-transport 404) are ordinary response values,
//! never errors.

use crate::rules::{ProxyRule, RuleAction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqforge_common::{status_text, MockRoute, RequestData, ResponseData};
use request_engine::transport::{Transport, TransportStack};
use request_engine::EngineResult;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{debug, info};
use uuid::Uuid;

const LOG_CAP: usize = 100;

/// What the interceptor did with one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDisposition {
    Passthrough,
    Blocked,
    Delayed,
    Mocked,
    Redirected,
    Modified,
    MockRoute,
}

/// One intercepted request, as shown in the traffic log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficLogEntry {
    pub id: String,
    pub method: String,
    pub url: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub matched_rule: Option<String>,
    pub disposition: RuleDisposition,
    pub delayed_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counters over the interceptor's lifetime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterceptStats {
    pub total: u64,
    pub blocked: u64,
    pub delayed: u64,
    pub mocked: u64,
    pub redirected: u64,
    pub modified: u64,
    pub passed: u64,
    pub average_latency_ms: f64,
}

#[derive(Debug, Default)]
struct StatsAccum {
    stats: InterceptStats,
    total_latency_ms: u64,
}

impl StatsAccum {
    fn record(&mut self, disposition: RuleDisposition, duration_ms: u64) {
        self.stats.total += 1;
        self.total_latency_ms += duration_ms;
        match disposition {
            RuleDisposition::Blocked => self.stats.blocked += 1,
            RuleDisposition::Delayed => self.stats.delayed += 1,
            RuleDisposition::Mocked | RuleDisposition::MockRoute => self.stats.mocked += 1,
            RuleDisposition::Redirected => self.stats.redirected += 1,
            RuleDisposition::Modified => self.stats.modified += 1,
            RuleDisposition::Passthrough => self.stats.passed += 1,
        }
        self.stats.average_latency_ms = self.total_latency_ms as f64 / self.stats.total as f64;
    }
}

/// Transport wrapper evaluating proxy rules and mock routes
///
/// `start` captures the currently-installed transport as the fallback and
/// pushes the interceptor onto the stack; `stop` pops it again. Both are
/// idempotent, and only one install per interceptor is ever active.
pub struct Interceptor {
    proxy_enabled: AtomicBool,
    installed: AtomicBool,
    rules: AsyncRwLock<Vec<ProxyRule>>,
    routes: AsyncRwLock<Vec<MockRoute>>,
    inner: RwLock<Option<Arc<dyn Transport>>>,
    log: Mutex<VecDeque<TrafficLogEntry>>,
    stats: Mutex<StatsAccum>,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor {
    pub fn new() -> Self {
        Self {
            proxy_enabled: AtomicBool::new(false),
            installed: AtomicBool::new(false),
            rules: AsyncRwLock::new(Vec::new()),
            routes: AsyncRwLock::new(Vec::new()),
            inner: RwLock::new(None),
            log: Mutex::new(VecDeque::new()),
            stats: Mutex::new(StatsAccum::default()),
        }
    }

    /// Enable or disable proxy rule evaluation
    pub fn set_proxy_enabled(&self, enabled: bool) {
        self.proxy_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn proxy_enabled(&self) -> bool {
        self.proxy_enabled.load(Ordering::SeqCst)
    }

    /// Replace the proxy rule list
    pub async fn set_rules(&self, rules: Vec<ProxyRule>) {
        *self.rules.write().await = rules;
    }

    /// Append one proxy rule
    pub async fn add_rule(&self, rule: ProxyRule) {
        self.rules.write().await.push(rule);
    }

    /// Replace the mock route table
    pub async fn set_routes(&self, routes: Vec<MockRoute>) {
        *self.routes.write().await = routes;
    }

    /// Append one mock route
    pub async fn add_route(&self, route: MockRoute) {
        self.routes.write().await.push(route);
    }

    /// Install the interceptor on the transport stack
    ///
    /// Captures the current transport as the passthrough target. A second
    /// start while already installed is a no-op.
    pub fn start(self: Arc<Self>, stack: &TransportStack) {
        if self.installed.swap(true, Ordering::SeqCst) {
            debug!("interceptor already installed, ignoring start");
            return;
        }
        let previous = stack.current();
        *self.inner.write().expect("interceptor inner poisoned") = Some(previous);
        info!("interceptor installed");
        stack.install(self);
    }

    /// Remove the interceptor, restoring the previous transport
    pub fn stop(&self, stack: &TransportStack) {
        if !self.installed.swap(false, Ordering::SeqCst) {
            return;
        }
        stack.restore();
        *self.inner.write().expect("interceptor inner poisoned") = None;
        info!("interceptor removed");
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Traffic log, newest first (capped at 100 entries)
    pub fn traffic_log(&self) -> Vec<TrafficLogEntry> {
        self.log
            .lock()
            .expect("traffic log poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Drop all log entries
    pub fn clear_log(&self) {
        self.log.lock().expect("traffic log poisoned").clear();
    }

    /// Aggregate stats snapshot
    pub fn stats(&self) -> InterceptStats {
        self.stats.lock().expect("intercept stats poisoned").stats.clone()
    }

    fn passthrough_target(&self) -> Option<Arc<dyn Transport>> {
        self.inner
            .read()
            .expect("interceptor inner poisoned")
            .clone()
    }

    fn record(
        &self,
        request: &RequestData,
        status: u16,
        duration_ms: u64,
        matched_rule: Option<&ProxyRule>,
        disposition: RuleDisposition,
        delayed_ms: Option<u64>,
    ) {
        let entry = TrafficLogEntry {
            id: Uuid::new_v4().to_string(),
            method: request.method.clone(),
            url: request.url.clone(),
            path: request.path(),
            status,
            duration_ms,
            matched_rule: matched_rule.map(|r| r.name.clone()),
            disposition,
            delayed_ms,
            timestamp: Utc::now(),
        };

        let mut log = self.log.lock().expect("traffic log poisoned");
        log.push_front(entry);
        log.truncate(LOG_CAP);

        self.stats
            .lock()
            .expect("intercept stats poisoned")
            .record(disposition, duration_ms);
    }

    /// Dispatch through the wrapped transport, or synthesize a 404 when
    /// the interceptor was never started
    async fn forward(&self, request: &RequestData) -> EngineResult<ResponseData> {
        match self.passthrough_target() {
            Some(inner) => inner.dispatch(request).await,
            None => Ok(ResponseData::new(
                404,
                status_text(404),
                r#"{"error":"no transport available"}"#,
            )
            .with_mock_flag()),
        }
    }

    async fn apply_rule(
        &self,
        rule: &ProxyRule,
        request: &RequestData,
        started: Instant,
    ) -> EngineResult<ResponseData> {
        match &rule.action {
            RuleAction::Block => {
                let response = ResponseData::new(
                    403,
                    status_text(403),
                    r#"{"error":"blocked by proxy rule"}"#,
                )
                .with_mock_flag()
                .with_elapsed(started.elapsed().as_millis() as u64);
                self.record(
                    request,
                    403,
                    response.elapsed_ms,
                    Some(rule),
                    RuleDisposition::Blocked,
                    None,
                );
                Ok(response)
            }
            RuleAction::Delay { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                let result = self.forward(request).await;
                let duration = started.elapsed().as_millis() as u64;
                let status = result.as_ref().map(|r| r.status).unwrap_or(0);
                self.record(
                    request,
                    status,
                    duration,
                    Some(rule),
                    RuleDisposition::Delayed,
                    Some(*delay_ms),
                );
                result.map(|r| r.with_elapsed(duration))
            }
            RuleAction::Mock {
                status,
                headers,
                body,
            } => {
                let response = ResponseData::new(*status, status_text(*status), body.clone())
                    .with_headers(headers.clone())
                    .with_mock_flag()
                    .with_elapsed(started.elapsed().as_millis() as u64);
                self.record(
                    request,
                    *status,
                    response.elapsed_ms,
                    Some(rule),
                    RuleDisposition::Mocked,
                    None,
                );
                Ok(response)
            }
            RuleAction::Redirect { target_url } => {
                let response = ResponseData::new(302, status_text(302), "")
                    .with_header("Location", target_url.clone())
                    .with_mock_flag()
                    .with_elapsed(started.elapsed().as_millis() as u64);
                self.record(
                    request,
                    302,
                    response.elapsed_ms,
                    Some(rule),
                    RuleDisposition::Redirected,
                    None,
                );
                Ok(response)
            }
            RuleAction::Modify {
                request_headers,
                request_body,
                response_status,
                response_headers,
                response_body,
            } => {
                let mut modified = request.clone();
                for (key, value) in request_headers {
                    modified.set_header(key.clone(), value.clone());
                }
                if let Some(body) = request_body {
                    modified.body = Some(body.clone());
                }

                let result = self.forward(&modified).await;
                let duration = started.elapsed().as_millis() as u64;

                let result = result.map(|mut response| {
                    if let Some(status) = response_status {
                        response.status = *status;
                        response.status_text = status_text(*status).to_string();
                    }
                    for (key, value) in response_headers {
                        response.headers.insert(key.clone(), value.clone());
                    }
                    if let Some(body) = response_body {
                        response.body = body.clone();
                        response.size_bytes = response.body.len();
                    }
                    response.with_elapsed(duration)
                });

                let status = result.as_ref().map(|r| r.status).unwrap_or(0);
                self.record(
                    request,
                    status,
                    duration,
                    Some(rule),
                    RuleDisposition::Modified,
                    None,
                );
                result
            }
        }
    }
}

#[async_trait]
impl Transport for Interceptor {
    async fn dispatch(&self, request: &RequestData) -> EngineResult<ResponseData> {
        let started = Instant::now();

        // 1. Proxy rules, first enabled match wins
        if self.proxy_enabled() {
            let matched = {
                let rules = self.rules.read().await;
                rules.iter().find(|rule| rule.matches(request)).cloned()
            };
            if let Some(rule) = matched {
                debug!("proxy rule '{}' matched {}", rule.name, request.url);
                return self.apply_rule(&rule, request, started).await;
            }
        }

        // 2. Mock routes, matched against the request path
        let path = request.path();
        let route = {
            let routes = self.routes.read().await;
            routes.iter().find(|route| route.matches_path(&path)).cloned()
        };
        if let Some(route) = route {
            debug!("mock route matched path {}", path);
            tokio::time::sleep(Duration::from_millis(route.latency_ms)).await;
            let response = ResponseData::new(route.status, status_text(route.status), route.body.clone())
                .with_header("Content-Type", route.content_type.clone())
                .with_mock_flag()
                .with_elapsed(started.elapsed().as_millis() as u64);
            self.record(
                request,
                route.status,
                response.elapsed_ms,
                None,
                RuleDisposition::MockRoute,
                Some(route.latency_ms),
            );
            return Ok(response);
        }

        // 3. Fall through to the wrapped transport
        let result = self.forward(request).await;
        let duration = started.elapsed().as_millis() as u64;
        let status = result.as_ref().map(|r| r.status).unwrap_or(0);
        self.record(
            request,
            status,
            duration,
            None,
            RuleDisposition::Passthrough,
            None,
        );
        result
    }
}
