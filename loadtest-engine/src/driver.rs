//! The load test driver and its running aggregates

use chrono::{DateTime, Utc};
use rand::Rng;
use reqforge_common::RequestData;
use request_engine::transport::TransportStack;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sliding window of latencies kept for percentile computation
const RESULT_WINDOW: usize = 200;

/// Hard timeout for real-target iterations
const REQUEST_TIMEOUT_MS: u64 = 5000;

/// Configuration for one load test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    pub total_requests: u32,
    /// Real GET target; simulated latency/status when absent
    pub target: Option<String>,
    /// Informational only; dispatch is strictly sequential
    pub concurrency: u32,
}

impl LoadTestConfig {
    pub fn simulated(total_requests: u32) -> Self {
        Self {
            total_requests,
            target: None,
            concurrency: 1,
        }
    }

    pub fn against(total_requests: u32, target: impl Into<String>) -> Self {
        Self {
            total_requests,
            target: Some(target.into()),
            concurrency: 1,
        }
    }
}

/// One completed iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestResult {
    pub sequence: u32,
    /// HTTP status, or 0 for a timeout / transport failure
    pub status: u16,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl RequestResult {
    pub fn is_error(&self) -> bool {
        self.status == 0 || self.status >= 400
    }
}

/// Running aggregates recomputed after every completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadTestStats {
    pub completed: u32,
    pub average_ms: f64,
    pub p95_ms: u64,
    pub error_rate: f64,
    pub requests_per_second: f64,
}

/// One streamed update: the result plus the aggregates after it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestUpdate {
    pub result: RequestResult,
    pub stats: LoadTestStats,
}

/// Accumulates results and derives the running aggregates
///
/// Average and error rate run over every completion; the percentile runs
/// over a sliding window of the most recent 200 latencies.
#[derive(Debug, Default)]
pub struct LoadTestAggregator {
    window: VecDeque<u64>,
    completed: u32,
    errors: u32,
    latency_sum: u64,
}

impl LoadTestAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one result and return the aggregates including it
    pub fn record(&mut self, result: &RequestResult, elapsed: Duration) -> LoadTestStats {
        self.completed += 1;
        self.latency_sum += result.latency_ms;
        if result.is_error() {
            self.errors += 1;
        }

        self.window.push_back(result.latency_ms);
        if self.window.len() > RESULT_WINDOW {
            self.window.pop_front();
        }

        let elapsed_secs = elapsed.as_secs_f64();
        LoadTestStats {
            completed: self.completed,
            average_ms: self.latency_sum as f64 / self.completed as f64,
            p95_ms: self.p95(),
            error_rate: self.errors as f64 / self.completed as f64,
            requests_per_second: if elapsed_secs > 0.0 {
                self.completed as f64 / elapsed_secs
            } else {
                0.0
            },
        }
    }

    /// Nearest-rank 95th percentile over the window
    fn p95(&self) -> u64 {
        if self.window.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.window.iter().copied().collect();
        sorted.sort_unstable();
        let rank = ((sorted.len() as f64) * 0.95).floor() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }
}

/// Issues load test iterations strictly sequentially
pub struct LoadTestDriver {
    transport: Arc<TransportStack>,
    cancel: CancellationToken,
}

impl LoadTestDriver {
    pub fn new(transport: Arc<TransportStack>) -> Self {
        Self {
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Token for cooperative cancellation; checked at iteration
    /// boundaries, so an in-flight iteration is allowed to finish
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation of a running test
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Start the run, streaming one update per completed iteration
    ///
    /// The channel closes when the run completes or is cancelled.
    pub fn run(&self, config: LoadTestConfig) -> mpsc::UnboundedReceiver<LoadTestUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = self.transport.clone();
        let cancel = self.cancel.clone();

        info!(
            "starting load test: {} requests, target: {}",
            config.total_requests,
            config.target.as_deref().unwrap_or("<simulated>")
        );

        tokio::spawn(async move {
            let started = Instant::now();
            let mut aggregator = LoadTestAggregator::new();

            for sequence in 0..config.total_requests {
                if cancel.is_cancelled() {
                    info!("load test cancelled after {} iterations", sequence);
                    break;
                }

                let (status, latency_ms) = match &config.target {
                    Some(target) => real_iteration(&transport, target).await,
                    None => simulated_iteration().await,
                };

                let result = RequestResult {
                    sequence,
                    status,
                    latency_ms,
                    timestamp: Utc::now(),
                };
                let stats = aggregator.record(&result, started.elapsed());
                debug!(
                    "iteration {}: status {} in {}ms (p95 {}ms)",
                    sequence, status, latency_ms, stats.p95_ms
                );

                if tx.send(LoadTestUpdate { result, stats }).is_err() {
                    // Receiver dropped; nobody is watching anymore
                    break;
                }
            }
        });

        rx
    }
}

/// Simulate one iteration: 30-180ms latency, ~8% server errors
async fn simulated_iteration() -> (u16, u64) {
    let (latency_ms, status) = {
        let mut rng = rand::thread_rng();
        let latency_ms = rng.gen_range(30..=180u64);
        let status = if rng.gen::<f64>() < 0.08 { 500 } else { 200 };
        (latency_ms, status)
    };
    tokio::time::sleep(Duration::from_millis(latency_ms)).await;
    (status, latency_ms)
}

/// Perform one real GET with a hard timeout
async fn real_iteration(transport: &TransportStack, target: &str) -> (u16, u64) {
    let request = RequestData::new("GET", target);
    let current = transport.current();
    let started = Instant::now();
    let dispatch = current.dispatch(&request);

    match tokio::time::timeout(Duration::from_millis(REQUEST_TIMEOUT_MS), dispatch).await {
        Ok(Ok(response)) => (response.status, started.elapsed().as_millis() as u64),
        // Timeout and transport failure both count as a full-timeout error
        Ok(Err(_)) | Err(_) => (0, REQUEST_TIMEOUT_MS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use request_engine::transport::Transport;
    use request_engine::{EngineError, EngineResult};
    use reqforge_common::ResponseData;

    fn result(status: u16, latency_ms: u64) -> RequestResult {
        RequestResult {
            sequence: 0,
            status,
            latency_ms,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_p95_nearest_rank() {
        let mut agg = LoadTestAggregator::new();
        let mut stats = LoadTestStats::default();
        for latency in [10, 20, 30, 40, 50, 60, 70, 80, 90, 100] {
            stats = agg.record(&result(200, latency), Duration::from_secs(1));
        }
        // rank = floor(10 * 0.95) = 9 (0-indexed) of the sorted array
        assert_eq!(stats.p95_ms, 100);
        assert_eq!(stats.completed, 10);
        assert_eq!(stats.average_ms, 55.0);
        assert_eq!(stats.error_rate, 0.0);
    }

    #[test]
    fn test_error_rate_counts_status_zero_and_4xx_plus() {
        let mut agg = LoadTestAggregator::new();
        agg.record(&result(200, 10), Duration::from_secs(1));
        agg.record(&result(404, 10), Duration::from_secs(1));
        agg.record(&result(500, 10), Duration::from_secs(1));
        let stats = agg.record(&result(0, 5000), Duration::from_secs(1));
        assert_eq!(stats.error_rate, 0.75);
    }

    #[test]
    fn test_window_slides_at_cap() {
        let mut agg = LoadTestAggregator::new();
        // 250 low latencies, then one spike; the window keeps the last 200
        for _ in 0..250 {
            agg.record(&result(200, 10), Duration::from_secs(1));
        }
        let stats = agg.record(&result(200, 9999), Duration::from_secs(1));
        assert_eq!(agg.window.len(), RESULT_WINDOW);
        assert_eq!(stats.completed, 251);
        assert_eq!(stats.p95_ms, 10);
    }

    struct InstantTransport(u16);

    #[async_trait]
    impl Transport for InstantTransport {
        async fn dispatch(&self, _request: &RequestData) -> EngineResult<ResponseData> {
            Ok(ResponseData::new(self.0, "", "ok"))
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn dispatch(&self, _request: &RequestData) -> EngineResult<ResponseData> {
            Err(EngineError::network("unreachable"))
        }
    }

    #[tokio::test]
    async fn test_real_target_run_streams_all_updates() {
        let stack = Arc::new(TransportStack::new(Arc::new(InstantTransport(200))));
        let driver = LoadTestDriver::new(stack);
        let mut rx = driver.run(LoadTestConfig::against(5, "https://t.test/health"));

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }

        assert_eq!(updates.len(), 5);
        assert!(updates.iter().all(|u| u.result.status == 200));
        assert_eq!(updates.last().unwrap().stats.completed, 5);
        assert_eq!(updates.last().unwrap().stats.error_rate, 0.0);
    }

    #[tokio::test]
    async fn test_transport_failure_recorded_as_status_zero() {
        let stack = Arc::new(TransportStack::new(Arc::new(FailingTransport)));
        let driver = LoadTestDriver::new(stack);
        let mut rx = driver.run(LoadTestConfig::against(3, "https://down.test"));

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }

        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|u| u.result.status == 0));
        assert!(updates.iter().all(|u| u.result.latency_ms == REQUEST_TIMEOUT_MS));
        assert_eq!(updates.last().unwrap().stats.error_rate, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_run_and_cancellation() {
        let stack = Arc::new(TransportStack::new(Arc::new(InstantTransport(200))));
        let driver = LoadTestDriver::new(stack);
        let mut rx = driver.run(LoadTestConfig::simulated(1000));

        // Let a few iterations through, then cancel cooperatively
        let mut received = 0;
        while let Some(update) = rx.recv().await {
            received += 1;
            assert!(update.result.latency_ms >= 30 && update.result.latency_ms <= 180);
            assert!(update.result.status == 200 || update.result.status == 500);
            if received == 5 {
                driver.cancel();
            }
        }

        // The in-flight iteration finishes; nothing runs after the check
        assert!(received >= 5);
        assert!(received < 1000);
    }
}
