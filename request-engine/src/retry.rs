//! Bounded retry with linear backoff and a trip-once circuit breaker
//!
//! The backoff between attempts is `backoff_ms * (attempt + 1)`. The
//! breaker counts consecutive transport-level failures across every call
//! that shares it; once tripped it stays open until `reset()`.

use crate::error::{EngineError, EngineResult};
use crate::transport::Transport;
use reqforge_common::{RequestData, ResponseData};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retry policy for one send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (>= 1)
    pub attempts: u32,
    /// Base backoff in milliseconds, multiplied by the attempt index
    pub backoff_ms: u64,
    /// Status codes that trigger a retry instead of a return
    pub retryable_status_codes: HashSet<u16>,
    /// Whether transport failures feed the shared circuit breaker
    pub circuit_breaker_enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff_ms: 0,
            retryable_status_codes: HashSet::new(),
            circuit_breaker_enabled: false,
        }
    }
}

impl RetryPolicy {
    /// Policy with `attempts` tries and a base backoff
    pub fn new(attempts: u32, backoff_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff_ms,
            ..Self::default()
        }
    }

    /// Add retryable status codes
    pub fn with_retryable_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes.extend(codes);
        self
    }

    /// Enable the circuit breaker for this policy
    pub fn with_circuit_breaker(mut self) -> Self {
        self.circuit_breaker_enabled = true;
        self
    }
}

/// Shared failure counter with a pause latch
///
/// Cloning shares state, so every executor holding a clone observes the
/// same counter. Construct separate instances for isolated breakers
/// (e.g. per host, or per test).
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    inner: Arc<BreakerState>,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: AtomicU32,
    paused: AtomicBool,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the breaker is currently open
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Current consecutive failure count
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Record a transport-level failure, returning the new count
    pub fn record_failure(&self) -> u32 {
        self.inner.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record a completed call, clearing the failure streak
    pub fn record_success(&self) {
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Open the breaker; every subsequent send fails fast until reset
    pub fn trip(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    /// Close the breaker and clear the failure streak
    pub fn reset(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
    }
}

/// Executes a single outbound call under a retry policy
pub struct RetryExecutor {
    breaker: CircuitBreaker,
}

impl RetryExecutor {
    /// Create an executor around the given breaker
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self { breaker }
    }

    /// Handle to the shared breaker
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run the request through the transport, retrying per policy
    ///
    /// Attempts run strictly sequentially. The returned snapshot carries
    /// the wall-clock elapsed time of the final (successful) attempt.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        request: &RequestData,
        policy: &RetryPolicy,
    ) -> EngineResult<ResponseData> {
        let attempts = policy.attempts.max(1);
        let mut attempt: u32 = 0;

        while attempt < attempts {
            if self.breaker.is_paused() {
                warn!("circuit breaker open, failing fast for {}", request.url);
                return Err(EngineError::CircuitOpen);
            }

            let started = Instant::now();
            match transport.dispatch(request).await {
                Err(err) => {
                    let failures = self.breaker.record_failure();
                    if policy.circuit_breaker_enabled && failures >= attempts {
                        warn!(
                            "tripping circuit breaker after {} consecutive failures",
                            failures
                        );
                        self.breaker.trip();
                    }
                    if attempt + 1 == attempts {
                        return Err(err);
                    }
                    let delay = policy.backoff_ms * (attempt as u64 + 1);
                    debug!(
                        "attempt {} failed ({}), backing off {}ms",
                        attempt + 1,
                        err,
                        delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Ok(response) => {
                    let retryable = policy.retryable_status_codes.contains(&response.status);
                    if retryable && attempt + 1 < attempts {
                        // Retryable status does not count as a circuit failure
                        let delay = policy.backoff_ms * (attempt as u64 + 1);
                        debug!(
                            "attempt {} returned {}, backing off {}ms",
                            attempt + 1,
                            response.status,
                            delay
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    } else {
                        self.breaker.record_success();
                        let elapsed = started.elapsed().as_millis() as u64;
                        return Ok(response.with_elapsed(elapsed));
                    }
                }
            }
            attempt += 1;
        }

        Err(EngineError::MaxRetriesExceeded { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport returning a scripted sequence of outcomes
    struct ScriptedTransport {
        script: Mutex<Vec<Result<u16, String>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<u16, String>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn dispatch(&self, _request: &RequestData) -> EngineResult<ResponseData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().remove(0);
            match next {
                Ok(status) => Ok(ResponseData::new(status, "", "ok")),
                Err(details) => Err(EngineError::network(details)),
            }
        }
    }

    fn request() -> RequestData {
        RequestData::new("GET", "https://api.example.com/health")
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_status_sleeps_linear_backoff() {
        let transport = ScriptedTransport::new(vec![Ok(503), Ok(503), Ok(200)]);
        let policy = RetryPolicy::new(3, 100).with_retryable_codes([503]);
        let executor = RetryExecutor::new(CircuitBreaker::new());

        let started = tokio::time::Instant::now();
        let response = executor.execute(&transport, &request(), &policy).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.calls(), 3);
        // Two sleeps: 100ms after attempt 0, 200ms after attempt 1
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retryable_status_on_last_attempt_is_returned() {
        let transport = ScriptedTransport::new(vec![Ok(503), Ok(503)]);
        let policy = RetryPolicy::new(2, 0).with_retryable_codes([503]);
        let executor = RetryExecutor::new(CircuitBreaker::new());

        let response = executor.execute(&transport, &request(), &policy).await.unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_network_failure_exhausts_and_reraises() {
        let transport = ScriptedTransport::new(vec![
            Err("refused".to_string()),
            Err("refused".to_string()),
        ]);
        let policy = RetryPolicy::new(2, 0);
        let executor = RetryExecutor::new(CircuitBreaker::new());

        let err = executor.execute(&transport, &request(), &policy).await.unwrap_err();
        assert!(matches!(err, EngineError::Network { .. }));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_breaker_trips_and_fails_fast() {
        let transport = ScriptedTransport::new(vec![
            Err("down".to_string()),
            Err("down".to_string()),
        ]);
        let policy = RetryPolicy::new(2, 0).with_circuit_breaker();
        let executor = RetryExecutor::new(CircuitBreaker::new());

        let err = executor.execute(&transport, &request(), &policy).await.unwrap_err();
        assert!(matches!(err, EngineError::Network { .. }));
        assert!(executor.breaker().is_paused());

        // No further I/O once the breaker is open
        let calls_before = transport.calls();
        let err = executor.execute(&transport, &request(), &policy).await.unwrap_err();
        assert!(matches!(err, EngineError::CircuitOpen));
        assert_eq!(transport.calls(), calls_before);

        // Explicit reset restores normal operation
        executor.breaker().reset();
        assert!(!executor.breaker().is_paused());
        assert_eq!(executor.breaker().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_success_clears_failure_streak() {
        let transport = ScriptedTransport::new(vec![Err("blip".to_string()), Ok(200)]);
        let policy = RetryPolicy::new(3, 0).with_circuit_breaker();
        let executor = RetryExecutor::new(CircuitBreaker::new());

        let response = executor.execute(&transport, &request(), &policy).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(executor.breaker().consecutive_failures(), 0);
        assert!(!executor.breaker().is_paused());
    }

    #[tokio::test]
    async fn test_breakers_are_isolated_instances() {
        let a = CircuitBreaker::new();
        let b = CircuitBreaker::new();
        a.trip();
        assert!(a.is_paused());
        assert!(!b.is_paused());

        // A clone shares state with its source
        let a2 = a.clone();
        assert!(a2.is_paused());
        a2.reset();
        assert!(!a.is_paused());
    }
}
