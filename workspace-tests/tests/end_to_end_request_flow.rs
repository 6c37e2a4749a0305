use async_trait::async_trait;
use intercept_engine::{Interceptor, ProxyRule, RuleAction, RuleMatcher};
use loadtest_engine::{LoadTestConfig, LoadTestDriver};
use reqforge_common::{MockRoute, RequestData, ResponseData};
use request_engine::transport::{Transport, TransportStack};
use request_engine::{
    AuthConfig, CircuitBreaker, EngineError, EngineResult, RequestOrchestrator, RequestSpec,
    RetryPolicy,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// In-process stand-in for the real network
struct FakeNetwork {
    calls: AtomicU32,
    seen: Mutex<Vec<RequestData>>,
    status: u16,
}

impl FakeNetwork {
    fn new(status: u16) -> Self {
        Self {
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
            status,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> RequestData {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Transport for FakeNetwork {
    async fn dispatch(&self, request: &RequestData) -> EngineResult<ResponseData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        Ok(ResponseData::new(self.status, "OK", r#"{"origin":"network"}"#))
    }
}

fn pipeline(status: u16) -> (Arc<FakeNetwork>, Arc<TransportStack>, Arc<Interceptor>, RequestOrchestrator) {
    let _ = tracing_subscriber::fmt::try_init();

    let network = Arc::new(FakeNetwork::new(status));
    let stack = Arc::new(TransportStack::new(network.clone()));
    let interceptor = Arc::new(Interceptor::new());
    interceptor.clone().start(&stack);
    let orchestrator = RequestOrchestrator::new(stack.clone());
    (network, stack, interceptor, orchestrator)
}

#[tokio::test]
async fn test_full_send_pipeline_with_variables_and_auth() {
    let (network, _stack, _interceptor, orchestrator) = pipeline(200);

    {
        let scopes = orchestrator.scopes();
        let mut scopes = scopes.write().await;
        scopes.set_active_env("staging");
        scopes.set_env_var("staging", "host", "staging.example.com");
        scopes.set_session("token", "session-token");
    }

    let spec = RequestSpec::new("POST", "https://{{host}}/v1/orders")
        .with_header("X-Request-Id", "r-1")
        .with_param("dry_run", "true")
        .with_body(r#"{"sku":"a-1"}"#)
        .with_auth(AuthConfig::Bearer {
            token: "{{token}}".to_string(),
        });

    let response = orchestrator.send(&spec).await.unwrap();
    assert!(response.is_success());
    assert!(!response.is_mock);

    let sent = network.last_request();
    assert_eq!(sent.url, "https://staging.example.com/v1/orders?dry_run=true");
    assert_eq!(sent.header("Authorization"), Some(&"Bearer session-token".to_string()));
    assert_eq!(sent.header("Content-Type"), Some(&"application/json".to_string()));
    assert_eq!(sent.body.as_deref(), Some(r#"{"sku":"a-1"}"#));

    // The send went through the interceptor and was recorded
    let history = orchestrator.history().items().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].method, "POST");
}

#[tokio::test]
async fn test_interceptor_mock_route_answers_without_network() {
    let (network, _stack, interceptor, orchestrator) = pipeline(200);
    interceptor
        .add_route(MockRoute::new("/users/*", 200, r#"{"origin":"mock"}"#))
        .await;

    let response = orchestrator
        .send(&RequestSpec::new("GET", "https://api.example.com/users/42"))
        .await
        .unwrap();

    assert!(response.is_mock);
    assert_eq!(response.body, r#"{"origin":"mock"}"#);
    assert_eq!(network.calls(), 0);

    // An unmatched path falls through to the network
    let response = orchestrator
        .send(&RequestSpec::new("GET", "https://api.example.com/accounts/1"))
        .await
        .unwrap();
    assert!(!response.is_mock);
    assert_eq!(network.calls(), 1);
}

#[tokio::test]
async fn test_proxy_block_flows_as_response_not_error() {
    let (network, _stack, interceptor, orchestrator) = pipeline(200);
    interceptor.set_proxy_enabled(true);
    interceptor
        .add_rule(ProxyRule::new(
            "deny admin",
            RuleMatcher::Path("/admin".to_string()),
            RuleAction::Block,
        ))
        .await;

    let response = orchestrator
        .send(&RequestSpec::new("GET", "https://api.example.com/admin"))
        .await
        .unwrap();

    // Intentionally denied, not a transport failure
    assert_eq!(response.status, 403);
    assert_eq!(network.calls(), 0);

    let log = interceptor.traffic_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].matched_rule.as_deref(), Some("deny admin"));
}

#[tokio::test]
async fn test_stop_restores_direct_network_access() {
    let (network, stack, interceptor, orchestrator) = pipeline(200);
    interceptor
        .add_route(MockRoute::new("/users/*", 200, "{}"))
        .await;

    // Mocked while installed
    let response = orchestrator
        .send(&RequestSpec::new("GET", "https://api.example.com/users/1"))
        .await
        .unwrap();
    assert!(response.is_mock);

    // Real network again after stop
    interceptor.stop(&stack);
    let response = orchestrator
        .send(&RequestSpec::new("GET", "https://api.example.com/users/1"))
        .await
        .unwrap();
    assert!(!response.is_mock);
    assert_eq!(network.calls(), 1);
}

#[tokio::test]
async fn test_load_test_runs_through_interceptor() {
    let (network, stack, interceptor, _orchestrator) = pipeline(200);
    interceptor
        .add_route(MockRoute::new("/health", 200, r#"{"ok":true}"#))
        .await;

    let driver = LoadTestDriver::new(stack);
    let mut rx = driver.run(LoadTestConfig::against(10, "https://api.example.com/health"));

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }

    // Every iteration was answered by the mock route, never the network
    assert_eq!(updates.len(), 10);
    assert!(updates.iter().all(|u| u.result.status == 200));
    assert_eq!(network.calls(), 0);
    assert_eq!(updates.last().unwrap().stats.completed, 10);
    assert_eq!(interceptor.stats().mocked, 10);
}

#[tokio::test]
async fn test_breaker_shared_across_sends() {
    let _ = tracing_subscriber::fmt::try_init();

    struct DeadNetwork;

    #[async_trait]
    impl Transport for DeadNetwork {
        async fn dispatch(&self, _request: &RequestData) -> EngineResult<ResponseData> {
            Err(EngineError::network("connection refused"))
        }
    }

    let stack = Arc::new(TransportStack::new(Arc::new(DeadNetwork)));
    let breaker = CircuitBreaker::new();
    let orchestrator = RequestOrchestrator::new(stack).with_breaker(breaker.clone());
    orchestrator
        .set_policy(RetryPolicy::new(2, 0).with_circuit_breaker())
        .await;

    let spec = RequestSpec::new("GET", "https://down.example.com/");
    let err = orchestrator.send(&spec).await.unwrap_err();
    assert!(matches!(err, EngineError::Network { .. }));
    assert!(breaker.is_paused());

    // Any later send fails fast until the breaker is reset
    let err = orchestrator.send(&spec).await.unwrap_err();
    assert!(matches!(err, EngineError::CircuitOpen));

    breaker.reset();
    let err = orchestrator.send(&spec).await.unwrap_err();
    assert!(matches!(err, EngineError::Network { .. }));
}
