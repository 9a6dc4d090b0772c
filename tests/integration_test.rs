//! Integration tests for Switchyard
//!
//! These tests drive the full stack against local HTTP servers:
//! - switchyard-llm: registry, HTTP executor, quota, orchestrator, cost sink
//! - switchyard-core: in-process coordination store, retries, circuit breaker

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use switchyard_core::{CircuitBreakerConfig, CircuitState, FixedJitter, MemoryStore, RetryConfig};
use switchyard_llm::{
    CompletionRequest, CostTracker, Error, ErrorKind, HttpExecutor, Message, Orchestrator,
    PricingTable, ProviderConfig, ProviderKind, ProviderRegistry, QuotaManager,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "sk-test-0123456789";

// ============================================================================
// Helpers
// ============================================================================

fn provider(id: &str, server: &MockServer, attempts: u32) -> ProviderConfig {
    ProviderConfig::new(id, ProviderKind::OpenaiCompatible, KEY)
        .with_base_url(format!("{}/v1", server.uri()))
        .with_model("test-model")
        .with_pricing(1.0, 2.0)
        .with_timeout(Duration::from_secs(2))
        .with_retry(
            RetryConfig::default()
                .with_max_attempts(attempts)
                .with_base_delay(Duration::from_millis(10))
                .with_jitter(false),
        )
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "model": "test-model",
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150 }
    })
}

async fn mount_ok(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", format!("Bearer {KEY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(content)))
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(status).set_body_json(json!({ "error": { "message": "nope" } })),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn router(
    configs: Vec<ProviderConfig>,
    circuit: CircuitBreakerConfig,
) -> (Orchestrator, Arc<CostTracker>) {
    let costs = Arc::new(CostTracker::new());
    let quota = Arc::new(
        QuotaManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(PricingTable::with_defaults()),
        )
        .with_sink(costs.clone()),
    );
    let orchestrator = Orchestrator::new(
        ProviderRegistry::new(configs).unwrap(),
        Arc::new(HttpExecutor::new().unwrap()),
        quota,
    )
    .with_circuit_config(circuit)
    .with_jitter(Arc::new(FixedJitter(1.0)));
    (orchestrator, costs)
}

fn request() -> CompletionRequest {
    CompletionRequest::new(vec![Message::system("Be brief"), Message::user("Hello")])
}

// ============================================================================
// Fallback
// ============================================================================

#[tokio::test]
async fn test_falls_back_after_retrying_unavailable_provider() {
    let down = MockServer::start().await;
    let up = MockServer::start().await;
    mount_status(&down, 503, 2).await;
    mount_ok(&up, "hi from p2").await;

    let (router, costs) = router(
        vec![provider("p1", &down, 2), provider("p2", &up, 2)],
        CircuitBreakerConfig::default(),
    );

    let routed = router.send_with_fallback(&request(), None).await.unwrap();
    assert_eq!(routed.used_provider, "p2");
    assert_eq!(routed.response.content, "hi from p2");
    assert_eq!(routed.response.usage.total_tokens, 150);

    // 100 input and 50 output tokens at 1.0 / 2.0 per 1K
    let records = costs.recent(10);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider, "p2");
    assert!((records[0].cost - 0.2).abs() < 1e-9);

    let stats = router.stats();
    assert_eq!(stats["p1"].failed_requests, 2);
    assert_eq!(stats["p1"].last_error.as_ref().unwrap().kind, ErrorKind::ServiceUnavailable);
    assert_eq!(stats["p2"].successful_requests, 1);

    let p2 = router.quota().quota_status_for("p2").await.unwrap();
    assert!((p2.daily_used - 0.2).abs() < 1e-9);
    assert_eq!(p2.requests_this_minute, 1);
    let p1 = router.quota().quota_status_for("p1").await.unwrap();
    assert_eq!(p1.daily_used, 0.0);
    assert_eq!(p1.requests_this_minute, 2);
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let rejected = MockServer::start().await;
    let up = MockServer::start().await;
    mount_status(&rejected, 401, 1).await;
    mount_ok(&up, "ok").await;

    let (router, _) = router(
        vec![provider("p1", &rejected, 3), provider("p2", &up, 3)],
        CircuitBreakerConfig::default(),
    );

    let routed = router.send_with_fallback(&request(), Some("p1")).await.unwrap();
    assert_eq!(routed.used_provider, "p2");
    let stats = router.stats();
    let p1 = &stats["p1"];
    assert_eq!(p1.failed_requests, 1);
    assert_eq!(p1.last_error.as_ref().unwrap().status, Some(401));
}

#[tokio::test]
async fn test_exhaustion_returns_last_error() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    mount_status(&first, 503, 1).await;
    mount_status(&second, 400, 1).await;

    let (router, costs) = router(
        vec![provider("p1", &first, 1), provider("p2", &second, 1)],
        CircuitBreakerConfig::default(),
    );

    let err = router.send_with_fallback(&request(), None).await.unwrap_err();
    let Error::Provider(err) = err else {
        panic!("expected provider error, got {err:?}");
    };
    assert_eq!(err.provider, "p2");
    assert_eq!(err.kind, ErrorKind::InvalidRequest);
    assert_eq!(err.message, "nope");
    assert!(costs.recent(10).is_empty());
}

// ============================================================================
// Circuit breaking
// ============================================================================

#[tokio::test]
async fn test_open_circuit_skips_provider_until_reset() {
    let flaky = MockServer::start().await;
    let up = MockServer::start().await;
    mount_status(&flaky, 500, 1).await;
    mount_ok(&up, "ok").await;

    let (router, _) = router(
        vec![provider("p1", &flaky, 1), provider("p2", &up, 1)],
        CircuitBreakerConfig::default()
            .with_failure_threshold(1)
            .with_cooldown(Duration::from_secs(60)),
    );

    let first = router.send_with_fallback(&request(), Some("p1")).await.unwrap();
    assert_eq!(first.used_provider, "p2");
    assert_eq!(router.circuit_states()["p1"].state, CircuitState::Open);

    // p1 is preferred but its circuit is open; the server sees no second call
    let second = router.send_with_fallback(&request(), Some("p1")).await.unwrap();
    assert_eq!(second.used_provider, "p2");
    assert_eq!(router.stats()["p1"].total_requests, 1);

    router.reset_circuit("p1").unwrap();
    assert_eq!(router.circuit_states()["p1"].state, CircuitState::Closed);
}

// ============================================================================
// Quota
// ============================================================================

#[tokio::test]
async fn test_request_window_moves_traffic_to_next_provider() {
    let limited = MockServer::start().await;
    let up = MockServer::start().await;
    mount_ok(&limited, "from p1").await;
    mount_ok(&up, "from p2").await;

    let mut p1 = provider("p1", &limited, 1);
    p1.quota.requests_per_minute = 1;
    let (router, costs) = router(
        vec![p1, provider("p2", &up, 1)],
        CircuitBreakerConfig::default(),
    );

    let first = router.send_with_fallback(&request(), Some("p1")).await.unwrap();
    assert_eq!(first.used_provider, "p1");
    let second = router.send_with_fallback(&request(), Some("p1")).await.unwrap();
    assert_eq!(second.used_provider, "p2");

    let usage = costs.get_stats(None);
    assert_eq!(usage.total_requests, 2);
    assert_eq!(usage.by_provider.len(), 2);
}
