use super::*;
use crate::message::Message;
use crate::registry::ProviderKind;
use crate::sink::{ChannelSink, SinkEvent};
use async_trait::async_trait;
use chrono::TimeZone;
use std::sync::atomic::{AtomicBool, Ordering};
use switchyard_core::{CoordinationStore, ManualClock, MemoryStore, WindowDecision};

const KEY: &str = "sk-test-0123456789";
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn start_ms() -> i64 {
    Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
        .unwrap()
        .timestamp_millis()
}

struct Fixture {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    quota: QuotaManager,
}

fn fixture(limit: QuotaLimit) -> Fixture {
    let clock = Arc::new(ManualClock::new(start_ms()));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let quota = QuotaManager::with_clock(
        store.clone(),
        Arc::new(PricingTable::with_defaults()),
        clock.clone(),
    );
    quota.register(&ProviderConfig::new("deepseek", ProviderKind::Deepseek, KEY).with_quota(limit));
    Fixture {
        clock,
        store,
        quota,
    }
}

impl Fixture {
    async fn seed_daily(&self, amount: f64) {
        let key = QuotaManager::daily_key("deepseek", self.quota.now());
        self.store
            .incr_by_float(&key, amount, DAILY_KEY_TTL)
            .await
            .unwrap();
    }

    async fn seed_monthly(&self, amount: f64) {
        let key = QuotaManager::monthly_key("deepseek", self.quota.now());
        self.store
            .incr_by_float(&key, amount, MONTHLY_KEY_TTL)
            .await
            .unwrap();
    }
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_daily_limit_boundary() {
    let fx = fixture(QuotaLimit::new(50.0, 1000.0, 60));
    fx.seed_daily(49.0).await;

    let err = fx.quota.can_make_request("deepseek", 2.0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::QuotaExceeded);
    assert!(!err.retryable);
    assert!(err.message.contains("daily"));

    assert!(fx.quota.can_make_request("deepseek", 1.0).await.is_ok());
}

#[tokio::test]
async fn test_monthly_limit() {
    let fx = fixture(QuotaLimit::new(50.0, 100.0, 60));
    fx.seed_monthly(99.5).await;

    let err = fx.quota.can_make_request("deepseek", 1.0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::QuotaExceeded);
    assert!(err.message.contains("monthly"));
}

#[tokio::test]
async fn test_rate_window_full() {
    let fx = fixture(QuotaLimit::new(50.0, 1000.0, 3));

    for _ in 0..3 {
        assert!(fx.quota.can_make_request("deepseek", 0.0).await.is_ok());
    }
    let err = fx.quota.can_make_request("deepseek", 0.0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimit);
    assert_eq!(err.retry_after, Some(RATE_WINDOW));

    fx.clock.advance(61_000);
    assert!(fx.quota.can_make_request("deepseek", 0.0).await.is_ok());
}

#[tokio::test]
async fn test_spend_rejection_does_not_consume_window() {
    let fx = fixture(QuotaLimit::new(1.0, 1000.0, 5));
    assert!(fx.quota.can_make_request("deepseek", 5.0).await.is_err());

    let status = fx.quota.quota_status_for("deepseek").await.unwrap();
    assert_eq!(status.requests_this_minute, 0);
}

#[tokio::test]
async fn test_retry_attempts_count_against_window() {
    let fx = fixture(QuotaLimit::new(50.0, 1000.0, 2));
    assert!(fx.quota.can_make_request("deepseek", 0.0).await.is_ok());
    fx.quota.record_attempt("deepseek").await;

    let err = fx.quota.can_make_request("deepseek", 0.0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimit);
}

#[tokio::test]
async fn test_disabled_limits_admit_everything() {
    let mut limit = QuotaLimit::new(1.0, 1.0, 1);
    limit.enabled = false;
    let fx = fixture(limit);
    fx.seed_daily(10.0).await;

    for _ in 0..5 {
        assert!(fx.quota.can_make_request("deepseek", 100.0).await.is_ok());
    }
}

#[tokio::test]
async fn test_unregistered_provider_uses_default_limits() {
    let fx = fixture(QuotaLimit::default());
    assert_eq!(fx.quota.limit("ghost"), QuotaLimit::default());
    assert!(fx.quota.can_make_request("ghost", 1.0).await.is_ok());
}

// ============================================================================
// Usage
// ============================================================================

#[tokio::test]
async fn test_record_usage_adds_spend_and_emits() {
    let (sink, mut rx) = ChannelSink::new();
    let fx = fixture(QuotaLimit::new(50.0, 1000.0, 60));
    let quota = fx.quota.with_sink(Arc::new(sink));

    let usage = TokenUsage {
        prompt_tokens: 1000,
        completion_tokens: 1000,
        total_tokens: 2000,
    };
    let cost = quota
        .record_usage("deepseek", "deepseek-chat", usage, Duration::from_millis(250), true)
        .await;
    assert!((cost - 0.0042).abs() < 1e-9);

    let status = quota.quota_status_for("deepseek").await.unwrap();
    assert!((status.daily_used - 0.0042).abs() < 1e-9);
    assert!((status.monthly_used - 0.0042).abs() < 1e-9);

    match rx.try_recv() {
        Ok(SinkEvent::Cost(record)) => {
            assert_eq!(record.provider, "deepseek");
            assert_eq!(record.input_tokens, 1000);
            assert_eq!(record.latency_ms, 250);
            assert!(record.success);
            assert_eq!(record.timestamp.timestamp_millis(), start_ms());
        }
        other => panic!("expected cost record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_usage_is_not_billed() {
    let (sink, mut rx) = ChannelSink::new();
    let fx = fixture(QuotaLimit::default());
    let quota = fx.quota.with_sink(Arc::new(sink));

    let usage = TokenUsage {
        prompt_tokens: 500,
        completion_tokens: 0,
        total_tokens: 500,
    };
    let cost = quota
        .record_usage("deepseek", "deepseek-chat", usage, Duration::from_millis(10), false)
        .await;
    assert_eq!(cost, 0.0);
    assert!(rx.try_recv().is_err());
    assert_eq!(quota.quota_status_for("deepseek").await.unwrap().daily_used, 0.0);
}

#[tokio::test]
async fn test_daily_spend_rolls_over() {
    let fx = fixture(QuotaLimit::new(50.0, 1000.0, 60));
    fx.seed_daily(49.0).await;
    fx.seed_monthly(49.0).await;
    assert!(fx.quota.can_make_request("deepseek", 2.0).await.is_err());

    fx.clock.advance(DAY_MS);
    assert!(fx.quota.can_make_request("deepseek", 2.0).await.is_ok());

    let status = fx.quota.quota_status_for("deepseek").await.unwrap();
    assert_eq!(status.daily_used, 0.0);
    assert_eq!(status.monthly_used, 49.0);
}

#[test]
fn test_estimate_cost_uses_output_allowance() {
    let fx = fixture(QuotaLimit::default());
    let config = ProviderConfig::new("deepseek", ProviderKind::Deepseek, KEY);
    let request = CompletionRequest::new(vec![Message::user("hello")]).with_max_tokens(1000);

    let estimate = fx.quota.estimate_cost(&config, &request);
    // 1000 output tokens alone cost 0.0028
    assert!(estimate > 0.0028);
    assert!(estimate < 0.0029);
}

#[test]
fn test_register_prices_custom_model() {
    let fx = fixture(QuotaLimit::default());
    let config = ProviderConfig::new("local", ProviderKind::OpenaiCompatible, KEY)
        .with_base_url("http://localhost:8080/v1")
        .with_model("llama3")
        .with_pricing(0.5, 1.0);
    fx.quota.register(&config);

    let cost = fx.quota.calculate_cost("local", "llama3", 2000, 1000);
    assert!((cost - 2.0).abs() < 1e-9);
    assert_eq!(fx.quota.calculate_cost("local", "unknown-model", 1000, 1000), 0.0);
}

// ============================================================================
// Status & limits
// ============================================================================

#[tokio::test]
async fn test_quota_status_levels() {
    let fx = fixture(QuotaLimit::new(50.0, 1000.0, 60));

    let status = fx.quota.quota_status_for("deepseek").await.unwrap();
    assert_eq!(status.level, QuotaLevel::Normal);

    fx.seed_daily(40.0).await;
    let status = fx.quota.quota_status_for("deepseek").await.unwrap();
    assert_eq!(status.level, QuotaLevel::Warning);
    assert!((status.daily_remaining - 10.0).abs() < 1e-9);

    fx.seed_daily(20.0).await;
    let status = fx.quota.quota_status_for("deepseek").await.unwrap();
    assert_eq!(status.level, QuotaLevel::Critical);
    assert_eq!(status.daily_remaining, 0.0);
}

#[tokio::test]
async fn test_quota_status_lists_registered() {
    let fx = fixture(QuotaLimit::default());
    fx.quota
        .register(&ProviderConfig::new("ali", ProviderKind::Ali, KEY));

    let all = fx.quota.quota_status().await.unwrap();
    let ids: Vec<&str> = all.iter().map(|s| s.provider.as_str()).collect();
    assert_eq!(ids, vec!["ali", "deepseek"]);
    assert_eq!(all[0].requests_per_minute, 40);
}

#[tokio::test]
async fn test_set_quota_limit() {
    let fx = fixture(QuotaLimit::new(50.0, 1000.0, 60));
    fx.seed_daily(10.0).await;

    let updated = fx.quota.set_quota_limit(
        "deepseek",
        &QuotaLimitPatch {
            daily_limit: Some(10.5),
            ..Default::default()
        },
    );
    assert_eq!(updated.daily_limit, 10.5);
    assert_eq!(updated.monthly_limit, 1000.0);
    assert!(fx.quota.can_make_request("deepseek", 1.0).await.is_err());
}

#[test]
fn test_level_thresholds() {
    assert_eq!(QuotaLevel::from_ratios(0.7, 0.0), QuotaLevel::Normal);
    assert_eq!(QuotaLevel::from_ratios(0.71, 0.0), QuotaLevel::Warning);
    assert_eq!(QuotaLevel::from_ratios(0.0, 0.91), QuotaLevel::Critical);
    assert_eq!(QuotaLevel::Critical.to_string(), "critical");
}

// ============================================================================
// Store failures
// ============================================================================

/// Memory store that fails every call while switched off
#[derive(Default)]
struct SwitchableStore {
    down: AtomicBool,
    inner: MemoryStore,
}

impl SwitchableStore {
    fn down() -> Self {
        let store = Self::default();
        store.set_down(true);
        store
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> switchyard_core::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(switchyard_core::Error::Store("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CoordinationStore for SwitchableStore {
    fn backend(&self) -> &'static str {
        "switchable"
    }
    async fn get(&self, key: &str) -> switchyard_core::Result<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> switchyard_core::Result<()> {
        self.check()?;
        self.inner.set_ex(key, value, ttl).await
    }
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> switchyard_core::Result<bool> {
        self.check()?;
        self.inner.set_nx_ex(key, value, ttl).await
    }
    async fn incr_by_float(&self, key: &str, delta: f64, ttl: Duration) -> switchyard_core::Result<f64> {
        self.check()?;
        self.inner.incr_by_float(key, delta, ttl).await
    }
    async fn sliding_window(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> switchyard_core::Result<WindowDecision> {
        self.check()?;
        self.inner.sliding_window(key, limit, window, now_ms).await
    }
    async fn window_record(&self, key: &str, window: Duration, now_ms: i64) -> switchyard_core::Result<()> {
        self.check()?;
        self.inner.window_record(key, window, now_ms).await
    }
    async fn window_count(&self, key: &str, window: Duration, now_ms: i64) -> switchyard_core::Result<u32> {
        self.check()?;
        self.inner.window_count(key, window, now_ms).await
    }
    async fn compare_and_delete(&self, key: &str, expected: &str) -> switchyard_core::Result<bool> {
        self.check()?;
        self.inner.compare_and_delete(key, expected).await
    }
    async fn delete(&self, key: &str) -> switchyard_core::Result<bool> {
        self.check()?;
        self.inner.delete(key).await
    }
    async fn ping(&self) -> switchyard_core::Result<()> {
        self.check()?;
        self.inner.ping().await
    }
}

fn deepseek_quota(store: Arc<SwitchableStore>) -> QuotaManager {
    let quota = QuotaManager::new(store, Arc::new(PricingTable::with_defaults()));
    quota.register(&ProviderConfig::new("deepseek", ProviderKind::Deepseek, KEY));
    quota
}

#[tokio::test]
async fn test_store_outage_admits_and_surfaces_in_status() {
    let quota = deepseek_quota(Arc::new(SwitchableStore::down()));

    assert!(quota.can_make_request("deepseek", 1.0).await.is_ok());
    assert!(quota.store_degraded());
    quota.record_attempt("deepseek").await;
    let usage = TokenUsage {
        prompt_tokens: 10,
        completion_tokens: 10,
        total_tokens: 20,
    };
    assert!(quota.record_usage("deepseek", "deepseek-chat", usage, Duration::ZERO, true).await > 0.0);
    assert!(quota.quota_status().await.is_err());
}

#[tokio::test]
async fn test_store_outage_rejects_when_failing_closed() {
    let store = Arc::new(SwitchableStore::down());
    let quota = deepseek_quota(store.clone()).with_fail_open(false);

    let err = quota.can_make_request("deepseek", 1.0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    assert!(!err.retryable);
    assert!(quota.store_degraded());

    // admission resumes once the store answers again
    store.set_down(false);
    assert!(quota.can_make_request("deepseek", 1.0).await.is_ok());
    assert!(!quota.store_degraded());
}
