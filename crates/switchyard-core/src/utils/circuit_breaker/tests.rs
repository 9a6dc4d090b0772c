use super::*;
use crate::utils::clock::ManualClock;
use std::sync::Arc;

fn breaker_with_clock() -> (CircuitBreaker, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let cb = CircuitBreaker::with_clock("deepseek", CircuitBreakerConfig::default(), clock.clone());
    (cb, clock)
}

fn trip(cb: &CircuitBreaker) {
    for _ in 0..5 {
        cb.record_failure();
    }
}

#[test]
fn test_circuit_breaker_config_defaults() {
    let config = CircuitBreakerConfig::default();
    assert_eq!(config.failure_threshold, 5);
    assert_eq!(config.cooldown, Duration::from_secs(60));
}

#[test]
fn test_circuit_breaker_config_builder() {
    let config = CircuitBreakerConfig::new()
        .with_failure_threshold(10)
        .with_cooldown(Duration::from_secs(5));
    assert_eq!(config.failure_threshold, 10);
    assert_eq!(config.cooldown, Duration::from_secs(5));

    let floor = CircuitBreakerConfig::new().with_failure_threshold(0);
    assert_eq!(floor.failure_threshold, 1);
}

#[test]
fn test_circuit_breaker_initial_state() {
    let cb = CircuitBreaker::with_defaults("test");
    assert_eq!(cb.state(), CircuitState::Closed);
    assert!(!cb.is_open());
    assert!(cb.try_acquire().is_ok());
    assert_eq!(cb.failure_count(), 0);
}

#[test]
fn test_opens_exactly_on_fifth_failure() {
    let (cb, _clock) = breaker_with_clock();

    for expected in 1..=4 {
        cb.record_failure();
        assert_eq!(cb.failure_count(), expected);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    cb.record_failure();
    assert_eq!(cb.state(), CircuitState::Open);
    assert!(cb.is_open());

    let rejection = cb.try_acquire().unwrap_err();
    assert_eq!(rejection.name, "deepseek");
    assert_eq!(rejection.next_probe_at, Some(1_060_000));
    assert!(!rejection.probe_in_flight);
}

#[test]
fn test_success_resets_failures() {
    let (cb, _clock) = breaker_with_clock();

    for _ in 0..4 {
        cb.record_failure();
    }
    cb.record_success();
    assert_eq!(cb.failure_count(), 0);

    for _ in 0..4 {
        cb.record_failure();
    }
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[test]
fn test_probe_admitted_after_cooldown() {
    let (cb, clock) = breaker_with_clock();
    trip(&cb);

    clock.advance(59_999);
    assert!(cb.try_acquire().is_err());

    clock.advance(1);
    let permit = cb.try_acquire().unwrap();
    assert!(permit.is_probe());
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    // only one probe at a time
    let second = cb.try_acquire().unwrap_err();
    assert!(second.probe_in_flight);
    drop(permit);
}

#[test]
fn test_probe_success_closes() {
    let (cb, clock) = breaker_with_clock();
    trip(&cb);
    clock.advance(60_000);

    let permit = cb.try_acquire().unwrap();
    cb.record_success();
    drop(permit);

    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 0);
    assert!(!cb.try_acquire().unwrap().is_probe());
}

#[test]
fn test_probe_failure_reopens_with_fresh_cooldown() {
    let (cb, clock) = breaker_with_clock();
    trip(&cb);
    clock.advance(60_000);

    let permit = cb.try_acquire().unwrap();
    clock.advance(500);
    cb.record_failure();
    drop(permit);

    assert_eq!(cb.state(), CircuitState::Open);
    let rejection = cb.try_acquire().unwrap_err();
    assert_eq!(rejection.next_probe_at, Some(1_000_000 + 60_000 + 500 + 60_000));
}

#[test]
fn test_abandoned_probe_is_released() {
    let (cb, clock) = breaker_with_clock();
    trip(&cb);
    clock.advance(60_000);

    let permit = cb.try_acquire().unwrap();
    assert!(cb.is_open());
    drop(permit);

    assert_eq!(cb.state(), CircuitState::HalfOpen);
    assert!(!cb.is_open());
    assert!(cb.try_acquire().unwrap().is_probe());
}

#[test]
fn test_snapshot_reports_next_probe() {
    let (cb, _clock) = breaker_with_clock();
    trip(&cb);

    let snap = cb.snapshot();
    assert_eq!(snap.state, CircuitState::Open);
    assert_eq!(snap.consecutive_failures, 5);
    assert_eq!(
        snap.next_probe_at.map(|t| t.timestamp_millis()),
        Some(1_060_000)
    );
}

#[test]
fn test_circuit_breaker_reset() {
    let (cb, _clock) = breaker_with_clock();
    trip(&cb);
    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert!(cb.try_acquire().is_ok());
}

#[test]
fn test_circuit_state_display() {
    assert_eq!(format!("{}", CircuitState::Closed), "closed");
    assert_eq!(format!("{}", CircuitState::Open), "open");
    assert_eq!(format!("{}", CircuitState::HalfOpen), "half_open");
}
