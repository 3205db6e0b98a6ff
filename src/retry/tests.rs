use super::*;
use crate::circuit_breaker::CircuitState;
use crate::classifier::ApiErrorType;
use proptest::prelude::*;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

fn server_failure() -> RawFailure {
    RawFailure::Status {
        status: 503,
        body: None,
    }
}

fn retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1000,
        max_delay_ms: 30_000,
        backoff_multiplier: 2.0,
        timeout_ms: 0,
        retryable_errors: HashSet::from([
            ApiErrorType::Network,
            ApiErrorType::Timeout,
            ApiErrorType::Server,
        ]),
        jitter: 0.5,
    }
}

fn breaker_config(threshold: u32) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        enabled: true,
        failure_threshold: threshold,
        cool_down_ms: 60_000,
        half_open_probes: 1,
    }
}

fn controller() -> RetryController {
    RetryController::new(retry_config(), breaker_config(100))
}

/// Operation that fails `failures` times with `raw`, then returns `"ok"`.
fn flaky(
    failures: u32,
    raw: RawFailure,
    calls: Arc<AtomicU32>,
) -> impl FnMut() -> Pin<Box<dyn Future<Output = Result<&'static str, RawFailure>> + Send>> {
    move || {
        let calls = calls.clone();
        let raw = raw.clone();
        Box::pin(async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures { Err(raw) } else { Ok("ok") }
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_attempt_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let result = controller()
        .execute_with_retry("listings", flaky(0, server_failure(), calls.clone()), None)
        .await;
    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_success_after_failures_stops_retrying() {
    for failures in 0..3 {
        let calls = Arc::new(AtomicU32::new(0));
        let report = controller()
            .execute_with_report(
                "listings",
                flaky(failures, server_failure(), calls.clone()),
                None,
            )
            .await;
        assert_eq!(report.result.unwrap(), "ok");
        assert_eq!(report.attempts, failures + 1);
        assert!(!report.circuit_open);
        assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_runs_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let raw = RawFailure::Status {
        status: 422,
        body: Some("bad pickup date".into()),
    };
    let err = controller()
        .execute_with_retry("bookings", flaky(10, raw, calls.clone()), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), ApiErrorType::Validation);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_three_server_failures_with_backoff() {
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let recorder = stamps.clone();
    let operation = move || {
        let recorder = recorder.clone();
        async move {
            recorder.lock().unwrap().push(Instant::now());
            Err::<(), _>(server_failure())
        }
    };

    let err = controller()
        .execute_with_retry("companies", operation, None)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), ApiErrorType::Server);
    assert_eq!(err.status_code(), Some(503));

    let stamps = stamps.lock().unwrap();
    assert_eq!(stamps.len(), 3);
    let first_gap = stamps[1] - stamps[0];
    let second_gap = stamps[2] - stamps[1];
    assert!(first_gap >= Duration::from_millis(500) && first_gap <= Duration::from_millis(1500));
    assert!(second_gap >= Duration::from_millis(1000) && second_gap <= Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_synthesized() {
    let config = RetryConfig {
        max_attempts: 1,
        timeout_ms: 100,
        ..retry_config()
    };
    let operation = || async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, RawFailure>("late")
    };
    let err = controller()
        .execute_with_retry("ratings", operation, Some(&config))
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), ApiErrorType::Timeout);
    assert_eq!(err.message(), "Operation timed out after 100ms");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_success_is_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let config = RetryConfig {
        timeout_ms: 100,
        jitter: 0.0,
        ..retry_config()
    };
    let operation = move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Ok::<_, RawFailure>(7)
        }
    };
    let result = controller()
        .execute_with_retry("ratings", operation, Some(&config))
        .await;
    assert_eq!(result.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_fails_fast() {
    let controller = RetryController::new(
        RetryConfig {
            max_attempts: 1,
            ..retry_config()
        },
        breaker_config(5),
    );
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..5 {
        let _ = controller
            .execute_with_retry("X", flaky(100, server_failure(), calls.clone()), None)
            .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    let state = controller.circuit_breaker_state("X").unwrap();
    assert_eq!(state.state, CircuitState::Open);
    assert_eq!(state.failure_count, 5);

    let report = controller
        .execute_with_report("X", flaky(0, server_failure(), calls.clone()), None)
        .await;
    assert_eq!(report.attempts, 0);
    assert!(report.circuit_open);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(report.result.unwrap_err().error_type(), ApiErrorType::Server);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_opening_mid_loop_stops_retries() {
    let controller = RetryController::new(retry_config(), breaker_config(2));
    let calls = Arc::new(AtomicU32::new(0));
    let report = controller
        .execute_with_report("X", flaky(100, server_failure(), calls.clone()), None)
        .await;
    assert_eq!(report.attempts, 2);
    assert!(report.circuit_open);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(report.result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_circuit() {
    let controller = RetryController::new(retry_config(), breaker_config(10));
    let calls = Arc::new(AtomicU32::new(0));
    controller
        .execute_with_retry("X", flaky(2, server_failure(), calls), None)
        .await
        .unwrap();
    let state = controller.circuit_breaker_state("X").unwrap();
    assert_eq!(state.state, CircuitState::Closed);
    assert_eq!(state.failure_count, 0);
}

#[test]
fn test_should_retry() {
    let controller = controller();
    let server = classify(server_failure());
    let auth = classify(RawFailure::Status {
        status: 401,
        body: None,
    });
    assert!(controller.should_retry(&server, 0));
    assert!(controller.should_retry(&server, 1));
    assert!(!controller.should_retry(&server, 2));
    assert!(!controller.should_retry(&auth, 0));
}

#[test]
fn test_base_delay_sequence() {
    let config = retry_config();
    assert_eq!(base_delay(1, &config), Duration::from_millis(1000));
    assert_eq!(base_delay(2, &config), Duration::from_millis(2000));
    assert_eq!(base_delay(3, &config), Duration::from_millis(4000));
    assert_eq!(base_delay(6, &config), Duration::from_millis(30_000));
    assert_eq!(base_delay(u32::MAX, &config), Duration::from_millis(30_000));
}

#[test]
fn test_delay_without_jitter_hits_max_exactly() {
    let config = RetryConfig {
        jitter: 0.0,
        ..retry_config()
    };
    assert_eq!(calculate_delay(2, &config), Duration::from_millis(2000));
    assert_eq!(calculate_delay(10, &config), Duration::from_millis(30_000));
}

proptest! {
    #[test]
    fn prop_delay_within_bounds(
        attempt in 1u32..64,
        base in 0u64..5_000,
        extra in 0u64..60_000,
        multiplier in 1.01f64..4.0,
        jitter in 0.0f64..=1.0,
    ) {
        let config = RetryConfig {
            base_delay_ms: base,
            max_delay_ms: base + extra,
            backoff_multiplier: multiplier,
            jitter,
            ..retry_config()
        };
        let delay = calculate_delay(attempt, &config);
        prop_assert!(delay <= Duration::from_millis(config.max_delay_ms));
    }

    #[test]
    fn prop_base_delay_non_decreasing(attempt in 1u32..40, multiplier in 1.01f64..4.0) {
        let config = RetryConfig {
            backoff_multiplier: multiplier,
            ..retry_config()
        };
        prop_assert!(base_delay(attempt, &config) <= base_delay(attempt + 1, &config));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_on_one_key_are_all_counted() {
    const CONCURRENT: usize = 9;
    let controller = Arc::new(RetryController::new(
        RetryConfig {
            max_attempts: 1,
            ..retry_config()
        },
        breaker_config(10),
    ));
    // Every task holds its permit until all of them are in flight.
    let barrier = Arc::new(tokio::sync::Barrier::new(CONCURRENT));

    let mut tasks = Vec::new();
    for _ in 0..CONCURRENT {
        let controller = controller.clone();
        let barrier = barrier.clone();
        tasks.push(tokio::spawn(async move {
            controller
                .execute_with_retry(
                    "bookings",
                    move || {
                        let barrier = barrier.clone();
                        async move {
                            barrier.wait().await;
                            Err::<(), _>(server_failure())
                        }
                    },
                    None,
                )
                .await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_err());
    }

    let state = controller.circuit_breaker_state("bookings").unwrap();
    assert_eq!(state.failure_count, CONCURRENT as u32);
    assert_eq!(state.state, CircuitState::Closed);

    let calls = Arc::new(AtomicU32::new(0));
    let _ = controller
        .execute_with_retry("bookings", flaky(100, server_failure(), calls.clone()), None)
        .await;
    let state = controller.circuit_breaker_state("bookings").unwrap();
    assert_eq!(state.state, CircuitState::Open);
    assert_eq!(state.failure_count, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let report = controller
        .execute_with_report("bookings", flaky(0, server_failure(), calls.clone()), None)
        .await;
    assert!(report.circuit_open);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
