//! Behavior-driven tests for retry, deadline and circuit handling.
//!
//! Time is paused in every async test so backoff sleeps and slow scripted
//! replies complete instantly while still being measurable.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use sisbridge_core::circuit_breaker::CircuitState;
use sisbridge_core::{
    ApiVersion, BridgeError, CircuitBreakerConfig, EntityType, HealthState, Mode, Provenance,
    RequestDescriptor, RetryError, RetryExecutor, RetryPolicy, UpstreamError, UpstreamErrorKind,
};

use sisbridge_tests::{
    config, controller, fast_retry, integrations_body, learners_body, ScriptedHttpClient, Step,
    INTEGRATIONS, LEARNERS,
};

fn learners(scope: &str) -> RequestDescriptor {
    RequestDescriptor::new(EntityType::Learners, scope).expect("valid descriptor")
}

// =============================================================================
// Attempt bounds
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_every_attempt_is_transient_the_executor_stops_at_max_attempts() {
    // Given: An executor allowing four attempts and an always-failing operation
    let executor = RetryExecutor::new(fast_retry(4));
    let calls = AtomicU32::new(0);

    // When: The operation runs
    let result: Result<(), RetryError> = executor
        .execute(None, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(UpstreamError::from_status(503, "unavailable")) }
        })
        .await;

    // Then: It was tried exactly four times
    let error = result.expect_err("must exhaust");
    assert!(matches!(error, RetryError::Exhausted { attempts: 4, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn when_upstream_rejects_the_request_it_is_attempted_exactly_once() {
    for (status, kind) in [
        (404, UpstreamErrorKind::NotFound),
        (401, UpstreamErrorKind::Unauthorized),
        (429, UpstreamErrorKind::RateLimited),
    ] {
        // Given: A learners endpoint answering a non-transient status
        let http = ScriptedHttpClient::new()
            .on(INTEGRATIONS, [Step::json(integrations_body())])
            .on(LEARNERS, [Step::status(status, "")]);
        let controller = controller(config(Mode::Live), &http);

        // When: Learners are fetched
        let error = controller
            .fetch(&learners("1001"))
            .await
            .expect_err("terminal status fails");

        // Then: The request is not retried and the kind is preserved
        assert_eq!(http.calls(LEARNERS), 1, "status {status} must not be retried");
        assert_eq!(error.status(), Some(status));
        assert_eq!(error.upstream_error().map(UpstreamError::kind), Some(kind));
        let BridgeError::FallbackExhausted { source, .. } = &error else {
            panic!("expected FallbackExhausted, got {error:?}");
        };
        assert!(matches!(source, RetryError::Terminal { attempts: 1, .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn when_upstream_recovers_within_the_attempt_budget_the_fetch_succeeds() {
    // Given: A connection failure followed by a good answer
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::connect_error(), Step::json(learners_body())]);
    let controller = controller(config(Mode::Live), &http);

    // When: Learners are fetched
    let outcome = controller.fetch(&learners("1001")).await.expect("recovers");

    // Then: Live data is served and the endpoint is healthy again
    assert_eq!(outcome.provenance, Provenance::Live);
    assert_eq!(http.calls(LEARNERS), 2);
    let report = controller.health();
    assert_eq!(report.per_version[&ApiVersion::V2].status, HealthState::Healthy);
}

// =============================================================================
// Backoff and deadlines
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_retrying_delays_double_and_stop_at_the_cap() {
    // Given: A 100ms base delay capped at 250ms
    let executor = RetryExecutor::new(RetryPolicy {
        max_delay: Duration::from_millis(250),
        ..fast_retry(4)
    });
    let attempts_at = Mutex::new(Vec::new());

    // When: Every attempt fails transiently
    let _ = executor
        .execute(None, |_| {
            attempts_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Instant::now());
            async { Err::<(), _>(UpstreamError::timeout("slow")) }
        })
        .await;

    // Then: The gaps between attempts are 100ms, 200ms and 250ms
    let attempts_at = attempts_at.into_inner().unwrap_or_else(PoisonError::into_inner);
    let gaps: Vec<u128> = attempts_at
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis())
        .collect();
    assert_eq!(gaps.len(), 3);
    for (gap, expected) in gaps.iter().zip([100_u128, 200, 250]) {
        assert!(
            (expected..expected + 5).contains(gap),
            "gap {gap}ms, expected about {expected}ms"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn when_the_next_backoff_would_cross_the_deadline_the_executor_gives_up_early() {
    // Given: A deadline 250ms away and a 100ms base backoff
    let executor = RetryExecutor::new(fast_retry(5));
    let started = Instant::now();
    let deadline = started + Duration::from_millis(250);

    // When: Every attempt fails instantly
    let result: Result<(), RetryError> = executor
        .execute(Some(deadline), |_| async {
            Err(UpstreamError::from_status(502, "bad gateway"))
        })
        .await;

    // Then: The executor stops after the second attempt without sleeping past the deadline
    let error = result.expect_err("deadline");
    assert!(error.is_deadline());
    assert_eq!(error.attempts(), 2);
    assert_eq!(error.status(), Some(502));
    assert!(started.elapsed() <= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn when_the_deadline_is_near_the_attempt_timeout_is_clipped_to_it() {
    // Given: A 2s per-attempt timeout but only 500ms left until the deadline
    let executor = RetryExecutor::new(fast_retry(3));
    let started = Instant::now();
    let deadline = started + Duration::from_millis(500);
    let seen_timeout = Mutex::new(None);

    // When: The attempt hangs
    let result: Result<(), RetryError> = executor
        .execute(Some(deadline), |context| {
            *seen_timeout.lock().unwrap_or_else(PoisonError::into_inner) = Some(context.timeout);
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        })
        .await;

    // Then: The attempt was given the remaining 500ms and the call ends at the deadline
    assert_eq!(
        seen_timeout.into_inner().unwrap_or_else(PoisonError::into_inner),
        Some(Duration::from_millis(500))
    );
    let error = result.expect_err("deadline");
    assert!(matches!(
        error,
        RetryError::DeadlineExceeded { attempts: 1, .. }
    ));
    assert_eq!(error.kind(), Some(UpstreamErrorKind::Timeout));
    assert!(started.elapsed() < Duration::from_millis(510));
}

#[tokio::test(start_paused = true)]
async fn when_a_hybrid_request_runs_out_of_time_no_fallback_is_served() {
    // Given: A hybrid controller whose learners endpoint hangs
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(
            LEARNERS,
            [Step::json(learners_body()).after(Duration::from_secs(10))],
        );
    let controller = controller(config(Mode::Hybrid), &http);
    let started = Instant::now();

    // When: Learners are fetched with a 300ms deadline
    let error = controller
        .fetch_with_deadline(
            &learners("1001"),
            Some(started + Duration::from_millis(300)),
        )
        .await
        .expect_err("deadline is not a fallback trigger");

    // Then: The caller sees the deadline rather than synthetic data
    assert_eq!(error.code(), "deadline_exceeded");
    assert!(matches!(error, BridgeError::DeadlineExceeded { attempts: 1, .. }));
    assert!(started.elapsed() < Duration::from_millis(310));
}

#[tokio::test(start_paused = true)]
async fn when_the_deadline_has_already_passed_nothing_is_attempted() {
    // Given: A live controller and a deadline in the past
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::json(learners_body())]);
    let controller = controller(config(Mode::Live), &http);
    let deadline = Instant::now();
    tokio::time::sleep(Duration::from_millis(1)).await;

    // When: Learners are fetched
    let error = controller
        .fetch_with_deadline(&learners("1001"), Some(deadline))
        .await
        .expect_err("expired");

    // Then: No upstream call was made
    assert!(matches!(
        error,
        BridgeError::DeadlineExceeded { attempts: 0, last: None }
    ));
    assert_eq!(http.total_calls(), 0);
}

// =============================================================================
// Circuit breaking
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_the_circuit_opens_hybrid_requests_skip_the_live_path() {
    // Given: A hybrid controller whose V2 breaker opens after two failures
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::status(500, "")]);
    let mut config = config(Mode::Hybrid);
    config.circuit = CircuitBreakerConfig {
        failure_threshold: 2,
        open_timeout: Duration::from_secs(300),
    };
    let controller = controller(config, &http);

    // When: A first fetch trips the breaker
    let first = controller.fetch(&learners("1001")).await.expect("fallback");

    // Then: The third attempt was refused by the open circuit
    assert_eq!(first.provenance, Provenance::SyntheticFallback);
    assert_eq!(http.calls(LEARNERS), 2);
    assert_eq!(
        first.fallback_cause.as_ref().and_then(RetryError::kind),
        Some(UpstreamErrorKind::CircuitOpen)
    );
    assert_eq!(controller.upstream().circuit_state(ApiVersion::V2), CircuitState::Open);

    // When: Another V2 entity is requested
    let staff = RequestDescriptor::new(EntityType::Staff, "1001").expect("valid");
    let second = controller.fetch(&staff).await.expect("fallback");

    // Then: It is served from synthetic data without touching the upstream
    assert_eq!(second.provenance, Provenance::SyntheticFallback);
    let cause = second.fallback_cause.expect("cause");
    assert_eq!(cause.attempts(), 0);
    assert_eq!(http.calls("schooldata/staff"), 0);

    // Then: Health shows V2 unhealthy while synthetic data keeps hybrid serving
    let report = controller.health();
    assert_eq!(report.per_version[&ApiVersion::V2].status, HealthState::Unhealthy);
    assert_eq!(report.per_version[&ApiVersion::V1].status, HealthState::Healthy);
    assert_eq!(report.overall_status, HealthState::Degraded);
}

#[tokio::test(start_paused = true)]
async fn when_live_circuits_are_open_status_reports_live_unavailable() {
    // Given: A live controller with a threshold of one failure
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::status(503, "")])
        .on(LEARNERS, [Step::status(503, "")]);
    let mut config = config(Mode::Live);
    config.circuit.failure_threshold = 1;
    let controller = controller(config, &http);

    // When: V1 (resolution) fails and the circuit opens
    let error = controller.fetch(&learners("1001")).await.expect_err("fails");

    // Then: The V1 breaker is open and live mode cannot serve
    assert_eq!(error.code(), "fallback_exhausted");
    assert_eq!(controller.upstream().circuit_state(ApiVersion::V1), CircuitState::Open);
    assert_eq!(http.calls(LEARNERS), 0);
    let report = controller.health();
    assert_eq!(report.per_version[&ApiVersion::V1].status, HealthState::Unhealthy);
}
