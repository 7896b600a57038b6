//! Behavior-driven tests for mode routing.
//!
//! These tests drive a [`ModeController`] against a scripted transport and
//! check WHICH path served each request, what the caller is told about it,
//! and what the cache and health report remember afterwards.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use sisbridge_core::domain::{conformance_errors, GRADES};
use sisbridge_core::{
    ApiVersion, BridgeError, EntityType, HealthState, Mode, ModeController, Provenance,
    RedisCache, RedisConfig, RequestDescriptor, ResponseCache, RetryError, UpstreamErrorKind,
};

use sisbridge_tests::{
    config, controller, controller_with_hanging_cache, integrations_body, learners_body,
    marks_body, patch_requests, ScriptedHttpClient, Step, INTEGRATIONS, LEARNERS, MARKS,
};

fn learners(scope: &str) -> RequestDescriptor {
    RequestDescriptor::new(EntityType::Learners, scope).expect("valid descriptor")
}

// =============================================================================
// Cache idempotence
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_live_marks_are_fetched_twice_the_second_read_is_a_byte_identical_cache_hit() {
    // Given: A live controller whose upstream serves marks with awkward floats
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(MARKS, [Step::json(marks_body())]);
    let controller = controller(config(Mode::Live), &http);
    let descriptor = RequestDescriptor::new(EntityType::Marks, "1001").expect("valid");

    // When: The same descriptor is fetched twice
    let first = controller.fetch(&descriptor).await.expect("first fetch");
    let second = controller.fetch(&descriptor).await.expect("second fetch");

    // Then: The second read comes from cache with identical serialized records
    assert_eq!(first.provenance, Provenance::Live);
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(second.provenance, Provenance::Live);
    assert_eq!(
        serde_json::to_string(&first.records).expect("serialize"),
        serde_json::to_string(&second.records).expect("serialize")
    );
    assert_eq!(http.calls(MARKS), 1, "cache hit must not reach the upstream");
}

#[tokio::test(start_paused = true)]
async fn when_live_records_are_normalized_they_match_the_canonical_schema() {
    // Given: An upstream that uses snake_case names and loose grade spellings
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::json(learners_body())]);
    let controller = controller(config(Mode::Live), &http);

    // When: Learners are fetched
    let outcome = controller.fetch(&learners("1001")).await.expect("fetch");

    // Then: Records carry canonical names and grades, and the school was resolved to its login
    assert_eq!(outcome.records.len(), 2);
    for record in &outcome.records {
        assert!(conformance_errors(EntityType::Learners, record).is_empty());
    }
    assert_eq!(outcome.records[1].get_str("Grade"), Some("R"));
    assert!(http
        .requests()
        .iter()
        .any(|request| request.path().ends_with("schooldata/learners/login-1001")));
}

// =============================================================================
// Fallback behaviour
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_hybrid_upstream_keeps_failing_synthetic_fallback_is_served_and_health_degrades() {
    // Given: A hybrid controller whose learners endpoint always answers 503
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::status(503, r#"{"message":"maintenance"}"#)]);
    let controller = controller(config(Mode::Hybrid), &http);

    // When: Learners are fetched
    let outcome = controller.fetch(&learners("1001")).await.expect("fallback serves");

    // Then: Synthetic fallback data is served with the live failure attached
    assert_eq!(outcome.provenance, Provenance::SyntheticFallback);
    assert!(!outcome.records.is_empty());
    for record in &outcome.records {
        assert!(conformance_errors(EntityType::Learners, record).is_empty());
    }
    let cause = outcome.fallback_cause.expect("fallback cause");
    assert_eq!(cause.status(), Some(503));
    assert_eq!(cause.attempts(), 3);
    assert_eq!(http.calls(LEARNERS), 3);

    // Then: Health reports the version degraded while synthetic data keeps the system serving
    let report = controller.health();
    assert_eq!(report.overall_status, HealthState::Degraded);
    assert_eq!(report.per_version[&ApiVersion::V2].status, HealthState::Degraded);
    assert!(report.per_version[&ApiVersion::V2].endpoint.degraded);
    assert!(report.synthetic_available);
}

#[tokio::test(start_paused = true)]
async fn when_live_upstream_keeps_failing_the_caller_gets_fallback_exhausted_with_status() {
    // Given: A live controller whose learners endpoint always answers 503
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::status(503, "")]);
    let controller = controller(config(Mode::Live), &http);

    // When: Learners are fetched
    let error = controller.fetch(&learners("1001")).await.expect_err("live must fail");

    // Then: No fallback happens and the original status survives
    let BridgeError::FallbackExhausted { mode, source } = &error else {
        panic!("expected FallbackExhausted, got {error:?}");
    };
    assert_eq!(*mode, Mode::Live);
    assert!(matches!(source, RetryError::Exhausted { attempts: 3, .. }));
    assert_eq!(error.status(), Some(503));
    assert_eq!(controller.health().overall_status, HealthState::Degraded);
}

#[tokio::test(start_paused = true)]
async fn when_hybrid_generator_is_disabled_live_failure_is_surfaced() {
    // Given: Hybrid mode with synthetic data switched off
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::connect_error()]);
    let mut config = config(Mode::Hybrid);
    config.synthetic.enabled = false;
    let controller = controller(config, &http);

    // When: Learners are fetched
    let error = controller.fetch(&learners("1001")).await.expect_err("no fallback");

    // Then: The retry error is surfaced as FallbackExhausted
    assert_eq!(error.code(), "fallback_exhausted");
    assert_eq!(
        error.upstream_error().map(|error| error.kind()),
        Some(UpstreamErrorKind::ConnectionFailed)
    );
}

#[tokio::test(start_paused = true)]
async fn when_hybrid_upstream_rejects_the_request_the_rejection_is_not_masked() {
    for (status, kind) in [
        (401, UpstreamErrorKind::Unauthorized),
        (404, UpstreamErrorKind::NotFound),
    ] {
        // Given: A hybrid controller whose learners endpoint rejects the request
        let http = ScriptedHttpClient::new()
            .on(INTEGRATIONS, [Step::json(integrations_body())])
            .on(LEARNERS, [Step::status(status, "")]);
        let controller = controller(config(Mode::Hybrid), &http);

        // When: Learners are fetched
        let error = controller
            .fetch(&learners("1001"))
            .await
            .expect_err("rejection is surfaced");

        // Then: The caller sees the upstream status instead of synthetic data
        assert_eq!(error.code(), "upstream_error", "status {status}");
        assert_eq!(error.status(), Some(status));
        assert_eq!(error.upstream_error().map(|error| error.kind()), Some(kind));
        assert!(matches!(
            error,
            BridgeError::Upstream(RetryError::Terminal { attempts: 1, .. })
        ));
        assert_eq!(http.calls(LEARNERS), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn when_hybrid_school_is_unknown_upstream_not_found_is_surfaced() {
    // Given: A hybrid controller and a school absent from the integration listing
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::json(learners_body())]);
    let controller = controller(config(Mode::Hybrid), &http);

    // When: Its learners are fetched
    let error = controller.fetch(&learners("9999")).await.expect_err("unknown school");

    // Then: Resolution failure is reported rather than replaced
    assert_eq!(error.code(), "upstream_error");
    assert_eq!(
        error.upstream_error().map(|error| error.kind()),
        Some(UpstreamErrorKind::NotFound)
    );
    assert_eq!(http.calls(LEARNERS), 0);
}

// =============================================================================
// Scope resolution
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_school_has_no_integration_live_fetch_fails_once_with_not_found() {
    // Given: An integration listing that does not mention school 9999
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::json(learners_body())]);
    let controller = controller(config(Mode::Live), &http);

    // When: Learners for the unknown school are fetched
    let error = controller.fetch(&learners("9999")).await.expect_err("unknown school");

    // Then: The error is terminal and the entity endpoint was never called
    assert_eq!(
        error.upstream_error().map(|error| error.kind()),
        Some(UpstreamErrorKind::NotFound)
    );
    assert_eq!(http.calls(LEARNERS), 0);
}

#[tokio::test(start_paused = true)]
async fn when_school_integration_is_inactive_live_fetch_reports_not_activated() {
    // Given: School 2002 is linked but not activated
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::json(learners_body())]);
    let controller = controller(config(Mode::Live), &http);

    // When: Its learners are fetched
    let error = controller.fetch(&learners("2002")).await.expect_err("inactive");

    // Then: The caller learns the integration must be activated
    assert_eq!(
        error.upstream_error().map(|error| error.kind()),
        Some(UpstreamErrorKind::NotActivated)
    );
    assert_eq!(http.calls(INTEGRATIONS), 1);
}

// =============================================================================
// Sandbox and mode switching
// =============================================================================

#[tokio::test]
async fn when_sandbox_serves_school_1001_learners_are_unique_and_graded() {
    // Given: A sandbox controller with a transport that must never be used
    let http = ScriptedHttpClient::new();
    let controller = controller(config(Mode::Sandbox), &http);

    // When: Learners for school 1001 are fetched
    let outcome = controller.fetch(&learners("1001")).await.expect("sandbox fetch");

    // Then: The learners are synthetic, unique and graded R..12
    assert_eq!(outcome.provenance, Provenance::Synthetic);
    assert!(!outcome.records.is_empty());
    let ids: BTreeSet<&str> = outcome
        .records
        .iter()
        .filter_map(|record| record.get_str("LearnerID"))
        .collect();
    assert_eq!(ids.len(), outcome.records.len(), "LearnerIDs must be unique");
    assert!(outcome
        .records
        .iter()
        .all(|record| record.get_str("Grade").is_some_and(|grade| GRADES.contains(&grade))));
    assert!(outcome
        .records
        .iter()
        .all(|record| record.get_str("SchoolID") == Some("1001")));
    assert_eq!(http.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn when_mode_switches_mid_flight_the_request_finishes_on_its_snapshot() {
    // Given: A live upstream that fails twice (slowly) before succeeding
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(
            LEARNERS,
            [
                Step::status(503, "").after(Duration::from_millis(50)),
                Step::status(503, ""),
                Step::json(learners_body()),
            ],
        );
    let controller = Arc::new(controller(config(Mode::Live), &http));

    // When: The mode flips to sandbox while the first attempt is in flight
    let in_flight = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.fetch(&learners("1001")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(controller.set_mode(Mode::Sandbox), Mode::Live);

    // Then: The in-flight request completes on the live path
    let outcome = in_flight.await.expect("task").expect("live fetch");
    assert_eq!(outcome.provenance, Provenance::Live);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(http.calls(LEARNERS), 3);

    // Then: Requests started after the switch use the new mode
    let next = controller.fetch(&learners("1001")).await.expect("sandbox fetch");
    assert_eq!(next.provenance, Provenance::Synthetic);
}

#[tokio::test]
async fn when_mode_flips_back_entries_from_the_earlier_mode_are_reachable_again() {
    // Given: A sandbox fetch that populated the cache
    let http = ScriptedHttpClient::new();
    let controller = controller(config(Mode::Sandbox), &http);
    let first = controller.fetch(&learners("1003")).await.expect("sandbox fetch");

    // When: The mode goes to hybrid and back
    controller.set_mode(Mode::Hybrid);
    controller.set_mode(Mode::Sandbox);
    let again = controller.fetch(&learners("1003")).await.expect("sandbox fetch");

    // Then: The sandbox entry survived the switches
    assert!(again.cache_hit);
    assert_eq!(again.records, first.records);
}

#[tokio::test]
async fn when_the_cache_backend_is_down_requests_still_succeed() {
    // Given: A Redis cache that was never connected
    let http = ScriptedHttpClient::new();
    let cache = ResponseCache::new(
        Arc::new(RedisCache::new(RedisConfig {
            host: String::from("127.0.0.1"),
            port: 1,
            ..RedisConfig::default()
        })),
        "test:",
    );
    let controller = ModeController::builder(config(Mode::Sandbox))
        .with_http_client(http.clone())
        .with_cache(cache)
        .build()
        .expect("valid");

    // When: The same descriptor is fetched twice
    let first = controller.fetch(&learners("1001")).await.expect("first");
    let second = controller.fetch(&learners("1001")).await.expect("second");

    // Then: Both are served without a cache hit
    assert!(!first.cache_hit);
    assert!(!second.cache_hit);
    assert_eq!(first.records, second.records);
}

#[tokio::test(start_paused = true)]
async fn when_the_cache_backend_hangs_the_caller_deadline_still_holds() {
    // Given: A live controller whose cache never answers
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on(LEARNERS, [Step::json(learners_body())]);
    let controller = controller_with_hanging_cache(config(Mode::Live), &http);
    let started = Instant::now();

    // When: Learners are fetched with a 100ms deadline
    let error = controller
        .fetch_with_deadline(&learners("1001"), Some(started + Duration::from_millis(100)))
        .await
        .expect_err("deadline spent waiting on the cache");

    // Then: The call ends at the deadline without reaching the upstream
    assert!(matches!(
        error,
        BridgeError::DeadlineExceeded { attempts: 0, last: None }
    ));
    assert!(started.elapsed() < Duration::from_millis(110));
    assert_eq!(http.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn when_the_cache_backend_hangs_sandbox_requests_are_served_as_misses() {
    // Given: A sandbox controller whose cache never answers
    let http = ScriptedHttpClient::new();
    let controller = controller_with_hanging_cache(config(Mode::Sandbox), &http);
    let started = Instant::now();

    // When: Learners are fetched without a deadline
    let outcome = controller.fetch(&learners("1001")).await.expect("served");

    // Then: Synthetic data arrives once the bounded cache calls give up
    assert_eq!(outcome.provenance, Provenance::Synthetic);
    assert!(!outcome.cache_hit);
    assert!(!outcome.records.is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
}

// =============================================================================
// Integrations
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_activation_changes_the_cached_integration_listing_is_refreshed() {
    // Given: A live controller that has listed integrations once
    let http = ScriptedHttpClient::new()
        .on(INTEGRATIONS, [Step::json(integrations_body())])
        .on("settings/clients/", [Step::json(serde_json::json!({ "ok": true }))]);
    let controller = controller(config(Mode::Live), &http);
    let listed = controller.list_integrations().await.expect("listing");
    assert_eq!(listed.links.len(), 2);
    let cached = controller.list_integrations().await.expect("cached listing");
    assert!(cached.cache_hit);

    // When: School 2002 is activated
    let ack = controller
        .set_activation("login-2002", None, true)
        .await
        .expect("activation");

    // Then: The PATCH carried the flag and the next listing goes upstream again
    assert_eq!(ack.provenance, Provenance::Live);
    let patches = patch_requests(&http);
    assert_eq!(patches.len(), 1);
    assert!(patches[0].path().ends_with("settings/clients/login-2002/8"));
    assert_eq!(patches[0].body.as_deref(), Some(r#"{"activated":true}"#));

    let refreshed = controller.list_integrations().await.expect("listing");
    assert!(!refreshed.cache_hit);
    assert_eq!(http.calls(INTEGRATIONS), 2);
}

#[tokio::test(start_paused = true)]
async fn when_hybrid_integration_listing_fails_sandbox_schools_are_listed() {
    // Given: An upstream whose integration listing is down
    let http = ScriptedHttpClient::new().on(INTEGRATIONS, [Step::status(502, "")]);
    let controller = controller(config(Mode::Hybrid), &http);

    // When: Integrations are listed
    let outcome = controller.list_integrations().await.expect("fallback listing");

    // Then: The configured sandbox schools are returned as active links
    assert_eq!(outcome.provenance, Provenance::SyntheticFallback);
    let schools: Vec<&str> = outcome.links.iter().map(|link| link.school_id.as_str()).collect();
    assert_eq!(schools, ["1001", "1002", "1003"]);
    assert!(outcome.links.iter().all(|link| link.active));
}

#[tokio::test(start_paused = true)]
async fn when_activation_fails_upstream_the_error_is_not_masked() {
    // Given: An activation endpoint that rejects our credentials
    let http = ScriptedHttpClient::new().on("settings/clients/", [Step::status(401, "")]);
    let controller = controller(config(Mode::Hybrid), &http);

    // When: An activation is attempted
    let error = controller
        .set_activation("login-1001", Some(8), false)
        .await
        .expect_err("write failure surfaces");

    // Then: Writes never fall back and terminal errors are attempted once
    assert_eq!(error.code(), "upstream_error");
    assert_eq!(error.status(), Some(401));
    assert_eq!(patch_requests(&http).len(), 1);
}
