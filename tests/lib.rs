//! Shared fixtures for the behaviour suites: a scripted in-memory transport
//! and controller configurations that never touch the network.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use sisbridge_core::cache::CacheFuture;
use sisbridge_core::{
    BridgeConfig, CacheBackend, CircuitBreakerConfig, HttpClient, HttpError, HttpMethod,
    HttpRequest, HttpResponse, Mode, ModeController, ResponseCache, RetryPolicy, UpstreamConfig,
};

/// One scripted reply, optionally delayed.
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub result: Result<HttpResponse, HttpError>,
}

impl Step {
    pub fn json(body: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(HttpResponse::ok_json(body.to_string())),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(HttpResponse::new(status, body)),
        }
    }

    pub fn connect_error() -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(HttpError::connect("connection refused")),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug)]
struct ScriptedRoute {
    fragment: String,
    steps: VecDeque<Step>,
}

/// Transport double routed by path fragment.
///
/// Each route replays its steps in order and repeats the last one forever.
/// Requests matching no route fail with a connect error.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<ScriptedRoute>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(self: &Arc<Self>, fragment: &str, steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ScriptedRoute {
                fragment: fragment.to_owned(),
                steps: steps.into_iter().collect(),
            });
        Arc::clone(self)
    }

    /// Number of requests whose path contains `fragment`.
    pub fn calls(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|request| request.path().contains(fragment))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_step(&self, path: &str) -> Step {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(route) = routes.iter_mut().find(|route| path.contains(&route.fragment)) else {
            return Step::connect_error();
        };
        if route.steps.len() > 1 {
            route.steps.pop_front().unwrap_or_else(Step::connect_error)
        } else {
            route.steps.front().cloned().unwrap_or_else(Step::connect_error)
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let step = self.next_step(request.path());
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Box::pin(async move {
            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }
            step.result
        })
    }
}

pub const INTEGRATIONS: &str = "settings/clientintegrations";
pub const LEARNERS: &str = "schooldata/learners";
pub const MARKS: &str = "adminplus/marks";

/// Integration listing linking school 1001 (active) and 2002 (inactive).
pub fn integrations_body() -> Value {
    serde_json::json!({
        "data": [
            { "school_id": "1001", "school_login_id": "login-1001", "school_name": "Hillcrest Primary School", "api_type_id": 8, "activated": true },
            { "school_id": "2002", "school_login_id": "login-2002", "school_name": "Protea High School", "api_type_id": 8, "activated": false }
        ]
    })
}

pub fn learners_body() -> Value {
    serde_json::json!({
        "learners": [
            { "learner_id": "L-1", "school_id": "1001", "first_name": "Thando", "surname": "Nkosi", "grade": "Grade 5", "class_name": "5A", "gender": "F", "dob": "2014-03-02", "home_language": "isiZulu" },
            { "learner_id": "L-2", "school_id": "1001", "first_name": "Pieter", "surname": "Botha", "grade": "gr R", "class_name": "RB", "gender": "M", "dob": "2019-11-20", "home_language": "Afrikaans" }
        ]
    })
}

pub fn marks_body() -> Value {
    serde_json::json!([
        { "mark_id": "M-1", "learner_id": "L-1", "subject_code": "MATH", "subject": "Mathematics", "grade": "5", "term": "1", "assessment": "Term 1 Test", "date": "2025-02-14", "mark": 33, "total": 50, "percentage": 66.66666666666667 },
        { "mark_id": "M-2", "learner_id": "L-1", "subject_code": "ENGH", "subject": "English Home Language", "grade": "5", "term": 1, "assessment": "Term 1 Test", "date": "2025-02-20", "mark": "41.5", "total": 50, "percentage": 0.1 }
    ])
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        per_attempt_timeout: Duration::from_secs(2),
        jitter: false,
    }
}

pub fn config(mode: Mode) -> BridgeConfig {
    BridgeConfig {
        mode,
        upstream: UpstreamConfig {
            v1_base_url: String::from("http://sis.test/api/v1"),
            v2_base_url: String::from("http://sis.test/api/v2"),
            username: Some(String::from("bridge")),
            password: Some(String::from("secret")),
            ..UpstreamConfig::default()
        },
        retry: fast_retry(3),
        circuit: CircuitBreakerConfig {
            failure_threshold: 50,
            open_timeout: Duration::from_secs(30),
        },
        ..BridgeConfig::default()
    }
}

pub fn controller(config: BridgeConfig, http: &Arc<ScriptedHttpClient>) -> ModeController {
    ModeController::builder(config)
        .with_http_client(Arc::clone(http) as Arc<dyn HttpClient>)
        .build()
        .expect("test configuration is valid")
}

/// Controller whose cache backend never answers.
pub fn controller_with_hanging_cache(
    config: BridgeConfig,
    http: &Arc<ScriptedHttpClient>,
) -> ModeController {
    ModeController::builder(config)
        .with_http_client(Arc::clone(http) as Arc<dyn HttpClient>)
        .with_cache(ResponseCache::new(Arc::new(HangingCache), "test:"))
        .build()
        .expect("test configuration is valid")
}

/// Cache backend whose reads and writes never complete.
#[derive(Debug, Default)]
pub struct HangingCache;

impl CacheBackend for HangingCache {
    fn name(&self) -> &'static str {
        "hanging"
    }

    fn connect(&self) -> CacheFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn disconnect(&self) -> CacheFuture<'_, ()> {
        Box::pin(std::future::pending())
    }

    fn get<'a>(&'a self, _key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(std::future::pending())
    }

    fn set<'a>(&'a self, _key: &'a str, _value: String, _ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(std::future::pending())
    }

    fn invalidate<'a>(&'a self, _key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(std::future::pending())
    }
}

pub fn patch_requests(http: &ScriptedHttpClient) -> Vec<HttpRequest> {
    http.requests()
        .into_iter()
        .filter(|request| request.method == HttpMethod::Patch)
        .collect()
}
