use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;

use super::error::UpstreamError;
use super::routes::ApiVersion;
use crate::domain::UtcDateTime;

const LATENCY_WINDOW: usize = 100;

/// Observed state of one upstream API version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointState {
    pub version: ApiVersion,
    /// `None` until the first attempt completes.
    pub reachable: Option<bool>,
    pub last_success_at: Option<UtcDateTime>,
    pub last_attempt_at: Option<UtcDateTime>,
    pub last_error: Option<String>,
    pub last_status: Option<u16>,
    pub last_attempt_failed: bool,
    pub consecutive_failures: u32,
    /// Set when a request on this version was served by fallback data.
    pub degraded: bool,
    #[serde(skip)]
    latencies: VecDeque<Duration>,
}

impl EndpointState {
    fn new(version: ApiVersion) -> Self {
        Self {
            version,
            reachable: None,
            last_success_at: None,
            last_attempt_at: None,
            last_error: None,
            last_status: None,
            last_attempt_failed: false,
            consecutive_failures: 0,
            degraded: false,
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
        }
    }

    fn push_latency(&mut self, latency: Duration) {
        if self.latencies.len() == LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
    }

    /// Mean latency over the recent window, in milliseconds.
    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: f64 = self
            .latencies
            .iter()
            .map(|latency| latency.as_micros() as f64 / 1_000.0)
            .sum();
        Some(total / self.latencies.len() as f64)
    }

    pub fn latency_samples(&self) -> usize {
        self.latencies.len()
    }
}

/// Per-version endpoint state, mutated after every upstream attempt.
#[derive(Debug)]
pub struct EndpointRegistry {
    states: RwLock<BTreeMap<ApiVersion, EndpointState>>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        let states = ApiVersion::ALL
            .into_iter()
            .map(|version| (version, EndpointState::new(version)))
            .collect();
        Self {
            states: RwLock::new(states),
        }
    }

    fn update(&self, version: ApiVersion, apply: impl FnOnce(&mut EndpointState)) {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(version)
            .or_insert_with(|| EndpointState::new(version));
        apply(state);
    }

    /// A successful attempt clears the degraded flag.
    pub fn record_success(&self, version: ApiVersion, latency: Duration, status: u16) {
        self.update(version, |state| {
            let now = UtcDateTime::now();
            state.reachable = Some(true);
            state.last_success_at = Some(now);
            state.last_attempt_at = Some(now);
            state.last_status = Some(status);
            state.last_attempt_failed = false;
            state.consecutive_failures = 0;
            state.degraded = false;
            state.push_latency(latency);
        });
    }

    /// Records a failed attempt. An HTTP error status still proves the
    /// endpoint reachable; transport failures do not.
    pub fn record_failure(&self, version: ApiVersion, error: &UpstreamError, latency: Option<Duration>) {
        self.update(version, |state| {
            state.reachable = Some(error.status().is_some());
            state.last_attempt_at = Some(UtcDateTime::now());
            state.last_error = Some(error.to_string());
            state.last_status = error.status();
            state.last_attempt_failed = true;
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            if let Some(latency) = latency {
                state.push_latency(latency);
            }
        });
    }

    pub fn mark_degraded(&self, version: ApiVersion) {
        self.update(version, |state| state.degraded = true);
    }

    pub fn snapshot(&self, version: ApiVersion) -> EndpointState {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&version)
            .cloned()
            .unwrap_or_else(|| EndpointState::new(version))
    }

    /// Mean latency across every version's window, in milliseconds.
    pub fn average_latency_ms(&self) -> Option<f64> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        let (total, samples) = states
            .values()
            .flat_map(|state| state.latencies.iter())
            .fold((0.0_f64, 0_usize), |(total, samples), latency| {
                (total + latency.as_micros() as f64 / 1_000.0, samples + 1)
            });
        (samples > 0).then(|| total / samples as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_accumulate_and_success_resets() {
        let registry = EndpointRegistry::new();
        let error = UpstreamError::from_status(503, "").with_version(ApiVersion::V2);

        registry.record_failure(ApiVersion::V2, &error, Some(Duration::from_millis(10)));
        registry.record_failure(ApiVersion::V2, &error, None);
        registry.mark_degraded(ApiVersion::V2);

        let state = registry.snapshot(ApiVersion::V2);
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.last_status, Some(503));
        assert_eq!(state.reachable, Some(true));
        assert!(state.degraded);
        assert!(state.last_attempt_failed);

        registry.record_success(ApiVersion::V2, Duration::from_millis(30), 200);
        let state = registry.snapshot(ApiVersion::V2);
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.degraded);
        assert!(state.last_success_at.is_some());
        assert_eq!(state.average_latency_ms(), Some(20.0));
    }

    #[test]
    fn transport_failures_mark_the_endpoint_unreachable() {
        let registry = EndpointRegistry::new();
        registry.record_failure(ApiVersion::V1, &UpstreamError::timeout("slow"), None);

        assert_eq!(registry.snapshot(ApiVersion::V1).reachable, Some(false));
        assert_eq!(registry.snapshot(ApiVersion::V2).reachable, None);
    }

    #[test]
    fn latency_window_is_bounded() {
        let registry = EndpointRegistry::new();
        for _ in 0..(LATENCY_WINDOW + 20) {
            registry.record_success(ApiVersion::V1, Duration::from_millis(5), 200);
        }
        assert_eq!(registry.snapshot(ApiVersion::V1).latency_samples(), LATENCY_WINDOW);
        assert_eq!(registry.average_latency_ms(), Some(5.0));
    }
}
