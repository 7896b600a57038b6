//! Composite health report.
//!
//! The report is derived purely from recorded endpoint state, circuit state
//! and the generator self-test; building it never calls the upstream.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitState;
use crate::domain::UtcDateTime;
use crate::mode::{Mode, ModeState};
use crate::synthetic::SyntheticGenerator;
use crate::upstream::{ApiVersion, EndpointState, UpstreamClient};

/// Health classification shared by versions and the overall report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Health of one upstream API version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionHealth {
    pub status: HealthState,
    pub circuit: CircuitState,
    #[serde(flatten)]
    pub endpoint: EndpointState,
    pub average_response_time_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub overall_status: HealthState,
    pub mode: Mode,
    pub per_version: BTreeMap<ApiVersion, VersionHealth>,
    pub synthetic_available: bool,
    pub last_checked_at: UtcDateTime,
    pub average_response_time_ms: Option<f64>,
}

/// Open circuit is unhealthy; a degraded flag or failed last attempt is
/// degraded.
pub fn version_status(endpoint: &EndpointState, circuit: CircuitState) -> HealthState {
    if circuit == CircuitState::Open {
        HealthState::Unhealthy
    } else if endpoint.degraded || endpoint.last_attempt_failed {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

/// Rolls per-version states up into the overall status for `mode`.
pub fn overall_status(
    mode: Mode,
    versions: impl IntoIterator<Item = HealthState>,
    synthetic_available: bool,
) -> HealthState {
    let versions: Vec<HealthState> = versions.into_iter().collect();
    let all_healthy = versions.iter().all(|state| *state == HealthState::Healthy);
    let any_serving = versions.iter().any(|state| *state != HealthState::Unhealthy);

    let live_only = || {
        if all_healthy {
            HealthState::Healthy
        } else if any_serving {
            HealthState::Degraded
        } else {
            HealthState::Unhealthy
        }
    };

    match mode {
        Mode::Sandbox if synthetic_available => HealthState::Healthy,
        Mode::Sandbox => HealthState::Unhealthy,
        Mode::Live => live_only(),
        Mode::Hybrid if all_healthy => HealthState::Healthy,
        Mode::Hybrid if synthetic_available => HealthState::Degraded,
        Mode::Hybrid => live_only(),
    }
}

/// Observes the shared mode, upstream state and generator.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    mode: ModeState,
    upstream: Arc<UpstreamClient>,
    synthetic: Arc<SyntheticGenerator>,
}

impl HealthMonitor {
    pub fn new(
        mode: ModeState,
        upstream: Arc<UpstreamClient>,
        synthetic: Arc<SyntheticGenerator>,
    ) -> Self {
        Self {
            mode,
            upstream,
            synthetic,
        }
    }

    pub fn report(&self) -> HealthReport {
        let mode = self.mode.snapshot();
        let endpoints = self.upstream.endpoints();
        let synthetic_available = self.synthetic.self_test();

        let per_version: BTreeMap<ApiVersion, VersionHealth> = ApiVersion::ALL
            .into_iter()
            .map(|version| {
                let endpoint = endpoints.snapshot(version);
                let circuit = self.upstream.circuit_state(version);
                let health = VersionHealth {
                    status: version_status(&endpoint, circuit),
                    circuit,
                    average_response_time_ms: endpoint.average_latency_ms(),
                    endpoint,
                };
                (version, health)
            })
            .collect();

        HealthReport {
            overall_status: overall_status(
                mode,
                per_version.values().map(|health| health.status),
                synthetic_available,
            ),
            mode,
            synthetic_available,
            last_checked_at: UtcDateTime::now(),
            average_response_time_ms: endpoints.average_latency_ms(),
            per_version,
        }
    }
}
