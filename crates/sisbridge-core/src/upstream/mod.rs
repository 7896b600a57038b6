//! Authenticated access to the v1/v2 SIS endpoints.
//!
//! Every attempt goes through [`UpstreamClient::call`], which applies the
//! quota, consults the version's circuit breaker, classifies the outcome into
//! an [`UpstreamError`] and records it on the shared [`EndpointRegistry`].

mod endpoint_state;
mod error;
mod normalize;
mod routes;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::config::UpstreamConfig;
use crate::domain::{
    schema_for, EntityRecord, EntityType, IntegrationLink, RequestDescriptor, INTEGRATION_FIELDS,
};
use crate::http_client::{HttpAuth, HttpClient, HttpMethod, HttpRequest};
use crate::throttling::RequestThrottle;

pub use endpoint_state::{EndpointRegistry, EndpointState};
pub use error::{UpstreamError, UpstreamErrorKind};
pub use normalize::{coerce, extract_objects, normalize_record};
pub use routes::{activation_path, route_for, ApiVersion, Route, INTEGRATIONS_ROUTE};

/// Client for the upstream SIS API.
pub struct UpstreamClient {
    config: UpstreamConfig,
    auth: HttpAuth,
    http: Arc<dyn HttpClient>,
    endpoints: Arc<EndpointRegistry>,
    breakers: BTreeMap<ApiVersion, CircuitBreaker>,
    throttle: Option<RequestThrottle>,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("config", &self.config)
            .field("auth", &self.auth)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    pub fn new(
        config: UpstreamConfig,
        http: Arc<dyn HttpClient>,
        circuit: CircuitBreakerConfig,
    ) -> Self {
        let auth = config.auth();
        let breakers = ApiVersion::ALL
            .into_iter()
            .map(|version| (version, CircuitBreaker::new(circuit)))
            .collect();
        Self {
            config,
            auth,
            http,
            endpoints: Arc::new(EndpointRegistry::new()),
            breakers,
            throttle: None,
        }
    }

    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Endpoint state shared with the health monitor.
    pub fn endpoints(&self) -> Arc<EndpointRegistry> {
        Arc::clone(&self.endpoints)
    }

    pub fn circuit_state(&self, version: ApiVersion) -> CircuitState {
        self.breakers
            .get(&version)
            .map_or(CircuitState::Closed, CircuitBreaker::state)
    }

    pub fn mark_degraded(&self, version: ApiVersion) {
        self.endpoints.mark_degraded(version);
    }

    pub fn base_url(&self, version: ApiVersion) -> &str {
        match version {
            ApiVersion::V1 => &self.config.v1_base_url,
            ApiVersion::V2 => &self.config.v2_base_url,
        }
    }

    /// One GET against `version`, returning the raw JSON body.
    pub async fn call(
        &self,
        version: ApiVersion,
        path: &str,
        params: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        self.send(version, HttpMethod::Get, path, params, None, timeout)
            .await
    }

    /// Fetches and normalizes the records `descriptor` asks for.
    ///
    /// `login` is the resolved upstream login; unscoped routes ignore it.
    pub async fn fetch_records(
        &self,
        route: &Route,
        login: &str,
        descriptor: &RequestDescriptor,
        timeout: Duration,
    ) -> Result<Vec<EntityRecord>, UpstreamError> {
        let path = route.path(descriptor, login);
        let params = descriptor.filters.to_query_params();
        let body = self.call(route.version, &path, &params, timeout).await?;
        let objects = extract_objects(route, body).map_err(|error| error.with_version(route.version))?;

        let fields = schema_for(descriptor.entity);
        let lookup_table = descriptor.filters.lookup_table;
        Ok(objects
            .iter()
            .map(|raw| {
                let mut record = normalize_record(fields, raw);
                if descriptor.entity == EntityType::Lookups
                    && record.get("LookupType").map_or(true, Value::is_null)
                {
                    if let Some(table) = lookup_table {
                        record.insert("LookupType", table.as_str());
                    }
                }
                record
            })
            .collect())
    }

    /// Client integrations visible to our credentials.
    pub async fn list_integrations(
        &self,
        timeout: Duration,
    ) -> Result<Vec<IntegrationLink>, UpstreamError> {
        let route = INTEGRATIONS_ROUTE;
        let body = self
            .call(route.version, route.template, &BTreeMap::new(), timeout)
            .await?;
        let objects = extract_objects(&route, body).map_err(|error| error.with_version(route.version))?;

        Ok(objects
            .iter()
            .map(|raw| normalize_record(INTEGRATION_FIELDS, raw))
            .filter_map(|record| IntegrationLink::from_record(&record))
            .collect())
    }

    /// Toggles activation of `api_type_id` for the school behind `login`.
    pub async fn set_activation(
        &self,
        login: &str,
        api_type_id: u32,
        active: bool,
        timeout: Duration,
    ) -> Result<(), UpstreamError> {
        let body = serde_json::json!({ "activated": active }).to_string();
        self.send(
            INTEGRATIONS_ROUTE.version,
            HttpMethod::Patch,
            &activation_path(login, api_type_id),
            &BTreeMap::new(),
            Some(body),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn send(
        &self,
        version: ApiVersion,
        method: HttpMethod,
        path: &str,
        params: &BTreeMap<String, String>,
        body: Option<String>,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let breaker = self.breakers.get(&version);
        if breaker.is_some_and(|breaker| !breaker.allow_request()) {
            return Err(UpstreamError::circuit_open(version));
        }

        if let Some(throttle) = &self.throttle {
            throttle.acquire().await;
        }

        let url = format!(
            "{}/{}",
            self.base_url(version).trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut request = HttpRequest::new(method, url)
            .with_header("accept", "application/json")
            .with_query(params)
            .with_auth(&self.auth)
            .with_timeout(timeout);
        if let Some(body) = body {
            request = request.with_json_body(body);
        }

        debug!(%version, path, "calling upstream");
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, self.http.execute(request)).await {
            Ok(Ok(response)) if response.is_success() => parse_body(&response.body)
                .map(|value| (value, response.status)),
            Ok(Ok(response)) => Err(UpstreamError::from_status(response.status, &response.body)),
            Ok(Err(error)) => Err(UpstreamError::from_transport(&error)),
            Err(_) => Err(UpstreamError::timeout(format!(
                "no response within {} ms",
                timeout.as_millis()
            ))),
        };
        let latency = started.elapsed();

        match outcome {
            Ok((value, status)) => {
                self.endpoints.record_success(version, latency, status);
                if let Some(breaker) = breaker {
                    breaker.record_success();
                }
                Ok(value)
            }
            Err(error) => {
                let error = error.with_version(version);
                let answered = error.status().is_some();
                self.endpoints
                    .record_failure(version, &error, answered.then_some(latency));
                if let Some(breaker) = breaker {
                    if error.retryable() {
                        breaker.record_failure();
                    } else if answered {
                        breaker.record_success();
                    }
                }
                debug!(%version, path, error = %error, "upstream call failed");
                Err(error)
            }
        }
    }
}

fn parse_body(body: &str) -> Result<Value, UpstreamError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body)
        .map_err(|error| UpstreamError::invalid_response(format!("response is not JSON: {error}")))
}
