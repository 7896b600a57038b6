//! Per-request choice between the live upstream and synthetic data.
//!
//! A [`ModeController`] is built once per process through
//! [`ModeControllerBuilder`] and shared behind an `Arc`. Every request reads a
//! mode snapshot when it starts and routes on that value until it completes,
//! so [`ModeController::set_mode`] never disturbs in-flight work.
//!
//! | Mode | Cache miss path | Provenance | On live failure |
//! |---|---|---|---|
//! | `sandbox` | generator | `synthetic` | n/a |
//! | `live` | upstream via retry executor | `live` | `FallbackExhausted` |
//! | `hybrid` | upstream via retry executor | `live` | generator, `synthetic-fallback`, when retries ran out or the circuit is open |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::circuit_breaker::CircuitState;
use crate::config::{BridgeConfig, ConfigError};
use crate::domain::{find_link, EntityRecord, IntegrationLink, RequestDescriptor};
use crate::health::{HealthMonitor, HealthReport};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::mode::{Mode, ModeState, Provenance};
use crate::retry::{RetryError, RetryExecutor};
use crate::synthetic::{SyntheticError, SyntheticGenerator};
use crate::throttling::RequestThrottle;
use crate::upstream::{
    route_for, ApiVersion, UpstreamClient, UpstreamError, UpstreamErrorKind, INTEGRATIONS_ROUTE,
};
use crate::ValidationError;

/// Failures surfaced to collaborators.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{mode} request failed with no fallback: {source}")]
    FallbackExhausted {
        mode: Mode,
        #[source]
        source: RetryError,
    },
    #[error("caller deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded {
        attempts: u32,
        last: Option<UpstreamError>,
    },
    #[error("synthetic data unavailable: {0}")]
    SyntheticUnavailable(#[from] SyntheticError),
    /// A terminal upstream failure, or any failed write. Never masked by a
    /// fallback.
    #[error("upstream request failed: {0}")]
    Upstream(#[source] RetryError),
}

impl BridgeError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Config(_) => "config_error",
            Self::FallbackExhausted { .. } => "fallback_exhausted",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::SyntheticUnavailable(_) => "synthetic_unavailable",
            Self::Upstream(_) => "upstream_error",
        }
    }

    /// The upstream error behind this failure, if one was observed.
    pub fn upstream_error(&self) -> Option<&UpstreamError> {
        match self {
            Self::FallbackExhausted { source, .. } | Self::Upstream(source) => source.last_error(),
            Self::DeadlineExceeded { last, .. } => last.as_ref(),
            _ => None,
        }
    }

    /// Upstream HTTP status carried through retries, when there was one.
    pub fn status(&self) -> Option<u16> {
        self.upstream_error().and_then(UpstreamError::status)
    }

    fn from_live_failure(mode: Mode, error: RetryError) -> Self {
        match error {
            RetryError::DeadlineExceeded { attempts, last } => Self::DeadlineExceeded { attempts, last },
            source => Self::FallbackExhausted { mode, source },
        }
    }

    /// Hybrid failures that were not covered by a fallback.
    fn from_hybrid_failure(error: RetryError) -> Self {
        if matches!(error, RetryError::Terminal { .. }) && !warrants_fallback(&error) {
            Self::Upstream(error)
        } else {
            Self::from_live_failure(Mode::Hybrid, error)
        }
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Runs a cache call, abandoning it once `deadline` passes.
///
/// The cache bounds each backend call on its own; this keeps a caller
/// deadline shorter than that bound intact.
async fn within_deadline<F: Future>(deadline: Option<Instant>, operation: F) -> Option<F::Output> {
    let Some(deadline) = deadline else {
        return Some(operation.await);
    };
    match tokio::time::timeout_at(deadline, operation).await {
        Ok(output) => Some(output),
        Err(_) => {
            warn!("cache call outlived the caller deadline; skipped");
            None
        }
    }
}

/// Whether a live failure may be replaced by synthetic data.
///
/// Only sustained unavailability qualifies: retries ran out on transient
/// errors, or the version's circuit is open. Terminal answers such as bad
/// credentials or an unknown school are reported to the caller.
fn warrants_fallback(error: &RetryError) -> bool {
    match error {
        RetryError::Exhausted { .. } => true,
        RetryError::Terminal { source, .. } => source.kind() == UpstreamErrorKind::CircuitOpen,
        RetryError::DeadlineExceeded { .. } => false,
    }
}

/// Result of one fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub records: Vec<EntityRecord>,
    pub provenance: Provenance,
    pub cache_hit: bool,
    /// Live failure that caused a `synthetic-fallback`, when this call made
    /// that decision. Cache hits never carry one.
    #[serde(skip)]
    pub fallback_cause: Option<RetryError>,
}

/// Result of an integration listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationsOutcome {
    pub links: Vec<IntegrationLink>,
    pub provenance: Provenance,
    pub cache_hit: bool,
}

/// Acknowledged activation change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationAck {
    pub login_id: String,
    pub api_type_id: u32,
    pub active: bool,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub mode: Mode,
    pub live_available: bool,
    pub synthetic_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheTtls {
    live: Duration,
    synthetic: Duration,
    integration: Duration,
}

/// Orchestrates cache, upstream and generator for every read.
#[derive(Debug)]
pub struct ModeController {
    mode: ModeState,
    upstream: Arc<UpstreamClient>,
    synthetic: Arc<SyntheticGenerator>,
    cache: ResponseCache,
    executor: RetryExecutor,
    health: HealthMonitor,
    ttls: CacheTtls,
    resolve_scope: bool,
    api_type_id: u32,
}

impl ModeController {
    pub fn builder(config: BridgeConfig) -> ModeControllerBuilder {
        ModeControllerBuilder::new(config)
    }

    pub fn mode(&self) -> Mode {
        self.mode.snapshot()
    }

    /// Shared handle to the mode; clones observe and switch the same value.
    pub fn mode_state(&self) -> ModeState {
        self.mode.clone()
    }

    /// Switches the mode for requests that start after this call and returns
    /// the previous mode. Cached entries are left untouched.
    pub fn set_mode(&self, mode: Mode) -> Mode {
        let previous = self.mode.switch(mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "mode switched");
        }
        previous
    }

    pub fn status(&self) -> ControllerStatus {
        let live_available = self.upstream.config().has_credentials()
            && ApiVersion::ALL
                .into_iter()
                .any(|version| self.upstream.circuit_state(version) != CircuitState::Open);
        ControllerStatus {
            mode: self.mode.snapshot(),
            live_available,
            synthetic_available: self.synthetic.is_enabled(),
        }
    }

    pub fn health(&self) -> HealthReport {
        self.health.report()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    /// Connects the cache backend; `false` means the cache runs as
    /// pass-through.
    pub async fn connect(&self) -> bool {
        self.cache.connect().await
    }

    pub async fn shutdown(&self) {
        self.cache.disconnect().await;
    }

    pub async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<FetchOutcome, BridgeError> {
        self.fetch_with_deadline(descriptor, None).await
    }

    /// Like [`Self::fetch`], giving up with `DeadlineExceeded` once
    /// `deadline` passes.
    pub async fn fetch_with_deadline(
        &self,
        descriptor: &RequestDescriptor,
        deadline: Option<Instant>,
    ) -> Result<FetchOutcome, BridgeError> {
        descriptor.validate()?;
        let mode = self.mode.snapshot();
        let span = info_span!(
            "fetch",
            request_id = %Uuid::new_v4(),
            %mode,
            entity = %descriptor.entity,
            scope = %descriptor.scope_id,
        );

        async {
            let started = Instant::now();
            let outcome = self.fetch_in_mode(mode, descriptor, deadline).await;
            match &outcome {
                Ok(outcome) => debug!(
                    provenance = %outcome.provenance,
                    cache_hit = outcome.cache_hit,
                    records = outcome.records.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "fetch served"
                ),
                Err(error) => warn!(code = error.code(), error = %error, "fetch failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn fetch_in_mode(
        &self,
        mode: Mode,
        descriptor: &RequestDescriptor,
        deadline: Option<Instant>,
    ) -> Result<FetchOutcome, BridgeError> {
        if deadline_passed(deadline) {
            return Err(BridgeError::DeadlineExceeded {
                attempts: 0,
                last: None,
            });
        }

        let key = descriptor.cache_key(self.cache.key_prefix(), mode.as_str());
        let cached = within_deadline(deadline, self.cache.get::<Vec<EntityRecord>>(&key)).await;
        if let Some(hit) = cached.flatten() {
            return Ok(FetchOutcome {
                records: hit.data,
                provenance: hit.provenance,
                cache_hit: true,
                fallback_cause: None,
            });
        }
        if deadline_passed(deadline) {
            return Err(BridgeError::DeadlineExceeded {
                attempts: 0,
                last: None,
            });
        }

        match mode {
            Mode::Sandbox => {
                self.serve_synthetic(&key, descriptor, Provenance::Synthetic, None, deadline)
                    .await
            }
            Mode::Live => match self.fetch_live(descriptor, deadline).await {
                Ok(records) => Ok(self.serve_live(&key, records, deadline).await),
                Err(error) => Err(BridgeError::from_live_failure(mode, error)),
            },
            Mode::Hybrid => {
                let version = route_for(descriptor.entity).version;
                let live = if self.upstream.circuit_state(version) == CircuitState::Open {
                    debug!(%version, "circuit open; skipping live call");
                    Err(RetryError::Terminal {
                        attempts: 0,
                        source: UpstreamError::circuit_open(version),
                    })
                } else {
                    self.fetch_live(descriptor, deadline).await
                };

                match live {
                    Ok(records) => Ok(self.serve_live(&key, records, deadline).await),
                    Err(error) if !warrants_fallback(&error) || !self.synthetic.is_enabled() => {
                        Err(BridgeError::from_hybrid_failure(error))
                    }
                    Err(cause) => {
                        warn!(%version, error = %cause, "live path failed; serving synthetic fallback");
                        self.upstream.mark_degraded(version);
                        self.serve_synthetic(
                            &key,
                            descriptor,
                            Provenance::SyntheticFallback,
                            Some(cause),
                            deadline,
                        )
                        .await
                    }
                }
            }
        }
    }

    async fn serve_live(
        &self,
        key: &str,
        records: Vec<EntityRecord>,
        deadline: Option<Instant>,
    ) -> FetchOutcome {
        within_deadline(
            deadline,
            self.cache.set(key, Provenance::Live, &records, self.ttls.live),
        )
        .await;
        FetchOutcome {
            records,
            provenance: Provenance::Live,
            cache_hit: false,
            fallback_cause: None,
        }
    }

    async fn serve_synthetic(
        &self,
        key: &str,
        descriptor: &RequestDescriptor,
        provenance: Provenance,
        fallback_cause: Option<RetryError>,
        deadline: Option<Instant>,
    ) -> Result<FetchOutcome, BridgeError> {
        let records =
            self.synthetic
                .generate(descriptor.entity, &descriptor.scope_id, &descriptor.filters)?;
        within_deadline(
            deadline,
            self.cache.set(key, provenance, &records, self.ttls.synthetic),
        )
        .await;
        Ok(FetchOutcome {
            records,
            provenance,
            cache_hit: false,
            fallback_cause,
        })
    }

    async fn fetch_live(
        &self,
        descriptor: &RequestDescriptor,
        deadline: Option<Instant>,
    ) -> Result<Vec<EntityRecord>, RetryError> {
        let route = route_for(descriptor.entity);
        let login = if route.scoped {
            self.resolve_login(&descriptor.scope_id, deadline).await?
        } else {
            descriptor.scope_id.clone()
        };

        self.executor
            .execute(deadline, |attempt| {
                self.upstream
                    .fetch_records(&route, &login, descriptor, attempt.timeout)
            })
            .await
    }

    /// Maps a school id onto the upstream login serving it.
    async fn resolve_login(&self, scope_id: &str, deadline: Option<Instant>) -> Result<String, RetryError> {
        if !self.resolve_scope {
            return Ok(scope_id.to_owned());
        }

        let (links, _) = self.upstream_integrations(deadline).await?;
        match find_link(&links, scope_id) {
            Some(link) if link.active => Ok(link.login_id.clone()),
            Some(link) => Err(RetryError::Terminal {
                attempts: 0,
                source: UpstreamError::not_activated(format!(
                    "integration for school {scope_id} (login {}) is not activated",
                    link.login_id
                )),
            }),
            None => Err(RetryError::Terminal {
                attempts: 0,
                source: UpstreamError::not_found(format!(
                    "no client integration links school {scope_id}"
                )),
            }),
        }
    }

    fn integrations_key(&self, namespace: Mode) -> String {
        format!("{}{}:integrations", self.cache.key_prefix(), namespace.as_str())
    }

    /// Live integration listing, cached under the `live` namespace for both
    /// live-capable modes and for scope resolution.
    async fn upstream_integrations(
        &self,
        deadline: Option<Instant>,
    ) -> Result<(Vec<IntegrationLink>, bool), RetryError> {
        let key = self.integrations_key(Mode::Live);
        let cached = within_deadline(deadline, self.cache.get::<Vec<IntegrationLink>>(&key)).await;
        if let Some(hit) = cached.flatten() {
            return Ok((hit.data, true));
        }

        let links = self
            .executor
            .execute(deadline, |attempt| self.upstream.list_integrations(attempt.timeout))
            .await?;
        within_deadline(
            deadline,
            self.cache.set(&key, Provenance::Live, &links, self.ttls.integration),
        )
        .await;
        Ok((links, false))
    }

    async fn synthetic_integrations(
        &self,
        namespace: Mode,
        provenance: Provenance,
    ) -> Result<IntegrationsOutcome, BridgeError> {
        let key = self.integrations_key(namespace);
        if let Some(hit) = self.cache.get::<Vec<IntegrationLink>>(&key).await {
            return Ok(IntegrationsOutcome {
                links: hit.data,
                provenance: hit.provenance,
                cache_hit: true,
            });
        }

        let links = self.synthetic.integrations()?;
        self.cache
            .set(&key, provenance, &links, self.ttls.integration)
            .await;
        Ok(IntegrationsOutcome {
            links,
            provenance,
            cache_hit: false,
        })
    }

    /// School integrations visible to the configured credentials.
    pub async fn list_integrations(&self) -> Result<IntegrationsOutcome, BridgeError> {
        let mode = self.mode.snapshot();
        let live = match mode {
            Mode::Sandbox => return self.synthetic_integrations(mode, Provenance::Synthetic).await,
            Mode::Live | Mode::Hybrid => self.upstream_integrations(None).await,
        };

        match live {
            Ok((links, cache_hit)) => Ok(IntegrationsOutcome {
                links,
                provenance: Provenance::Live,
                cache_hit,
            }),
            Err(error) if mode == Mode::Live => Err(BridgeError::from_live_failure(mode, error)),
            Err(error) if !warrants_fallback(&error) || !self.synthetic.is_enabled() => {
                Err(BridgeError::from_hybrid_failure(error))
            }
            Err(cause) => {
                warn!(error = %cause, "integration listing failed; serving synthetic fallback");
                self.upstream.mark_degraded(INTEGRATIONS_ROUTE.version);
                self.synthetic_integrations(mode, Provenance::SyntheticFallback)
                    .await
            }
        }
    }

    /// Turns the integration for `login_id` on or off.
    ///
    /// Writes never fall back: in `sandbox` the change is acknowledged without
    /// effect, otherwise upstream failures are returned as is.
    pub async fn set_activation(
        &self,
        login_id: &str,
        api_type_id: Option<u32>,
        active: bool,
    ) -> Result<ActivationAck, BridgeError> {
        let mode = self.mode.snapshot();
        let api_type_id = api_type_id.unwrap_or(self.api_type_id);
        let mut ack = ActivationAck {
            login_id: login_id.to_owned(),
            api_type_id,
            active,
            provenance: Provenance::Synthetic,
        };

        if mode == Mode::Sandbox {
            info!(login_id, api_type_id, active, "sandbox activation acknowledged without upstream call");
            return Ok(ack);
        }

        self.executor
            .execute(None, |attempt| {
                self.upstream
                    .set_activation(login_id, api_type_id, active, attempt.timeout)
            })
            .await
            .map_err(BridgeError::Upstream)?;

        self.cache.invalidate(&self.integrations_key(Mode::Live)).await;
        self.cache.invalidate(&self.integrations_key(Mode::Hybrid)).await;
        info!(login_id, api_type_id, active, "integration activation updated");
        ack.provenance = Provenance::Live;
        Ok(ack)
    }
}

/// Assembles a [`ModeController`] from configuration.
///
/// The HTTP client, cache and mode state can be injected; otherwise they are
/// built from the configuration.
pub struct ModeControllerBuilder {
    config: BridgeConfig,
    http: Option<Arc<dyn HttpClient>>,
    cache: Option<ResponseCache>,
    mode_state: Option<ModeState>,
}

impl std::fmt::Debug for ModeControllerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeControllerBuilder")
            .field("config", &self.config)
            .field("http", &self.http.as_ref().map(|_| "injected"))
            .field("cache", &self.cache)
            .field("mode_state", &self.mode_state)
            .finish()
    }
}

impl ModeControllerBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            http: None,
            cache: None,
            mode_state: None,
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Shares an existing mode handle instead of creating one from config.
    pub fn with_mode_state(mut self, mode_state: ModeState) -> Self {
        self.mode_state = Some(mode_state);
        self
    }

    pub fn build(self) -> Result<ModeController, BridgeError> {
        self.config.validate()?;
        let config = self.config;

        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let mut upstream = UpstreamClient::new(config.upstream.clone(), http, config.circuit);
        if let Some(limit) = config.rate_limit {
            upstream = upstream.with_throttle(RequestThrottle::new(limit.window, limit.limit));
        }
        let upstream = Arc::new(upstream);

        let synthetic = Arc::new(SyntheticGenerator::from_config(
            &config.synthetic,
            config.upstream.api_type_id,
        ));
        let mode = self
            .mode_state
            .unwrap_or_else(|| ModeState::new(config.mode));
        let cache = self
            .cache
            .unwrap_or_else(|| ResponseCache::from_config(&config.cache));
        let health = HealthMonitor::new(mode.clone(), Arc::clone(&upstream), Arc::clone(&synthetic));

        Ok(ModeController {
            mode,
            upstream,
            synthetic,
            cache,
            executor: RetryExecutor::new(config.retry),
            health,
            ttls: CacheTtls {
                live: config.cache.live_ttl,
                synthetic: config.cache.synthetic_ttl,
                integration: config.cache.integration_ttl,
            },
            resolve_scope: config.upstream.resolve_scope,
            api_type_id: config.upstream.api_type_id,
        })
    }
}
