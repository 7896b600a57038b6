//! # sisbridge Core
//!
//! Resilient access layer in front of an unreliable school-information-system
//! (SIS) API.
//!
//! ## Overview
//!
//! Every read goes through a [`ModeController`], which decides per request
//! whether to call the live upstream or synthesize an equivalent response:
//!
//! - **Modes**: `live`, `sandbox` and `hybrid`, switchable at runtime
//! - **Retries** with exponential backoff, per-attempt timeouts and caller deadlines
//! - **Response cache** (memory, Redis or disabled) that tolerates backend outages
//! - **Deterministic synthetic data** shaped exactly like normalized live records
//! - **Health report** derived from endpoint state, circuits and the generator
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Cache backends and the typed response cache |
//! | [`circuit_breaker`] | Per-version circuit breaker |
//! | [`config`] | `SISBRIDGE_*` environment configuration |
//! | [`controller`] | Mode controller and builder |
//! | [`domain`] | Descriptors, records, schema table, integration links |
//! | [`error`] | Validation errors |
//! | [`health`] | Health monitor |
//! | [`http_client`] | HTTP transport seam |
//! | [`mode`] | Mode state and provenance |
//! | [`retry`] | Retry/backoff executor |
//! | [`synthetic`] | Synthetic data generator |
//! | [`throttling`] | Client-side request quota |
//! | [`upstream`] | Upstream client, routes, normalization, endpoint state |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sisbridge_core::{BridgeConfig, EntityType, ModeController, RequestDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = ModeController::builder(BridgeConfig::from_env()?).build()?;
//!     controller.connect().await;
//!
//!     let descriptor = RequestDescriptor::new(EntityType::Learners, "1001")?;
//!     let outcome = controller.fetch(&descriptor).await?;
//!     println!("{} learners ({})", outcome.records.len(), outcome.provenance);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Mode Controller │────▶│ Response Cache   │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!    ┌─────┴──────────────────┐
//!    ▼                        ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Retry Executor  │     │ Synthetic        │
//! └────────┬────────┘     │ Generator        │
//!          ▼              └──────────────────┘
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Upstream Client │────▶│ Circuit Breaker  │
//! └────────┬────────┘     └──────────────────┘
//!          ▼
//! ┌─────────────────┐
//! │ HTTP Client     │
//! └─────────────────┘
//! ```
//!
//! ## Security
//!
//! - Credentials are read from the environment and redacted from `Debug` output
//! - Nothing on a request path panics; every failure is a typed `Result`

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod health;
pub mod http_client;
pub mod mode;
pub mod retry;
pub mod synthetic;
pub mod throttling;
pub mod upstream;

// Caching
pub use cache::{CacheBackend, CacheError, CachedPayload, MemoryCache, RedisCache, ResponseCache};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Configuration
pub use config::{
    BridgeConfig, CacheBackendKind, CacheConfig, ConfigError, RateLimitConfig, RedisConfig,
    SyntheticConfig, UpstreamConfig,
};

// Orchestration
pub use controller::{
    ActivationAck, BridgeError, ControllerStatus, FetchOutcome, IntegrationsOutcome,
    ModeController, ModeControllerBuilder,
};

// Domain models
pub use domain::{
    EntityRecord, EntityType, Grade, IntegrationLink, IsoDate, LookupTable, RequestDescriptor,
    RequestFilters, UtcDateTime,
};

// Error types
pub use error::ValidationError;

// Health
pub use health::{HealthMonitor, HealthReport, HealthState, VersionHealth};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};

// Modes
pub use mode::{Mode, ModeState, Provenance};

// Retry logic
pub use retry::{AttemptContext, Backoff, RetryError, RetryExecutor, RetryPolicy};

// Synthetic data
pub use synthetic::{SyntheticError, SyntheticGenerator};

// Throttling
pub use throttling::RequestThrottle;

// Upstream
pub use upstream::{ApiVersion, UpstreamClient, UpstreamError, UpstreamErrorKind};
