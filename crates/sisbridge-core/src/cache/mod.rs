//! Response cache shared by the live and synthetic paths.
//!
//! The cache is an optimization, never a dependency: every backend failure is
//! logged as a warning and treated as a miss or a dropped write. Backend calls
//! slower than the operation timeout count as failures.

mod memory;
mod redis;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::{CacheBackendKind, CacheConfig};
use crate::domain::UtcDateTime;
use crate::mode::Provenance;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Cache backend failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend '{backend}' unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
    },
    #[error("cache payload could not be encoded: {0}")]
    Codec(String),
}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Key-value store with per-key expiry.
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn connect(&self) -> CacheFuture<'_, ()>;

    fn disconnect(&self) -> CacheFuture<'_, ()>;

    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>>;

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> CacheFuture<'a, ()>;

    fn invalidate<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}

/// Backend that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

impl CacheBackend for DisabledCache {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn connect(&self) -> CacheFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn disconnect(&self) -> CacheFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn get<'a>(&'a self, _key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(async { Ok(None) })
    }

    fn set<'a>(&'a self, _key: &'a str, _value: String, _ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn invalidate<'a>(&'a self, _key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Stored form of a response: provenance travels with the data so a hit can
/// report where the data originally came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPayload<T> {
    pub provenance: Provenance,
    pub data: T,
    pub inserted_at: UtcDateTime,
    pub ttl_secs: u64,
}

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(250);

/// Typed, failure-tolerant facade over a [`CacheBackend`].
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    key_prefix: String,
    operation_timeout: Duration,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("backend", &self.backend.name())
            .field("key_prefix", &self.key_prefix)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let backend: Arc<dyn CacheBackend> = match config.backend {
            CacheBackendKind::Memory => Arc::new(MemoryCache::new()),
            CacheBackendKind::Redis => Arc::new(RedisCache::new(config.redis.clone())),
            CacheBackendKind::Disabled => Arc::new(DisabledCache),
        };
        Self::new(backend, config.key_prefix.clone()).with_operation_timeout(config.operation_timeout)
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledCache), "")
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    async fn bounded<T>(&self, operation: CacheFuture<'_, T>) -> Result<T, CacheError> {
        match tokio::time::timeout(self.operation_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Unavailable {
                backend: self.backend.name(),
                message: format!("no reply within {} ms", self.operation_timeout.as_millis()),
            }),
        }
    }

    /// Connects the backend. Failure leaves the cache in pass-through.
    ///
    /// Not bounded by the operation timeout; backends apply their own connect
    /// timeout.
    pub async fn connect(&self) -> bool {
        match self.backend.connect().await {
            Ok(()) => true,
            Err(error) => {
                warn!(backend = self.backend.name(), error = %error, "cache unavailable; continuing without cache");
                false
            }
        }
    }

    pub async fn disconnect(&self) {
        if let Err(error) = self.bounded(self.backend.disconnect()).await {
            warn!(backend = self.backend.name(), error = %error, "cache disconnect failed");
        }
    }

    pub async fn get<T>(&self, key: &str) -> Option<CachedPayload<T>>
    where
        T: DeserializeOwned,
    {
        let raw = match self.bounded(self.backend.get(key)).await {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(backend = self.backend.name(), key, error = %error, "cache unavailable; treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(payload) => Some(payload),
            Err(error) => {
                warn!(key, error = %error, "discarding undecodable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    pub async fn set<T>(&self, key: &str, provenance: Provenance, data: &T, ttl: Duration)
    where
        T: Serialize,
    {
        if ttl.is_zero() {
            return;
        }
        let payload = CachedPayload {
            provenance,
            data,
            inserted_at: UtcDateTime::now(),
            ttl_secs: ttl.as_secs(),
        };
        let encoded = match serde_json::to_string(&payload) {
            Ok(encoded) => encoded,
            Err(error) => {
                warn!(key, error = %CacheError::Codec(error.to_string()), "cache write skipped");
                return;
            }
        };
        if let Err(error) = self.bounded(self.backend.set(key, encoded, ttl)).await {
            warn!(backend = self.backend.name(), key, error = %error, "cache unavailable; write dropped");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(error) = self.bounded(self.backend.invalidate(key)).await {
            warn!(backend = self.backend.name(), key, error = %error, "cache unavailable; invalidation dropped");
        }
    }
}
