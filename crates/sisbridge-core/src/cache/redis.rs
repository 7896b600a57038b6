//! Redis cache backend.
//!
//! Entries are plain strings written with `SET key value EX ttl`. The
//! connection is established once by [`CacheBackend::connect`]; until then, or
//! after a failed connect, every operation reports the backend unavailable.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

use super::{CacheBackend, CacheError, CacheFuture};
use crate::config::RedisConfig;

const BACKEND: &str = "redis";

pub struct RedisCache {
    config: RedisConfig,
    connection: RwLock<Option<ConnectionManager>>,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub fn new(config: RedisConfig) -> Self {
        Self {
            config,
            connection: RwLock::new(None),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| unavailable("not connected"))
    }
}

fn unavailable(message: impl Into<String>) -> CacheError {
    CacheError::Unavailable {
        backend: BACKEND,
        message: message.into(),
    }
}

fn backend_error(error: RedisError) -> CacheError {
    unavailable(error.to_string())
}

impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn connect(&self) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            let client = Client::open(self.config.url()).map_err(backend_error)?;
            let manager = tokio::time::timeout(
                self.config.connect_timeout,
                ConnectionManager::new(client),
            )
            .await
            .map_err(|_| {
                unavailable(format!(
                    "connect to {}:{} timed out after {} ms",
                    self.config.host,
                    self.config.port,
                    self.config.connect_timeout.as_millis()
                ))
            })?
            .map_err(backend_error)?;

            *self.connection.write().await = Some(manager);
            tracing::info!(host = %self.config.host, port = self.config.port, db = self.config.db, "redis cache connected");
            Ok(())
        })
    }

    fn disconnect(&self) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            self.connection.write().await.take();
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut connection = self.connection().await?;
            connection
                .get::<_, Option<String>>(key)
                .await
                .map_err(backend_error)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut connection = self.connection().await?;
            connection
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(backend_error)
        })
    }

    fn invalidate<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut connection = self.connection().await?;
            connection.del::<_, ()>(key).await.map_err(backend_error)
        })
    }
}
