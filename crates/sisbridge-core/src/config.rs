//! Typed configuration loaded from `SISBRIDGE_*` environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `SISBRIDGE_MODE` | `hybrid` |
//! | `SISBRIDGE_V1_BASE_URL` / `SISBRIDGE_V2_BASE_URL` | `https://api.sis.local/api/v1` / `.../v2` |
//! | `SISBRIDGE_USERNAME` / `SISBRIDGE_PASSWORD` | unset |
//! | `SISBRIDGE_USERNAME_HEADER` / `SISBRIDGE_PASSWORD_HEADER` | `HTTP-X-USERNAME` / `HTTP-X-PASSWORD` |
//! | `SISBRIDGE_API_TYPE_ID` | `8` |
//! | `SISBRIDGE_RESOLVE_SCOPE` | `true` |
//! | `SISBRIDGE_REQUEST_TIMEOUT_MS` | `10000` |
//! | `SISBRIDGE_RETRY_ATTEMPTS` | `3` |
//! | `SISBRIDGE_RETRY_BASE_DELAY_MS` / `SISBRIDGE_RETRY_MAX_DELAY_MS` | `500` / `8000` |
//! | `SISBRIDGE_RETRY_JITTER` | `false` |
//! | `SISBRIDGE_CACHE_BACKEND` | `memory` (`redis`, `disabled`) |
//! | `SISBRIDGE_CACHE_PREFIX` | `sisbridge:` |
//! | `SISBRIDGE_CACHE_LIVE_TTL_SECS` / `_SYNTHETIC_TTL_SECS` / `_INTEGRATION_TTL_SECS` | `300` / `60` / `120` (at most 7 days) |
//! | `SISBRIDGE_CACHE_OP_TIMEOUT_MS` | `250` |
//! | `SISBRIDGE_REDIS_HOST` / `_PORT` / `_PASSWORD` / `_DB` | `127.0.0.1` / `6379` / unset / `0` |
//! | `SISBRIDGE_SYNTHETIC_ENABLED` | `true` |
//! | `SISBRIDGE_SANDBOX_SCHOOLS` | `1001,1002,1003` |
//! | `SISBRIDGE_RATE_LIMIT_PER_MINUTE` | `0` (disabled) |
//! | `SISBRIDGE_CIRCUIT_THRESHOLD` / `SISBRIDGE_CIRCUIT_OPEN_SECS` | `5` / `30` |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::http_client::HttpAuth;
use crate::mode::Mode;
use crate::retry::RetryPolicy;

const ENV_PREFIX: &str = "SISBRIDGE_";

/// Longest TTL any cache entry may be given.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Upper bound for retry delays, request timeouts and the circuit open window.
const MAX_POLICY_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration loading errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
    #[error("{var} must be set when {reason}")]
    Missing { var: String, reason: String },
}

/// Upstream connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub v1_base_url: String,
    pub v2_base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub username_header: String,
    pub password_header: String,
    /// API type id used when toggling integration activation.
    pub api_type_id: u32,
    /// Resolve school ids to upstream login ids through the integration
    /// listing before scoped calls.
    pub resolve_scope: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            v1_base_url: String::from("https://api.sis.local/api/v1"),
            v2_base_url: String::from("https://api.sis.local/api/v2"),
            username: None,
            password: None,
            username_header: String::from("HTTP-X-USERNAME"),
            password_header: String::from("HTTP-X-PASSWORD"),
            api_type_id: 8,
            resolve_scope: true,
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("v1_base_url", &self.v1_base_url)
            .field("v2_base_url", &self.v2_base_url)
            .field("username", &self.username.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("username_header", &self.username_header)
            .field("password_header", &self.password_header)
            .field("api_type_id", &self.api_type_id)
            .field("resolve_scope", &self.resolve_scope)
            .finish()
    }
}

impl UpstreamConfig {
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Header-pair auth when both credentials are set, otherwise none.
    pub fn auth(&self) -> HttpAuth {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => HttpAuth::HeaderPair {
                username_header: self.username_header.clone(),
                username: username.clone(),
                password_header: self.password_header.clone(),
                password: password.clone(),
            },
            _ => HttpAuth::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Redis,
    Disabled,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            _ => Err(String::from("expected one of memory, redis, disabled")),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    pub connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 6379,
            password: None,
            db: 0,
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl RedisConfig {
    /// `redis://[:password@]host:port/db`
    pub fn url(&self) -> String {
        let auth = self
            .password
            .as_deref()
            .map(|password| format!(":{}@", urlencoding::encode(password)))
            .unwrap_or_default();
        format!("redis://{auth}{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub key_prefix: String,
    pub live_ttl: Duration,
    pub synthetic_ttl: Duration,
    pub integration_ttl: Duration,
    /// Bound on every backend call; a slower backend counts as unavailable.
    pub operation_timeout: Duration,
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            key_prefix: String::from("sisbridge:"),
            live_ttl: Duration::from_secs(300),
            synthetic_ttl: Duration::from_secs(60),
            integration_ttl: Duration::from_secs(120),
            operation_timeout: Duration::from_millis(250),
            redis: RedisConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub enabled: bool,
    /// Schools the sandbox integration listing reports as linked.
    pub sandbox_schools: Vec<String>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sandbox_schools: vec![
                String::from("1001"),
                String::from("1002"),
                String::from("1003"),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub limit: u32,
}

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub mode: Mode,
    pub upstream: UpstreamConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub synthetic: SyntheticConfig,
    pub circuit: CircuitBreakerConfig,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            upstream: UpstreamConfig::default(),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            synthetic: SyntheticConfig::default(),
            circuit: CircuitBreakerConfig::default(),
            rate_limit: None,
        }
    }
}

impl BridgeConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which receives full variable
    /// names such as `SISBRIDGE_MODE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();

        let mode = env
            .parse::<Mode>("MODE")?
            .unwrap_or(defaults.mode);

        let upstream = UpstreamConfig {
            v1_base_url: env
                .url("V1_BASE_URL")?
                .unwrap_or(defaults.upstream.v1_base_url),
            v2_base_url: env
                .url("V2_BASE_URL")?
                .unwrap_or(defaults.upstream.v2_base_url),
            username: env.text("USERNAME"),
            password: env.text("PASSWORD"),
            username_header: env
                .text("USERNAME_HEADER")
                .unwrap_or(defaults.upstream.username_header),
            password_header: env
                .text("PASSWORD_HEADER")
                .unwrap_or(defaults.upstream.password_header),
            api_type_id: env
                .parse("API_TYPE_ID")?
                .unwrap_or(defaults.upstream.api_type_id),
            resolve_scope: env
                .flag("RESOLVE_SCOPE")?
                .unwrap_or(defaults.upstream.resolve_scope),
        };

        let retry = RetryPolicy {
            max_attempts: env
                .parse("RETRY_ATTEMPTS")?
                .unwrap_or(defaults.retry.max_attempts),
            base_delay: env
                .millis("RETRY_BASE_DELAY_MS")?
                .unwrap_or(defaults.retry.base_delay),
            max_delay: env
                .millis("RETRY_MAX_DELAY_MS")?
                .unwrap_or(defaults.retry.max_delay),
            per_attempt_timeout: env
                .millis("REQUEST_TIMEOUT_MS")?
                .unwrap_or(defaults.retry.per_attempt_timeout),
            jitter: env.flag("RETRY_JITTER")?.unwrap_or(defaults.retry.jitter),
        };

        let cache = CacheConfig {
            backend: env
                .parse("CACHE_BACKEND")?
                .unwrap_or(defaults.cache.backend),
            key_prefix: env
                .text("CACHE_PREFIX")
                .unwrap_or(defaults.cache.key_prefix),
            live_ttl: env
                .seconds("CACHE_LIVE_TTL_SECS")?
                .unwrap_or(defaults.cache.live_ttl),
            synthetic_ttl: env
                .seconds("CACHE_SYNTHETIC_TTL_SECS")?
                .unwrap_or(defaults.cache.synthetic_ttl),
            integration_ttl: env
                .seconds("CACHE_INTEGRATION_TTL_SECS")?
                .unwrap_or(defaults.cache.integration_ttl),
            operation_timeout: env
                .millis("CACHE_OP_TIMEOUT_MS")?
                .unwrap_or(defaults.cache.operation_timeout),
            redis: RedisConfig {
                host: env
                    .text("REDIS_HOST")
                    .unwrap_or(defaults.cache.redis.host),
                port: env.parse("REDIS_PORT")?.unwrap_or(defaults.cache.redis.port),
                password: env.text("REDIS_PASSWORD"),
                db: env.parse("REDIS_DB")?.unwrap_or(defaults.cache.redis.db),
                connect_timeout: defaults.cache.redis.connect_timeout,
            },
        };

        let synthetic = SyntheticConfig {
            enabled: env
                .flag("SYNTHETIC_ENABLED")?
                .unwrap_or(defaults.synthetic.enabled),
            sandbox_schools: env
                .text("SANDBOX_SCHOOLS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|school| !school.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or(defaults.synthetic.sandbox_schools),
        };

        let circuit = CircuitBreakerConfig {
            failure_threshold: env
                .parse("CIRCUIT_THRESHOLD")?
                .unwrap_or(defaults.circuit.failure_threshold),
            open_timeout: env
                .seconds("CIRCUIT_OPEN_SECS")?
                .unwrap_or(defaults.circuit.open_timeout),
        };

        let rate_limit = env
            .parse::<u32>("RATE_LIMIT_PER_MINUTE")?
            .filter(|limit| *limit > 0)
            .map(|limit| RateLimitConfig {
                window: Duration::from_secs(60),
                limit,
            });

        let config = Self {
            mode,
            upstream,
            retry,
            cache,
            synthetic,
            circuit,
            rate_limit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(invalid(
                "RETRY_ATTEMPTS",
                "0",
                "at least one attempt is required",
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(invalid(
                "RETRY_BASE_DELAY_MS",
                &self.retry.base_delay.as_millis().to_string(),
                "base delay exceeds max delay",
            ));
        }
        if self.retry.per_attempt_timeout.is_zero() {
            return Err(invalid(
                "REQUEST_TIMEOUT_MS",
                "0",
                "request timeout must be positive",
            ));
        }
        for (suffix, value) in [
            ("RETRY_MAX_DELAY_MS", self.retry.max_delay),
            ("REQUEST_TIMEOUT_MS", self.retry.per_attempt_timeout),
            ("CIRCUIT_OPEN_SECS", self.circuit.open_timeout),
        ] {
            if value > MAX_POLICY_DURATION {
                return Err(invalid(
                    suffix,
                    &value.as_secs().to_string(),
                    "must not exceed one day",
                ));
            }
        }
        for (suffix, ttl) in [
            ("CACHE_LIVE_TTL_SECS", self.cache.live_ttl),
            ("CACHE_SYNTHETIC_TTL_SECS", self.cache.synthetic_ttl),
            ("CACHE_INTEGRATION_TTL_SECS", self.cache.integration_ttl),
        ] {
            if ttl > MAX_CACHE_TTL {
                return Err(invalid(
                    suffix,
                    &ttl.as_secs().to_string(),
                    "TTL must not exceed 7 days",
                ));
            }
        }
        if self.cache.operation_timeout.is_zero() || self.cache.operation_timeout > MAX_POLICY_DURATION {
            return Err(invalid(
                "CACHE_OP_TIMEOUT_MS",
                &self.cache.operation_timeout.as_millis().to_string(),
                "cache operation timeout must be positive and at most one day",
            ));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(invalid(
                "CIRCUIT_THRESHOLD",
                "0",
                "threshold must be positive",
            ));
        }
        if self.synthetic.enabled && self.cache.synthetic_ttl > self.cache.live_ttl {
            return Err(invalid(
                "CACHE_SYNTHETIC_TTL_SECS",
                &self.cache.synthetic_ttl.as_secs().to_string(),
                "synthetic TTL must not exceed the live TTL",
            ));
        }
        if self.mode == Mode::Live && !self.upstream.has_credentials() {
            return Err(ConfigError::Missing {
                var: format!("{ENV_PREFIX}USERNAME and {ENV_PREFIX}PASSWORD"),
                reason: String::from("the mode is live"),
            });
        }
        if self.mode == Mode::Sandbox && !self.synthetic.enabled {
            return Err(invalid(
                "SYNTHETIC_ENABLED",
                "false",
                "sandbox mode needs the synthetic generator",
            ));
        }
        Ok(())
    }
}

fn invalid(suffix: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var: format!("{ENV_PREFIX}{suffix}"),
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn text(&self, suffix: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{suffix}"))
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, suffix: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(suffix)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|error| invalid(suffix, &raw, &error.to_string()))
            })
            .transpose()
    }

    fn flag(&self, suffix: &str) -> Result<Option<bool>, ConfigError> {
        self.text(suffix)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(invalid(suffix, &raw, "expected true or false")),
            })
            .transpose()
    }

    fn millis(&self, suffix: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(suffix)?.map(Duration::from_millis))
    }

    fn seconds(&self, suffix: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(suffix)?.map(Duration::from_secs))
    }

    fn url(&self, suffix: &str) -> Result<Option<String>, ConfigError> {
        self.text(suffix)
            .map(|raw| {
                if raw.starts_with("http://") || raw.starts_with("https://") {
                    Ok(raw.trim_end_matches('/').to_owned())
                } else {
                    Err(invalid(suffix, &raw, "expected an http(s) URL"))
                }
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<BridgeConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (format!("SISBRIDGE_{key}"), (*value).to_owned()))
            .collect();
        BridgeConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = config_from(&[]).expect("defaults are valid");
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.mode, Mode::Hybrid);
        assert_eq!(config.upstream.username_header, "HTTP-X-USERNAME");
    }

    #[test]
    fn overrides_are_parsed_and_trimmed() {
        let config = config_from(&[
            ("MODE", "sandbox"),
            ("V2_BASE_URL", "https://sis.example/api/v2/"),
            ("RETRY_ATTEMPTS", "5"),
            ("RETRY_BASE_DELAY_MS", "250"),
            ("CACHE_BACKEND", "redis"),
            ("REDIS_PASSWORD", "p@ss word"),
            ("SANDBOX_SCHOOLS", "2001, 2002,,"),
            ("RATE_LIMIT_PER_MINUTE", "120"),
        ])
        .expect("valid overrides");

        assert_eq!(config.mode, Mode::Sandbox);
        assert_eq!(config.upstream.v2_base_url, "https://sis.example/api/v2");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(
            config.cache.redis.url(),
            "redis://:p%40ss%20word@127.0.0.1:6379/0"
        );
        assert_eq!(config.synthetic.sandbox_schools, vec!["2001", "2002"]);
        assert_eq!(
            config.rate_limit,
            Some(RateLimitConfig {
                window: Duration::from_secs(60),
                limit: 120
            })
        );
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let error = config_from(&[("RETRY_ATTEMPTS", "many")]).expect_err("not a number");
        assert!(matches!(
            error,
            ConfigError::Invalid { ref var, .. } if var == "SISBRIDGE_RETRY_ATTEMPTS"
        ));

        let error = config_from(&[("V1_BASE_URL", "ftp://nope")]).expect_err("not http");
        assert!(error.to_string().contains("SISBRIDGE_V1_BASE_URL"));
    }

    #[test]
    fn oversized_ttls_and_timeouts_are_rejected() {
        let huge = (u64::MAX / 2).to_string();
        for var in [
            "CACHE_LIVE_TTL_SECS",
            "CACHE_INTEGRATION_TTL_SECS",
            "CIRCUIT_OPEN_SECS",
        ] {
            let error = config_from(&[(var, huge.as_str())]).expect_err("unbounded duration");
            assert!(
                error.to_string().contains(var),
                "{var} not named in '{error}'"
            );
        }

        let error = config_from(&[("CACHE_OP_TIMEOUT_MS", "0")]).expect_err("zero timeout");
        assert!(error.to_string().contains("SISBRIDGE_CACHE_OP_TIMEOUT_MS"));

        let week = MAX_CACHE_TTL.as_secs().to_string();
        let config = config_from(&[("CACHE_LIVE_TTL_SECS", week.as_str())]).expect("bound is inclusive");
        assert_eq!(config.cache.live_ttl, MAX_CACHE_TTL);
    }

    #[test]
    fn live_mode_requires_credentials() {
        assert!(matches!(
            config_from(&[("MODE", "live")]),
            Err(ConfigError::Missing { .. })
        ));
        assert!(config_from(&[("MODE", "live"), ("USERNAME", "u"), ("PASSWORD", "p")]).is_ok());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = config_from(&[("USERNAME", "bridge"), ("PASSWORD", "s3cret")])
            .expect("valid");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
