use std::fmt::{Display, Formatter};

use serde::Serialize;

use super::routes::ApiVersion;
use crate::http_client::{HttpError, HttpErrorKind};

/// Upstream failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    Timeout,
    ConnectionFailed,
    ServerError,
    Unauthorized,
    Forbidden,
    NotActivated,
    NotFound,
    BadRequest,
    RateLimited,
    InvalidResponse,
    CircuitOpen,
}

impl UpstreamErrorKind {
    /// Timeouts, connection failures and 5xx responses may succeed on retry.
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed | Self::ServerError
        )
    }
}

/// Structured upstream error shared by every live path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    kind: UpstreamErrorKind,
    message: String,
    status: Option<u16>,
    version: Option<ApiVersion>,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            version: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Timeout, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::ConnectionFailed, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::NotFound, message)
    }

    pub fn not_activated(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::NotActivated, message)
    }

    pub fn circuit_open(version: ApiVersion) -> Self {
        Self::new(
            UpstreamErrorKind::CircuitOpen,
            format!("{version} circuit breaker is open; skipping upstream call"),
        )
        .with_version(version)
    }

    /// Maps a transport failure. Unclassified transport errors are treated
    /// like dropped connections.
    pub fn from_transport(error: &HttpError) -> Self {
        match error.kind() {
            HttpErrorKind::Timeout => Self::timeout(error.message()),
            HttpErrorKind::Connect | HttpErrorKind::Other => {
                Self::connection_failed(error.message())
            }
        }
    }

    /// Maps a non-2xx response, preferring the upstream's own message.
    pub fn from_status(status: u16, body: &str) -> Self {
        let upstream_message = extract_error_message(body);
        let kind = match status {
            401 => UpstreamErrorKind::Unauthorized,
            403 if mentions_activation(upstream_message.as_deref()) => {
                UpstreamErrorKind::NotActivated
            }
            403 => UpstreamErrorKind::Forbidden,
            404 => UpstreamErrorKind::NotFound,
            429 => UpstreamErrorKind::RateLimited,
            500..=599 => UpstreamErrorKind::ServerError,
            _ if mentions_activation(upstream_message.as_deref()) => {
                UpstreamErrorKind::NotActivated
            }
            _ => UpstreamErrorKind::BadRequest,
        };
        let message = upstream_message
            .unwrap_or_else(|| format!("upstream returned status {status}"));

        Self {
            kind,
            message,
            status: Some(status),
            version: None,
        }
    }

    pub fn with_version(mut self, version: ApiVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub const fn kind(&self) -> UpstreamErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn version(&self) -> Option<ApiVersion> {
        self.version
    }

    pub const fn retryable(&self) -> bool {
        self.kind.is_transient()
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            UpstreamErrorKind::Timeout => "upstream.timeout",
            UpstreamErrorKind::ConnectionFailed => "upstream.connection_failed",
            UpstreamErrorKind::ServerError => "upstream.server_error",
            UpstreamErrorKind::Unauthorized => "upstream.unauthorized",
            UpstreamErrorKind::Forbidden => "upstream.forbidden",
            UpstreamErrorKind::NotActivated => "upstream.not_activated",
            UpstreamErrorKind::NotFound => "upstream.not_found",
            UpstreamErrorKind::BadRequest => "upstream.bad_request",
            UpstreamErrorKind::RateLimited => "upstream.rate_limited",
            UpstreamErrorKind::InvalidResponse => "upstream.invalid_response",
            UpstreamErrorKind::CircuitOpen => "upstream.circuit_open",
        }
    }
}

impl Display for UpstreamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.version, self.status) {
            (Some(version), Some(status)) => {
                write!(f, "{version} {status}: {} ({})", self.message, self.code())
            }
            (Some(version), None) => write!(f, "{version}: {} ({})", self.message, self.code()),
            (None, Some(status)) => write!(f, "{status}: {} ({})", self.message, self.code()),
            (None, None) => write!(f, "{} ({})", self.message, self.code()),
        }
    }
}

impl std::error::Error for UpstreamError {}

fn extract_error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    ["message", "error", "error_description", "detail"]
        .iter()
        .find_map(|field| match value.get(field)? {
            serde_json::Value::String(text) if !text.trim().is_empty() => {
                Some(text.trim().to_owned())
            }
            serde_json::Value::Object(inner) => inner
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned),
            _ => None,
        })
}

fn mentions_activation(message: Option<&str>) -> bool {
    message.is_some_and(|text| {
        let lowered = text.to_ascii_lowercase();
        lowered.contains("not activated")
            || lowered.contains("not been activated")
            || lowered.contains("activate the integration")
    })
}
