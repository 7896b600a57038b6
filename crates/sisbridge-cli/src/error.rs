use thiserror::Error;

use sisbridge_core::BridgeError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] sisbridge_core::ValidationError),

    #[error(transparent)]
    Config(#[from] sisbridge_core::ConfigError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Config(_) => 2,
            Self::Bridge(error) => match error {
                BridgeError::Validation(_) | BridgeError::Config(_) => 2,
                BridgeError::FallbackExhausted { .. } | BridgeError::Upstream(_) => 3,
                BridgeError::SyntheticUnavailable(_) => 6,
                BridgeError::DeadlineExceeded { .. } => 7,
            },
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
