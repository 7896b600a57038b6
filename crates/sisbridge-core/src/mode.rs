use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Routing mode for upstream reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Upstream only; failures are surfaced.
    Live,
    /// Synthetic data only; the upstream is never called.
    Sandbox,
    /// Prefer the upstream, substitute synthetic data on failure.
    #[default]
    Hybrid,
}

impl Mode {
    pub const ALL: [Self; 3] = [Self::Live, Self::Sandbox, Self::Hybrid];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Sandbox => "sandbox",
            Self::Hybrid => "hybrid",
        }
    }

    pub const fn uses_upstream(self) -> bool {
        matches!(self, Self::Live | Self::Hybrid)
    }

    const fn to_bits(self) -> u8 {
        match self {
            Self::Live => 0,
            Self::Sandbox => 1,
            Self::Hybrid => 2,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Live,
            1 => Self::Sandbox,
            _ => Self::Hybrid,
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "sandbox" | "mock" => Ok(Self::Sandbox),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(ValidationError::InvalidMode {
                value: other.to_owned(),
            }),
        }
    }
}

/// Shared, atomically switchable mode.
///
/// Requests take a [`ModeState::snapshot`] when they start and route on that
/// value for their whole lifetime, so a switch only affects requests that
/// begin after it.
#[derive(Debug, Clone)]
pub struct ModeState {
    bits: Arc<AtomicU8>,
}

impl ModeState {
    pub fn new(initial: Mode) -> Self {
        Self {
            bits: Arc::new(AtomicU8::new(initial.to_bits())),
        }
    }

    pub fn snapshot(&self) -> Mode {
        Mode::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Switches to `mode` and returns the previous mode.
    pub fn switch(&self, mode: Mode) -> Mode {
        Mode::from_bits(self.bits.swap(mode.to_bits(), Ordering::AcqRel))
    }
}

impl Default for ModeState {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

/// Where a record set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "live")]
    Live,
    #[serde(rename = "synthetic")]
    Synthetic,
    #[serde(rename = "synthetic-fallback")]
    SyntheticFallback,
}

impl Provenance {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Synthetic => "synthetic",
            Self::SyntheticFallback => "synthetic-fallback",
        }
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
