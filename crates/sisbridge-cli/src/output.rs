use serde::Serialize;
use serde_json::Value;

use sisbridge_core::{Mode, Provenance};

use crate::error::CliError;

/// Metadata printed alongside every command result.
#[derive(Debug, Serialize)]
pub struct EnvelopeMeta {
    pub request_id: String,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    pub cache_hit: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub unhealthy: bool,
}

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub meta: EnvelopeMeta,
    pub data: Value,
}

pub fn render(envelope: &Envelope, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };
    println!("{payload}");
    Ok(())
}
