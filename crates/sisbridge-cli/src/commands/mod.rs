mod activate;
mod fetch;
mod health;
mod integrations;
mod status;

use std::time::Instant;

use serde_json::Value;
use sisbridge_core::{BridgeConfig, ModeController, Provenance};
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::output::{Envelope, EnvelopeMeta};

pub struct CommandResult {
    pub data: Value,
    pub provenance: Option<Provenance>,
    pub cache_hit: bool,
    pub warnings: Vec<String>,
    pub unhealthy: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            provenance: None,
            cache_hit: false,
            warnings: Vec::new(),
            unhealthy: false,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance, cache_hit: bool) -> Self {
        self.provenance = Some(provenance);
        self.cache_hit = cache_hit;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn unhealthy(mut self, unhealthy: bool) -> Self {
        self.unhealthy = unhealthy;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let mut config = BridgeConfig::from_env()?;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    let controller = ModeController::builder(config).build()?;

    let mut warnings = Vec::new();
    let cache_connected = controller.connect().await;
    tracing::info!(
        mode = %controller.mode(),
        cache = controller.cache().backend_name(),
        cache_connected,
        "controller ready"
    );
    if !cache_connected {
        warnings.push(format!(
            "cache backend '{}' unavailable; running without cache",
            controller.cache().backend_name()
        ));
    }

    let started = Instant::now();
    let result = match &cli.command {
        Command::Fetch(args) => fetch::run(args, &controller, cli.deadline_ms).await,
        Command::Integrations => integrations::run(&controller).await,
        Command::Activate(args) => activate::run(args, &controller).await,
        Command::Health => health::run(&controller),
        Command::Status => status::run(&controller),
    };
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    controller.shutdown().await;

    let CommandResult {
        data,
        provenance,
        cache_hit,
        warnings: command_warnings,
        unhealthy,
    } = result?;
    warnings.extend(command_warnings);

    Ok(Envelope {
        meta: EnvelopeMeta {
            request_id: Uuid::new_v4().to_string(),
            mode: controller.mode(),
            provenance,
            cache_hit,
            latency_ms,
            warnings,
            unhealthy,
        },
        data,
    })
}
