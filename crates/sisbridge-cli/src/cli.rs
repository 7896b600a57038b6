//! CLI argument definitions for sisbridge.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch entity records for a school |
//! | `integrations` | List school integrations |
//! | `activate` | Turn an integration on or off |
//! | `health` | Print the composite health report |
//! | `status` | Print mode and path availability |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--mode` | `SISBRIDGE_MODE` | Override the routing mode |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--deadline-ms` | none | Caller deadline for `fetch` |
//! | `-v`, `--verbose` | `warn` | Repeat for info, debug, trace logs |
//! | `--log-json` | `false` | Emit logs as JSON on stderr |
//!
//! # Examples
//!
//! ```bash
//! sisbridge --mode sandbox fetch learners 1001 --grade 5 --pretty
//! sisbridge fetch lookups global --table subjects
//! sisbridge --deadline-ms 2000 fetch marks 1001 --from 2025-01-01 --to 2025-03-31
//! sisbridge activate sbx-1001 --off
//! ```

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use sisbridge_core::Mode;

/// sisbridge - drive the resilient SIS access layer.
#[derive(Debug, Parser)]
#[command(
    name = "sisbridge",
    author,
    version,
    about = "Drive the resilient SIS access layer from the terminal",
    long_about = "sisbridge drives the live/sandbox/hybrid access layer from the terminal. \
Configuration is read from SISBRIDGE_* environment variables; output is JSON on stdout \
and logs go to stderr."
)]
pub struct Cli {
    /// Routing mode for this invocation.
    #[arg(long, global = true, value_enum)]
    pub mode: Option<ModeArg>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Give up with a deadline error after this many milliseconds.
    #[arg(long, global = true)]
    pub deadline_ms: Option<u64>,

    /// Increase log verbosity.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Live,
    Sandbox,
    Hybrid,
}

impl From<ModeArg> for Mode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Live => Mode::Live,
            ModeArg::Sandbox => Mode::Sandbox,
            ModeArg::Hybrid => Mode::Hybrid,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch records for one entity type and school.
    ///
    /// # Examples
    ///
    ///   sisbridge fetch learners 1001
    ///   sisbridge fetch staff 1001 --page 2 --page-size 10
    Fetch(FetchArgs),

    /// List school integrations visible to the configured credentials.
    Integrations,

    /// Activate or deactivate the integration for an upstream login.
    Activate(ActivateArgs),

    /// Print the composite health report.
    ///
    /// Exits with code 3 when the overall status is unhealthy.
    Health,

    /// Print the current mode and whether each path is available.
    Status,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Entity type: schools, learners, staff, parents, marks or lookups.
    pub entity: String,

    /// School identifier (any label for lookups).
    pub scope: String,

    /// 1-based page number; requires --page-size.
    #[arg(long, requires = "page_size")]
    pub page: Option<u32>,

    #[arg(long)]
    pub page_size: Option<u32>,

    /// Grade filter: R or 1..12.
    #[arg(long)]
    pub grade: Option<String>,

    /// Earliest assessment date (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<String>,

    /// Latest assessment date (YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<String>,

    /// Lookup table for `lookups`.
    #[arg(long)]
    pub table: Option<String>,
}

#[derive(Debug, Args)]
pub struct ActivateArgs {
    /// Upstream login id of the school.
    pub login: String,

    /// API type id; defaults to SISBRIDGE_API_TYPE_ID.
    #[arg(long)]
    pub api_type: Option<u32>,

    /// Deactivate instead of activate.
    #[arg(long, default_value_t = false)]
    pub off: bool,
}
