use sisbridge_core::{HealthState, ModeController};

use crate::error::CliError;

use super::CommandResult;

pub fn run(controller: &ModeController) -> Result<CommandResult, CliError> {
    let report = controller.health();
    let unhealthy = report.overall_status == HealthState::Unhealthy;
    Ok(CommandResult::ok(serde_json::to_value(&report)?).unhealthy(unhealthy))
}
