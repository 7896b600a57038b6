use sisbridge_core::ModeController;

use crate::error::CliError;

use super::CommandResult;

pub fn run(controller: &ModeController) -> Result<CommandResult, CliError> {
    let status = controller.status();
    let mut result = CommandResult::ok(serde_json::to_value(status)?);
    if !status.live_available && status.mode.uses_upstream() {
        result = result.with_warning("live upstream unavailable: missing credentials or open circuits");
    }
    Ok(result)
}
