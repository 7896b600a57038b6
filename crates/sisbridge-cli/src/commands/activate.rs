use sisbridge_core::{ModeController, Provenance};

use crate::cli::ActivateArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &ActivateArgs, controller: &ModeController) -> Result<CommandResult, CliError> {
    let ack = controller
        .set_activation(&args.login, args.api_type, !args.off)
        .await?;

    let mut result = CommandResult::ok(serde_json::to_value(&ack)?).with_provenance(ack.provenance, false);
    if ack.provenance == Provenance::Synthetic {
        result = result.with_warning("sandbox mode: activation acknowledged but not sent upstream");
    }
    Ok(result)
}
