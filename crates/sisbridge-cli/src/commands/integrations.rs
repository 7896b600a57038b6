use serde_json::json;
use sisbridge_core::ModeController;

use crate::error::CliError;

use super::CommandResult;

pub async fn run(controller: &ModeController) -> Result<CommandResult, CliError> {
    let outcome = controller.list_integrations().await?;
    let active = outcome.links.iter().filter(|link| link.active).count();
    let data = json!({
        "count": outcome.links.len(),
        "active": active,
        "integrations": outcome.links,
    });
    Ok(CommandResult::ok(data).with_provenance(outcome.provenance, outcome.cache_hit))
}
