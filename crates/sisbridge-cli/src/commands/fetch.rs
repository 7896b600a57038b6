use std::time::Duration;

use serde_json::json;
use sisbridge_core::{
    EntityType, Grade, IsoDate, LookupTable, ModeController, RequestDescriptor, ValidationError,
};

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &FetchArgs,
    controller: &ModeController,
    deadline_ms: Option<u64>,
) -> Result<CommandResult, CliError> {
    let descriptor = descriptor_from_args(args)?;
    let deadline = deadline_ms
        .map(|millis| tokio::time::Instant::now() + Duration::from_millis(millis));

    let outcome = controller.fetch_with_deadline(&descriptor, deadline).await?;
    let data = json!({
        "entity": descriptor.entity,
        "scope_id": descriptor.scope_id,
        "count": outcome.records.len(),
        "records": outcome.records,
    });

    let mut result = CommandResult::ok(data).with_provenance(outcome.provenance, outcome.cache_hit);
    if let Some(cause) = outcome.fallback_cause {
        result = result.with_warning(format!("served synthetic fallback: {cause}"));
    }
    Ok(result)
}

fn descriptor_from_args(args: &FetchArgs) -> Result<RequestDescriptor, CliError> {
    let entity: EntityType = args.entity.parse()?;
    let mut descriptor = RequestDescriptor::new(entity, args.scope.as_str())?;

    match (args.page, args.page_size) {
        (page, Some(page_size)) => {
            descriptor = descriptor.with_page(page.unwrap_or(1), page_size)?;
        }
        (Some(_), None) => return Err(ValidationError::PageSizeRequired.into()),
        (None, None) => {}
    }
    if let Some(grade) = &args.grade {
        descriptor = descriptor.with_grade(Grade::parse(grade)?);
    }
    if args.from.is_some() || args.to.is_some() {
        let from = args.from.as_deref().map(IsoDate::parse).transpose()?;
        let to = args.to.as_deref().map(IsoDate::parse).transpose()?;
        descriptor = descriptor.with_date_range(from, to)?;
    }
    if let Some(table) = &args.table {
        descriptor = descriptor.with_lookup_table(table.parse::<LookupTable>()?);
    }

    descriptor.validate()?;
    Ok(descriptor)
}
