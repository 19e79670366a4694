use anyhow::Context;
use qc_core::entities::VisitRecord;
use qc_core::enums::Dataset;
use qc_core::qc::StructuredError;
use qc_engine::{FailureGate, InlineValidation, JsonSchemaValidator, VisitChecker};
use qc_store::NewVisit;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::CheckArgs;
use crate::commands::shared::{record_keys, record_module};
use crate::context::AppContext;
use crate::input::{locator_for, read_visit};
use crate::output::output;

#[derive(Debug, Serialize)]
struct CheckResult {
    file_name: String,
    passed: bool,
    errors: Vec<StructuredError>,
}

/// Handle `qcf check`.
pub async fn handle(args: &CheckArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let fields = read_visit(&args.file)?;
    let locator = locator_for(&args.file, args.container.as_deref())?;
    let keys = record_keys(&ctx.config, record_module(&fields).as_deref());

    if let Ok(record) = VisitRecord::from_fields(fields.clone(), &keys, None) {
        ctx.db
            .upsert_visit(&NewVisit {
                dataset: Dataset::Current,
                participant: record.participant,
                module: record.module,
                locator: locator.clone(),
                session_id: None,
                fields: record.fields,
            })
            .await
            .with_context(|| format!("failed to store {}", args.file.display()))?;
    }

    let loader = ctx.definitions()?;
    let inline = InlineValidation::new(
        &ctx.db,
        &loader,
        JsonSchemaValidator,
        ctx.config.coordinator.validation_stage.clone(),
    );
    let gate = FailureGate::new(&ctx.db, ctx.config.coordinator.gate_retries);
    let checker = VisitChecker::new(&inline, &gate, keys);

    let outcome = checker
        .check(&locator, fields)
        .await
        .with_context(|| format!("failed to check {}", args.file.display()))?;
    output(
        &CheckResult {
            file_name: locator.file_name,
            passed: outcome.passed,
            errors: outcome.errors,
        },
        flags.format,
    )
}
