use std::collections::BTreeMap;

use anyhow::Context;
use qc_config::{CoordinatorConfig, ValidationMode};
use qc_core::entities::{QueuedVisit, QueuedVisits};
use qc_core::enums::Dataset;
use qc_engine::{
    BatchReport, FailureGate, InlineValidation, JobValidation, JsonSchemaValidator, QcCoordinator,
    VisitValidation,
};
use qc_jobs::{JobPoll, PollSettings};
use qc_store::NewVisit;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{CoordinateArgs, DatasetArg};
use crate::commands::shared::parse_record;
use crate::context::AppContext;
use crate::input::{locator_for, read_visit};
use crate::output::output;

#[derive(Debug, Serialize)]
struct StoredVisit {
    file_name: String,
    participant: String,
    module: String,
}

/// Handle `qcf coordinate`.
pub async fn handle(args: &CoordinateArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let dataset = match args.dataset {
        DatasetArg::Current => Dataset::Current,
        DatasetArg::Legacy => Dataset::Legacy,
    };

    let mut stored = Vec::with_capacity(args.files.len());
    let mut batches: BTreeMap<(String, String), QueuedVisits> = BTreeMap::new();
    for path in &args.files {
        let fields = read_visit(path)?;
        let record = parse_record(&ctx.config, fields, &path.display().to_string())?;
        let locator = locator_for(path, None)?;
        ctx.db
            .upsert_visit(&NewVisit {
                dataset,
                participant: record.participant.clone(),
                module: record.module.clone(),
                locator: locator.clone(),
                session_id: None,
                fields: record.fields.clone(),
            })
            .await
            .with_context(|| format!("failed to store {}", path.display()))?;

        batches
            .entry((record.participant.clone(), record.module.clone()))
            .or_insert_with(|| QueuedVisits {
                participant: record.participant.clone(),
                module: record.module.clone(),
                visits: Vec::new(),
            })
            .visits
            .push(QueuedVisit {
                file_name: locator.file_name.clone(),
                file_id: locator.file_id.clone(),
                visit_date: record.visit_date,
            });
        stored.push(StoredVisit {
            file_name: locator.file_name,
            participant: record.participant,
            module: record.module,
        });
    }

    if args.store_only || dataset == Dataset::Legacy {
        return output(&stored, flags.format);
    }

    let mut config = ctx.config.coordinator.clone();
    config.check_all |= args.check_all;
    let batches: Vec<QueuedVisits> = batches.into_values().collect();

    let reports = match config.mode {
        ValidationMode::Job => {
            let poll = JobPoll::new(&ctx.db, PollSettings::from(&ctx.config.poll), ctx.cancel.clone());
            let runner = JobValidation::new(&ctx.db, poll, config.validation_stage.clone());
            run_batches(ctx, &runner, &config, &batches).await?
        }
        ValidationMode::Inline => {
            let loader = ctx.definitions()?;
            let runner = InlineValidation::new(
                &ctx.db,
                &loader,
                JsonSchemaValidator,
                config.validation_stage.clone(),
            );
            run_batches(ctx, &runner, &config, &batches).await?
        }
    };
    output(&reports, flags.format)
}

async fn run_batches<V: VisitValidation>(
    ctx: &AppContext,
    runner: &V,
    config: &CoordinatorConfig,
    batches: &[QueuedVisits],
) -> anyhow::Result<Vec<BatchReport>> {
    let gate = FailureGate::new(&ctx.db, config.gate_retries);
    let coordinator = QcCoordinator::new(&ctx.db, &gate, runner, config);

    let mut reports = Vec::with_capacity(batches.len());
    for batch in batches {
        let report = coordinator
            .run(batch, &ctx.cancel)
            .await
            .with_context(|| format!("failed to coordinate {}/{}", batch.participant, batch.module))?;
        tracing::info!(
            participant = %batch.participant,
            module = %batch.module,
            validated = report.validated(),
            blocked = report.visits.len() - report.validated(),
            "coordinated batch"
        );
        reports.push(report);
    }
    Ok(reports)
}
