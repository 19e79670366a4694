use anyhow::Context;
use qc_core::entities::VisitRecord;
use qc_core::qc::StructuredError;
use qc_engine::Preprocessor;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::PreprocessArgs;
use crate::commands::shared::{record_keys, record_module};
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct RecordResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    participant: Option<String>,
    passed: bool,
    errors: Vec<StructuredError>,
}

/// Handle `qcf preprocess`.
pub async fn handle(args: &PreprocessArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let records = crate::input::read_records(&args.file)?;
    let preprocessor = Preprocessor::new(&ctx.db, &ctx.config.preprocess);

    let mut results = Vec::with_capacity(records.len());
    for (line, fields) in records {
        let module = args.module.clone().or_else(|| record_module(&fields));
        let keys = record_keys(&ctx.config, module.as_deref());
        let record = match VisitRecord::from_fields(fields, &keys, line) {
            Ok(record) => record,
            Err(errors) => {
                results.push(RecordResult {
                    line,
                    participant: None,
                    passed: false,
                    errors,
                });
                continue;
            }
        };
        let module = module.unwrap_or_else(|| record.module.clone());
        let report = preprocessor
            .preprocess(&record, &module, line)
            .await
            .with_context(|| format!("failed to preprocess {}", args.file.display()))?;
        results.push(RecordResult {
            line,
            participant: Some(record.participant.clone()),
            passed: report.passed(),
            errors: report.errors,
        });
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    tracing::info!(records = results.len(), failed, "preprocessed visit records");
    output(&results, flags.format)
}
