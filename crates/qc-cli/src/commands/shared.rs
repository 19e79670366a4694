use anyhow::bail;
use qc_config::QcConfig;
use qc_core::entities::{RecordKeys, VisitRecord};
use qc_core::qc::StructuredError;
use qc_core::{FieldMap, keys};

/// Record keys for `module`: the configured primary key and the module's
/// date field, falling back to the coordinator's.
pub fn record_keys(config: &QcConfig, module: Option<&str>) -> RecordKeys {
    let date_field = module
        .and_then(|m| config.preprocess.module(m))
        .map_or_else(
            || config.coordinator.date_field.clone(),
            |cfg| cfg.date_field.clone(),
        );
    RecordKeys {
        primary_key: config.preprocess.primary_key.clone(),
        date_field,
    }
}

/// Module named by the record, if any.
pub fn record_module(fields: &FieldMap) -> Option<String> {
    fields
        .get(keys::MODULE)
        .filter(|v| !v.is_blank())
        .map(|v| v.render())
}

/// Parse `fields` into a visit record, failing with every shape problem.
pub fn parse_record(config: &QcConfig, fields: FieldMap, source: &str) -> anyhow::Result<VisitRecord> {
    let module = record_module(&fields);
    match VisitRecord::from_fields(fields, &record_keys(config, module.as_deref()), None) {
        Ok(record) => Ok(record),
        Err(errors) => bail!("{source}: {}", describe(&errors)),
    }
}

pub fn describe(errors: &[StructuredError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.error_code))
        .collect::<Vec<_>>()
        .join("; ")
}
