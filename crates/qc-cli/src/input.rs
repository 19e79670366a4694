//! Reading visit files from disk.

use std::path::Path;

use anyhow::{Context, bail};
use qc_core::FieldMap;
use qc_core::entities::Locator;
use qc_core::value::field_map_from_json;

/// Records of a JSON visit file: a single object, or an array of objects
/// numbered from line 1.
pub fn read_records(path: &Path) -> anyhow::Result<Vec<(Option<u64>, FieldMap)>> {
    let value = read_json(path)?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .zip(1_u64..)
            .map(|(item, line)| {
                field_map_from_json(item)
                    .map(|fields| (Some(line), fields))
                    .with_context(|| format!("{}: record {line} is not an object", path.display()))
            })
            .collect(),
        other => Ok(vec![(None, object(path, other)?)]),
    }
}

/// The single visit object of a visit file. An empty file reads as an empty
/// map so the checker can report it.
pub fn read_visit(path: &Path) -> anyhow::Result<FieldMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(FieldMap::new());
    }
    let value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    object(path, value)
}

/// Where a visit file is stored: named by its file name, held by an
/// acquisition named after the file stem unless given.
pub fn locator_for(path: &Path, container: Option<&str>) -> anyhow::Result<Locator> {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        bail!("{} has no file name", path.display());
    };
    let container_id = container.map_or_else(
        || {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file_name)
                .to_string()
        },
        str::to_string,
    );
    Ok(Locator {
        file_name: file_name.to_string(),
        file_id: None,
        container_id,
    })
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn object(path: &Path, value: serde_json::Value) -> anyhow::Result<FieldMap> {
    field_map_from_json(value)
        .with_context(|| format!("{} does not hold a JSON object", path.display()))
}
