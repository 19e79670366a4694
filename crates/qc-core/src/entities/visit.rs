use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dates::{format_visit_date, parse_visit_date};
use crate::keys;
use crate::qc::{ErrorCode, StructuredError, empty_field_error, preprocessing_error};
use crate::value::{FieldMap, FieldValue};

/// Where a visit's file lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Locator {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Acquisition holding the file.
    pub container_id: String,
}

impl Locator {
    /// Same file: ids equal when both are known, otherwise names equal.
    #[must_use]
    pub fn same_file(&self, other: &Self) -> bool {
        match (&self.file_id, &other.file_id) {
            (Some(a), Some(b)) if a == b => true,
            _ => self.file_name == other.file_name,
        }
    }
}

/// Field names used to pull the identifying values out of a raw record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RecordKeys {
    pub primary_key: String,
    pub date_field: String,
}

impl Default for RecordKeys {
    fn default() -> Self {
        Self {
            primary_key: keys::PTID.to_string(),
            date_field: keys::VISITDATE.to_string(),
        }
    }
}

/// One submitted form visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisitRecord {
    pub participant: String,
    /// Module label, upper-cased.
    pub module: String,
    pub version: FieldValue,
    /// Upper-cased packet code, when the module uses packets.
    pub packet: Option<String>,
    pub visit_date: NaiveDate,
    pub visit_number: Option<FieldValue>,
    pub fields: FieldMap,
    pub locator: Option<Locator>,
}

impl VisitRecord {
    /// Build a record from raw fields. The visit date is written back in
    /// `YYYY-MM-DD` form.
    ///
    /// # Errors
    ///
    /// Returns every shape problem found: missing participant, module, form
    /// version or visit date, and an unparseable visit date.
    pub fn from_fields(
        fields: FieldMap,
        record_keys: &RecordKeys,
        line: Option<u64>,
    ) -> Result<Self, Vec<StructuredError>> {
        let mut errors = Vec::new();
        let mut required = |field: &str| -> Option<FieldValue> {
            match fields.get(field) {
                Some(v) if !v.is_blank() => Some(v.clone()),
                _ => {
                    errors.push(empty_field_error(field, line));
                    None
                }
            }
        };

        let participant = required(&record_keys.primary_key);
        let module = required(keys::MODULE);
        let version = required(keys::FORMVER);
        let raw_date = required(&record_keys.date_field);

        let visit_date = raw_date.and_then(|raw| match parse_visit_date(&raw.render()) {
            Ok(date) => Some(date),
            Err(_) => {
                errors.push(
                    preprocessing_error(
                        ErrorCode::MalformedFile,
                        &record_keys.date_field,
                        &raw,
                        line,
                        participant.as_ref().and_then(FieldValue::as_str),
                        None,
                    )
                    .with_message(format!("Invalid visit date '{raw}'")),
                );
                None
            }
        });

        match (participant, module, version, visit_date) {
            (Some(participant), Some(module), Some(version), Some(visit_date))
                if errors.is_empty() =>
            {
                let packet = fields
                    .get(keys::PACKET)
                    .filter(|v| !v.is_blank())
                    .map(|v| v.render().to_uppercase());
                let visit_number = fields.get(keys::VISITNUM).filter(|v| !v.is_blank()).cloned();
                let mut fields = fields;
                fields.insert(
                    record_keys.date_field.clone(),
                    FieldValue::Text(format_visit_date(visit_date)),
                );
                Ok(Self {
                    participant: participant.render(),
                    module: module.render().to_uppercase(),
                    version,
                    packet,
                    visit_date,
                    visit_number,
                    fields,
                    locator: None,
                })
            }
            _ => Err(errors),
        }
    }

    #[must_use]
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = Some(locator);
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn visit_date_value(&self) -> FieldValue {
        FieldValue::from(self.visit_date)
    }
}

/// Flat query result from a visit store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisitRow {
    pub file_name: String,
    pub file_id: Option<String>,
    pub acquisition_id: String,
    pub session_id: Option<String>,
    pub columns: FieldMap,
}

impl VisitRow {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.columns.get(field)
    }

    /// Parse the given column as a visit date.
    #[must_use]
    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.get(field).and_then(FieldValue::as_date)
    }

    #[must_use]
    pub fn locator(&self) -> Locator {
        Locator {
            file_name: self.file_name.clone(),
            file_id: self.file_id.clone(),
            container_id: self.acquisition_id.clone(),
        }
    }
}

/// A visit waiting in a coordinator batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueuedVisit {
    pub file_name: String,
    #[serde(default)]
    pub file_id: Option<String>,
    pub visit_date: NaiveDate,
}

/// All queued visits of one participant/module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueuedVisits {
    pub participant: String,
    pub module: String,
    pub visits: Vec<QueuedVisit>,
}

impl QueuedVisits {
    #[must_use]
    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.visits.iter().map(|v| v.visit_date).min()
    }
}
