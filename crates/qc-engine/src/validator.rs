//! Rule validator seam and the bundled JSON Schema implementation.

use qc_core::qc::{
    ErrorLocation, StructuredError, ValidationOutcome, empty_field_error, system_error,
};
use qc_core::{FieldMap, FieldValue, keys};
use serde_json::Value;

use crate::definitions::{CodesMap, RuleSchema};

/// Checks one visit record against a rule schema.
pub trait RuleValidator: Send + Sync {
    fn validate(
        &self,
        record: &FieldMap,
        schema: &RuleSchema,
        codes: Option<&CodesMap>,
    ) -> ValidationOutcome;
}

/// Treats each schema entry as a JSON Schema for its field.
///
/// A boolean `required` on the entry is handled here rather than by the
/// schema: a missing or blank required field yields `empty-field`, and a
/// blank optional field is not checked. Numeric text is coerced when the
/// rule asks for a number.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl RuleValidator for JsonSchemaValidator {
    fn validate(
        &self,
        record: &FieldMap,
        schema: &RuleSchema,
        codes: Option<&CodesMap>,
    ) -> ValidationOutcome {
        let ptid = record.get(keys::PTID).map(FieldValue::render);
        let visitnum = record.get(keys::VISITNUM);
        let mut errors = Vec::new();

        for (field, rule) in schema {
            let mut rule = rule.clone();
            let required = rule
                .as_object_mut()
                .and_then(|r| r.remove("required"))
                .and_then(|r| r.as_bool())
                .unwrap_or(false);

            let value = match record.get(field) {
                Some(v) if !v.is_blank() => v,
                _ => {
                    if required {
                        errors.push(
                            empty_field_error(field, None).with_visit(ptid.as_deref(), visitnum),
                        );
                    }
                    continue;
                }
            };

            let validator = match jsonschema::validator_for(&rule) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(field, error = %e, "invalid rule definition");
                    errors.push(
                        system_error(format!("Invalid rule definition for '{field}': {e}"), None)
                            .with_visit(ptid.as_deref(), visitnum),
                    );
                    continue;
                }
            };

            let instance = coerce(value, &rule);
            for e in validator.iter_errors(&instance) {
                let schema_path = e.schema_path.to_string();
                let keyword = schema_path.rsplit('/').next().unwrap_or_default();
                let code = codes
                    .and_then(|c| c.get(field))
                    .and_then(|c| c.get(keyword))
                    .and_then(Value::as_str)
                    .map_or_else(|| keyword.to_string(), str::to_string);
                errors.push(
                    StructuredError::coded(code, format!("{e}"))
                        .with_location(ErrorLocation::Json {
                            key_path: field.clone(),
                        })
                        .with_value(value.render())
                        .with_visit(ptid.as_deref(), visitnum),
                );
            }
        }

        ValidationOutcome::from_errors(errors)
    }
}

/// JSON view of a field value, turning numeric text into a number when the
/// rule's type is numeric.
fn coerce(value: &FieldValue, rule: &Value) -> Value {
    let numeric = match rule.get("type") {
        Some(Value::String(t)) => is_numeric_type(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(is_numeric_type),
        _ => false,
    };
    if let (true, FieldValue::Text(text)) = (numeric, value) {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            return Value::from(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Value::from(f);
        }
    }
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn is_numeric_type(t: &str) -> bool {
    t == "integer" || t == "number"
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema(value: Value) -> RuleSchema {
        serde_json::from_value(value).unwrap()
    }

    fn record(pairs: &[(&str, FieldValue)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn passes_when_every_rule_holds() {
        let rules = schema(json!({
            "age": {"type": "integer", "minimum": 18, "required": true},
            "sex": {"enum": [1, 2]}
        }));
        let rec = record(&[("age", "42".into()), ("sex", FieldValue::Integer(2))]);
        let outcome = JsonSchemaValidator.validate(&rec, &rules, None);
        assert!(outcome.passed, "{outcome:?}");
    }

    #[test]
    fn violations_carry_field_and_code() {
        let rules = schema(json!({"age": {"type": "integer", "minimum": 18}}));
        let codes = schema(json!({"age": {"minimum": "a1-004"}}));
        let rec = record(&[
            ("ptid", "P1".into()),
            ("visitnum", FieldValue::Integer(1)),
            ("age", FieldValue::Integer(12)),
        ]);
        let outcome = JsonSchemaValidator.validate(&rec, &rules, Some(&codes));
        assert!(!outcome.passed);
        let err = &outcome.errors[0];
        assert_eq!(err.error_code, "a1-004");
        assert_eq!(
            err.location,
            Some(ErrorLocation::Json {
                key_path: "age".to_string()
            })
        );
        assert_eq!(err.value.as_deref(), Some("12"));
        assert_eq!(err.ptid.as_deref(), Some("P1"));
    }

    #[test]
    fn keyword_is_the_fallback_code() {
        let rules = schema(json!({"sex": {"enum": [1, 2]}}));
        let rec = record(&[("sex", FieldValue::Integer(7))]);
        let outcome = JsonSchemaValidator.validate(&rec, &rules, None);
        assert_eq!(outcome.errors[0].error_code, "enum");
    }

    #[test]
    fn required_and_optional_blank_fields() {
        let rules = schema(json!({
            "age": {"type": "integer", "required": true},
            "note": {"type": "string", "maxLength": 3}
        }));
        let rec = record(&[("note", "".into())]);
        let outcome = JsonSchemaValidator.validate(&rec, &rules, None);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].error_code, "empty-field");
    }

    #[test]
    fn invalid_rule_is_a_system_error() {
        let rules = schema(json!({"age": {"type": 12}}));
        let rec = record(&[("age", FieldValue::Integer(1))]);
        let outcome = JsonSchemaValidator.validate(&rec, &rules, None);
        assert_eq!(outcome.errors[0].error_code, "system-error");
    }
}
