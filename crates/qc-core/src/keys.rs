//! Well-known field names, packet codes, and stage names.

/// Participant id field.
pub const PTID: &str = "ptid";
pub const MODULE: &str = "module";
pub const PACKET: &str = "packet";
pub const VISITNUM: &str = "visitnum";
pub const FORMVER: &str = "formver";
/// Prefix of the per-form "mode" variable (`mode<form>`).
pub const MODE: &str = "mode";
pub const NACCID: &str = "naccid";
pub const VISITDATE: &str = "visitdate";
pub const RMMODE_C2C2T: &str = "rmmodec2c2t";

/// Initial visit packet.
pub const UDS_I_PACKET: &str = "I";
/// Initial visit packet for participants continuing from the legacy system.
pub const UDS_I4_PACKET: &str = "I4";
/// Packet key used in the optional-forms table for modules without packets.
pub const FOLLOWUP_PACKET_KEY: &str = "D";

pub const UDS_MODULE: &str = "UDS";
pub const C2_FORM: &str = "c2";
pub const C2T_FORM: &str = "c2t";

/// Stage that runs form rule checks on a single visit.
pub const QC_STAGE: &str = "form-qc-checker";
/// Stage that orders visits and records blocked visits and system errors.
pub const COORDINATOR_STAGE: &str = "form-qc-coordinator";
/// First stage of the submission pipeline.
pub const FILE_VALIDATOR_STAGE: &str = "file-validator";

/// Root directory of the rule definitions in the object store.
pub const QC_JSON_DIR: &str = "JSON";
/// Optional-forms table, relative to the definitions root.
pub const OPTIONAL_FORMS_FILE: &str = "optional_forms.json";

/// Value of a `mode<form>` variable meaning the form was not submitted.
pub const NOT_FILLED: i64 = 0;

/// Tags written after validation.
pub const PASS_TAG_SUFFIX: &str = "PASS";
pub const FAIL_TAG_SUFFIX: &str = "FAIL";
