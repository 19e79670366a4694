//! Error types for the QC engine.
//!
//! Per-record findings (admission errors, content errors, blocked visits) are
//! values inside reports and outcomes. The enums here are reserved for
//! conditions that stop the current unit of work.

use chrono::NaiveDate;
use qc_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    /// No module configuration for the record's module.
    #[error("No configurations found for module {0}")]
    UnknownModule(String),

    /// The existing initial visit could not be read back.
    #[error("Error reading previous visit file {file}")]
    UnreadableVisit { file: String },

    #[error(transparent)]
    Store(#[from] CoreError),
}

#[derive(Debug, Error)]
pub enum GateError {
    /// A different file at or before the recorded failure date.
    #[error(
        "Visit {file} ({visit_date}) is not after failed visit {failed_file} ({failed_date}); \
         resolve the failed visit first"
    )]
    OutOfOrder {
        failed_file: String,
        failed_date: NaiveDate,
        file: String,
        visit_date: NaiveDate,
    },

    /// Concurrent writers kept moving the stored revision.
    #[error("Gate for {participant}/{module} still contended after {attempts} attempts")]
    Contended {
        participant: String,
        module: String,
        attempts: u32,
    },

    #[error(transparent)]
    Store(#[from] CoreError),
}

#[derive(Debug, Error)]
pub enum DefinitionError {
    /// Nothing stored under the definitions prefix.
    #[error("Failed to load definitions from {prefix}")]
    NoDefinitions { prefix: String },

    /// At least one definition file was unreadable, empty, or malformed.
    #[error("Error(s) occurred while loading definition schemas under {prefix}")]
    Parse { prefix: String },

    /// Rules and error-code trees cover different fields.
    #[error("Rule definitions and codes definitions do not match: {fields:?}")]
    Mismatch { fields: Vec<String> },

    /// The optional-forms table is missing or unreadable.
    #[error("Optional forms file {path}: {reason}")]
    OptionalForms { path: String, reason: String },

    /// Strict mode and `mode<form>` variables are absent.
    #[error("Missing fields {0:?} required to validate optional forms")]
    MissingModeFields(Vec<String>),

    /// The record's form version cannot name a definitions directory.
    #[error("Cannot derive definitions path from form version '{0}'")]
    FormVersion(String),

    #[error("Invalid definitions configuration: {0}")]
    Config(String),

    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("No queued visits for {participant}/{module}")]
    EmptyBatch { participant: String, module: String },

    /// The store has no visit at or after the cutoff, which means the queued
    /// visits were never stored.
    #[error("Cannot find matching visits for {participant}/{module} with date >= {cutoff}")]
    NoVisits {
        participant: String,
        module: String,
        cutoff: String,
    },

    #[error("Coordinator cancelled")]
    Cancelled,

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Store(#[from] CoreError),
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Definitions(#[from] DefinitionError),

    #[error(transparent)]
    Store(#[from] CoreError),
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema not found: {0}")]
    NotFound(String),

    #[error("Schema compilation failed: {0}")]
    Compile(String),

    #[error("Validation failed with {} error(s)", errors.len())]
    ValidationFailed { errors: Vec<String> },
}
