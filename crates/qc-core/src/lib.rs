//! # qc-core
//!
//! Core types, field values, error codes, and collaborator traits for qcflow.
//!
//! This crate provides the foundational types shared across all qcflow crates:
//! - Sum-typed form field values and loose comparison rules
//! - Visit records, query rows, gate entries, jobs, and project files
//! - Structured QC errors and the well-known error codes
//! - Status enums (QC state, job state, search operators)
//! - Traits for the external collaborators (visit store, gate repository,
//!   QC metadata recorder, job source, pipeline trigger, project files)
//! - Cross-cutting error types

pub mod dates;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod keys;
pub mod qc;
pub mod query;
pub mod traits;
pub mod value;

pub use errors::CoreError;
pub use value::{FieldMap, FieldValue};
