//! # qc-engine
//!
//! Admission checks and ordered QC validation for qcflow.
//!
//! - [`preprocess`]: checks a visit against the participant's stored visits
//!   before it enters QC (initial visit, legacy continuity, date/number
//!   consistency)
//! - [`gate`]: the per participant/module failure gate and its ordering rule
//! - [`coordinator`]: validates a participant/module in visit-date order,
//!   blocking every visit after the first failure
//! - [`checker`]: single-file validation against the same gate
//! - [`definitions`]: rule and error-code definitions from an object store
//! - [`validator`] and [`runner`]: the rule validator seam and the ways a
//!   visit gets validated (pipeline job or in-process)
//! - [`schemas`]: JSON Schemas of stored state and reports

pub mod checker;
pub mod coordinator;
pub mod definitions;
pub mod error;
pub mod gate;
pub mod preprocess;
pub mod runner;
pub mod schemas;
pub mod validator;

pub use checker::VisitChecker;
pub use coordinator::{BatchReport, QcCoordinator, VisitReport, VisitStatus};
pub use definitions::{Definitions, DefinitionsLoader};
pub use error::{
    CheckError, CoordinatorError, DefinitionError, GateError, PreprocessError, SchemaError,
};
pub use gate::{FailureGate, GateDecision};
pub use preprocess::{PreprocessReport, Preprocessor};
pub use runner::{InlineValidation, JobValidation, ValidationRun, VisitValidation};
pub use schemas::SchemaRegistry;
pub use validator::{JsonSchemaValidator, RuleValidator};
