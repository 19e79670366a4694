//! Entity structs for the qcflow domain.
//!
//! Visits, gate entries, jobs, and project files all derive `Serialize`,
//! `Deserialize`, and `JsonSchema` so they can be persisted as JSON columns
//! and checked against their generated schemas.

mod container;
mod files;
mod gate;
mod job;
mod module_config;
mod visit;

pub use container::ContainerRef;
pub use files::{FileOrigin, OriginKind, ProjectFile};
pub use gate::{FailedVisit, GateEntry, GateSnapshot};
pub use job::Job;
pub use module_config::ModuleConfig;
pub use visit::{Locator, QueuedVisit, QueuedVisits, RecordKeys, VisitRecord, VisitRow};
