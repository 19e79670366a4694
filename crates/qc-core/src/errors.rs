//! Cross-cutting error types for qcflow.
//!
//! This module defines errors that can originate from any collaborator.
//! Domain-specific errors (e.g., `DatabaseError`, `PollError`) are defined in
//! their respective crates and converted into `CoreError` at trait seams.

use thiserror::Error;

/// Errors that can be raised by any qcflow crate or collaborator.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity lookup returned no result.
    #[error("Entity not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    /// Data failed validation (schema, format, constraints).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A backing service (store, job executor, object store) failed.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}
