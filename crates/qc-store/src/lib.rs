//! # qc-store
//!
//! libSQL persistence for qcflow.
//!
//! Holds both visit datasets (current and legacy), the per-participant
//! failure gates, project files awaiting submission, and the pipeline job
//! ledger. `QcDb` implements every collaborator trait from `qc_core::traits`,
//! so the engine and scheduler can run against a local database file or an
//! in-memory store in tests.

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;

use error::DatabaseError;
use libsql::Builder;

pub use repos::visits::NewVisit;

/// Central database handle for all qcflow state.
pub struct QcDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl QcDb {
    /// Open a local-only database at the given path, or `":memory:"`.
    ///
    /// Runs migrations automatically on first open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let qc_db = Self { db, conn };
        qc_db.run_migrations().await?;
        tracing::debug!(path, "opened visit store");
        Ok(qc_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Generate a prefixed ID via libSQL. Returns e.g., `"job-a3f8b2c1"`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT '{prefix}-' || lower(hex(randomblob(4)))"),
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }
}

/// ID prefixes.
pub const PREFIX_VISIT: &str = "vis";
pub const PREFIX_FILE: &str = "fil";
pub const PREFIX_JOB: &str = "job";
