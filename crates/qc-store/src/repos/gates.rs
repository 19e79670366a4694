//! Failure-gate repository.
//!
//! One row per participant/module. Writes are compare-and-swap on
//! `revision`: a missing row counts as revision 0, every successful write
//! bumps it by one.

use qc_core::CoreError;
use qc_core::entities::{GateEntry, GateSnapshot};
use qc_core::traits::GateRepository;

use crate::QcDb;
use crate::error::DatabaseError;
use crate::helpers::parse_json;

impl QcDb {
    /// Read the gate for a participant/module.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or the stored JSON is corrupt.
    pub async fn gate(&self, participant: &str, module: &str) -> Result<GateSnapshot, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT gate, revision FROM participants
                 WHERE participant = ?1 AND module = upper(?2)",
                libsql::params![participant, module],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(GateSnapshot {
                entry: parse_json(&row.get::<String>(0)?)?,
                revision: row.get::<i64>(1)?,
            }),
            None => Ok(GateSnapshot::default()),
        }
    }

    /// Write the gate if its stored revision is still `expected_revision`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the statement fails.
    pub async fn compare_and_set_gate(
        &self,
        participant: &str,
        module: &str,
        entry: &GateEntry,
        expected_revision: i64,
    ) -> Result<bool, DatabaseError> {
        let gate = serde_json::to_string(entry)?;
        let changed = if expected_revision == 0 {
            self.conn()
                .execute(
                    "INSERT INTO participants (participant, module, gate, revision)
                     VALUES (?1, upper(?2), ?3, 1)
                     ON CONFLICT (participant, module) DO NOTHING",
                    libsql::params![participant, module, gate],
                )
                .await?
        } else {
            self.conn()
                .execute(
                    "UPDATE participants
                     SET gate = ?3, revision = revision + 1, updated_at = datetime('now')
                     WHERE participant = ?1 AND module = upper(?2) AND revision = ?4",
                    libsql::params![participant, module, gate, expected_revision],
                )
                .await?
        };
        if changed == 0 {
            tracing::debug!(participant, module, expected_revision, "gate revision moved");
        }
        Ok(changed == 1)
    }
}

impl GateRepository for QcDb {
    async fn load_gate(&self, participant: &str, module: &str) -> Result<GateSnapshot, CoreError> {
        Ok(self.gate(participant, module).await?)
    }

    async fn store_gate(
        &self,
        participant: &str,
        module: &str,
        entry: &GateEntry,
        expected_revision: i64,
    ) -> Result<bool, CoreError> {
        Ok(self
            .compare_and_set_gate(participant, module, entry, expected_revision)
            .await?)
    }
}
