//! Project file repository (submission queue input).

use std::collections::BTreeSet;

use chrono::Utc;
use qc_core::CoreError;
use qc_core::entities::{FileOrigin, ProjectFile};
use qc_core::traits::ProjectFiles;

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum, parse_json};
use crate::{PREFIX_FILE, QcDb};

const FILE_COLUMNS: &str = "id, container_id, name, tags, modified, origin_type, origin_id";

fn row_to_file(row: &libsql::Row) -> Result<ProjectFile, DatabaseError> {
    let origin = match (get_opt_string(row, 5)?, get_opt_string(row, 6)?) {
        (Some(kind), Some(id)) => Some(FileOrigin {
            kind: parse_enum(&kind)?,
            id,
        }),
        _ => None,
    };
    Ok(ProjectFile {
        id: row.get::<String>(0)?,
        container_id: row.get::<String>(1)?,
        name: row.get::<String>(2)?,
        tags: parse_json(&row.get::<String>(3)?)?,
        modified: parse_datetime(&row.get::<String>(4)?)?,
        origin,
    })
}

impl QcDb {
    /// Attach a file to a container, replacing tags and origin of a file with
    /// the same name. Returns the file's id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the insert fails.
    pub async fn add_file(
        &self,
        container_id: &str,
        name: &str,
        tags: &BTreeSet<String>,
        origin: Option<&FileOrigin>,
    ) -> Result<String, DatabaseError> {
        if let Some(existing) = self.file_by_name(container_id, name).await? {
            self.conn()
                .execute(
                    "UPDATE files SET tags = ?1, modified = ?2, origin_type = ?3, origin_id = ?4
                     WHERE id = ?5",
                    libsql::params![
                        serde_json::to_string(tags)?,
                        Utc::now().to_rfc3339(),
                        origin.map(origin_kind),
                        origin.map(|o| o.id.clone()),
                        existing.id.as_str()
                    ],
                )
                .await?;
            return Ok(existing.id);
        }

        let id = self.generate_id(PREFIX_FILE).await?;
        self.conn()
            .execute(
                "INSERT INTO files (id, container_id, name, tags, modified, origin_type, origin_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                libsql::params![
                    id.as_str(),
                    container_id,
                    name,
                    serde_json::to_string(tags)?,
                    Utc::now().to_rfc3339(),
                    origin.map(origin_kind),
                    origin.map(|o| o.id.clone())
                ],
            )
            .await?;
        Ok(id)
    }

    /// Files of one container, by name.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn files_in(&self, container_id: &str) -> Result<Vec<ProjectFile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE container_id = ?1 ORDER BY name"),
                [container_id],
            )
            .await?;
        let mut files = Vec::new();
        while let Some(row) = rows.next().await? {
            files.push(row_to_file(&row)?);
        }
        Ok(files)
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn file_by_name(
        &self,
        container_id: &str,
        name: &str,
    ) -> Result<Option<ProjectFile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE container_id = ?1 AND name = ?2"),
                [container_id, name],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_file(&row)?)),
            None => Ok(None),
        }
    }

    /// Drop `tags` from a file. Unknown tags are ignored.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the file is unknown.
    pub async fn untag_file(
        &self,
        file_id: &str,
        tags: &BTreeSet<String>,
    ) -> Result<(), DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT tags FROM files WHERE id = ?1", [file_id])
            .await?;
        let row = rows.next().await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "file",
            id: file_id.to_string(),
        })?;
        let mut current: BTreeSet<String> = parse_json(&row.get::<String>(0)?)?;
        current.retain(|t| !tags.contains(t));
        self.conn()
            .execute(
                "UPDATE files SET tags = ?1 WHERE id = ?2",
                libsql::params![serde_json::to_string(&current)?, file_id],
            )
            .await?;
        Ok(())
    }
}

fn origin_kind(origin: &FileOrigin) -> String {
    serde_json::to_value(origin.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

impl ProjectFiles for QcDb {
    async fn list_files(&self, container_id: &str) -> Result<Vec<ProjectFile>, CoreError> {
        Ok(self.files_in(container_id).await?)
    }

    async fn find_file(
        &self,
        container_id: &str,
        name: &str,
    ) -> Result<Option<ProjectFile>, CoreError> {
        Ok(self.file_by_name(container_id, name).await?)
    }

    async fn remove_tags(&self, file_id: &str, tags: &BTreeSet<String>) -> Result<(), CoreError> {
        Ok(self.untag_file(file_id, tags).await?)
    }
}
