//! Completed-download records.
//!
//! A row in `files` means the bytes were fully written to durable storage;
//! callers must only record after the write completed. At most one row exists
//! per (talk_id, file_type); a successful re-download supersedes the old
//! url/path instead of duplicating.

use crate::error::DatabaseError;
use crate::types::TalkId;
use crate::{Error, Result};

use super::{Database, NewFile, StoredFile};

impl Database {
    /// Record a completed download, superseding any earlier record for the
    /// same (talk, kind)
    pub async fn record_file(&self, file: &NewFile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (talk_id, file_type, file_url, local_path)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(talk_id, file_type) DO UPDATE SET
                file_url = excluded.file_url,
                local_path = excluded.local_path
            "#,
        )
        .bind(file.talk_id)
        .bind(&file.file_type)
        .bind(&file.file_url)
        .bind(&file.local_path)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record file: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Look up the completed-download record for (talk, kind), if any
    pub async fn get_file(&self, talk_id: TalkId, file_type: &str) -> Result<Option<StoredFile>> {
        let row = sqlx::query_as::<_, StoredFile>(
            r#"
            SELECT id, talk_id, file_type, file_url, local_path
            FROM files
            WHERE talk_id = ? AND file_type = ?
            "#,
        )
        .bind(talk_id)
        .bind(file_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get file: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all completed downloads for a talk
    pub async fn files_for_talk(&self, talk_id: TalkId) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query_as::<_, StoredFile>(
            r#"
            SELECT id, talk_id, file_type, file_url, local_path
            FROM files
            WHERE talk_id = ?
            ORDER BY file_type ASC
            "#,
        )
        .bind(talk_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list files: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
