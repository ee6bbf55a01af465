//! Talk catalog upsert and queries.

use crate::error::DatabaseError;
use crate::types::TalkId;
use crate::{Error, Result};

use super::{Database, Talk, TalkRecord};

impl Database {
    /// Insert a talk or refresh its feed-sourced metadata, keyed by guid
    ///
    /// The numeric id never changes once assigned. Authors and description
    /// are untouched here, and a NULL incoming release URL preserves one
    /// resolved on an earlier run.
    pub async fn upsert_talk(&self, talk: &TalkRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO talks (
                id, guid, title, room, status,
                start, duration, release_url, last_mtime
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guid) DO UPDATE SET
                title = excluded.title,
                room = excluded.room,
                status = excluded.status,
                start = excluded.start,
                duration = excluded.duration,
                release_url = COALESCE(excluded.release_url, talks.release_url),
                last_mtime = excluded.last_mtime
            "#,
        )
        .bind(talk.id)
        .bind(&talk.guid)
        .bind(&talk.title)
        .bind(&talk.room)
        .bind(&talk.status)
        .bind(talk.start)
        .bind(talk.duration)
        .bind(&talk.release_url)
        .bind(talk.last_mtime)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert talk: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a talk by guid
    pub async fn get_talk(&self, guid: &str) -> Result<Option<Talk>> {
        let row = sqlx::query_as::<_, Talk>(
            r#"
            SELECT
                id, guid, title, room, status, start, duration,
                release_url, authors, description, last_mtime
            FROM talks
            WHERE guid = ?
            "#,
        )
        .bind(guid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get talk: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all stored talks
    pub async fn list_talks(&self) -> Result<Vec<Talk>> {
        let rows = sqlx::query_as::<_, Talk>(
            r#"
            SELECT
                id, guid, title, room, status, start, duration,
                release_url, authors, description, last_mtime
            FROM talks
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list talks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Persist a release URL resolved by scraping the listing page
    pub async fn set_release_url(&self, id: TalkId, release_url: &str) -> Result<()> {
        sqlx::query("UPDATE talks SET release_url = ? WHERE id = ?")
            .bind(release_url)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set release URL: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Persist authors and description from a release page
    ///
    /// Passing None for a field keeps whatever is already stored.
    pub async fn set_release_meta(
        &self,
        id: TalkId,
        authors: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE talks
            SET authors = COALESCE(?, authors),
                description = COALESCE(?, description)
            WHERE id = ?
            "#,
        )
        .bind(authors)
        .bind(description)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set release metadata: {}",
                e
            )))
        })?;

        Ok(())
    }
}
