//! Database layer for relive-dl
//!
//! Handles SQLite persistence for the talk catalog and its downloaded files.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`talks`] — Talk catalog upsert and queries (keyed by guid)
//! - [`files`] — Completed-download records (keyed by talk id + file type)

use crate::types::TalkId;
use sqlx::{FromRow, sqlite::SqlitePool};

mod files;
mod migrations;
mod talks;

/// Incoming talk metadata for an upsert
///
/// Carries only what the feed knows; authors and description belong to
/// release resolution and are never written through this shape.
#[derive(Debug, Clone)]
pub struct TalkRecord {
    /// Feed-assigned id; never changes once stored
    pub id: TalkId,
    /// Globally unique identifier, the upsert key
    pub guid: String,
    /// Talk title
    pub title: String,
    /// Room the talk was held in
    pub room: Option<String>,
    /// Upstream status string, stored verbatim
    pub status: String,
    /// Start instant (unix seconds)
    pub start: Option<i64>,
    /// Duration in seconds (non-negative)
    pub duration: i64,
    /// Release page URL if the feed carries one
    pub release_url: Option<String>,
    /// Last-modified instant (unix seconds)
    pub last_mtime: i64,
}

/// Talk row from database
#[derive(Debug, Clone, FromRow)]
pub struct Talk {
    /// Feed-assigned id
    pub id: TalkId,
    /// Globally unique identifier
    pub guid: String,
    /// Talk title
    pub title: String,
    /// Room the talk was held in
    pub room: Option<String>,
    /// Upstream status string
    pub status: String,
    /// Start instant (unix seconds)
    pub start: Option<i64>,
    /// Duration in seconds
    pub duration: i64,
    /// Release page URL (from the feed or a previous scrape)
    pub release_url: Option<String>,
    /// Speaker names from release resolution
    pub authors: Option<String>,
    /// Description from release resolution
    pub description: Option<String>,
    /// Last-modified instant the stored metadata reflects
    pub last_mtime: i64,
}

/// New file record, written only after its bytes are fully on disk
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Owning talk
    pub talk_id: TalkId,
    /// File kind label (thumb, muxed, video_hd, audio_*)
    pub file_type: String,
    /// URL the bytes were fetched from
    pub file_url: String,
    /// Where the bytes live locally
    pub local_path: String,
}

/// File row from database
#[derive(Debug, Clone, FromRow)]
pub struct StoredFile {
    /// Unique database ID
    pub id: i64,
    /// Owning talk
    pub talk_id: TalkId,
    /// File kind label
    pub file_type: String,
    /// URL the bytes were fetched from
    pub file_url: String,
    /// Where the bytes live locally
    pub local_path: String,
}

/// Database handle for relive-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
