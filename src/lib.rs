//! # relive-dl
//!
//! Mirroring tool for a conference talk catalog: fetches a JSON talk index,
//! reconciles it with a local SQLite store, and downloads the associated
//! media files (muxed recordings, thumbnails, HD video, audio tracks),
//! scraping the release listing page when the feed has no canonical release
//! link yet.
//!
//! ## Design Philosophy
//!
//! - **Idempotent** - a second run over an unchanged feed performs zero new
//!   downloads; completed files are recognized by store record + bytes on disk
//! - **Crash-safe** - bytes are written before the record (write-then-record);
//!   a killed process can leave a dangling partial file, never a
//!   recorded-but-missing one
//! - **Self-healing** - failures are scoped to one talk or file, logged, and
//!   retried on the next invocation without manual intervention
//! - **Library-first** - the binary is a thin orchestrator; all behavior
//!   lives in the crate and takes its configuration explicitly
//!
//! ## Quick Start
//!
//! ```no_run
//! use relive_dl::{Config, Database, SyncEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(&config.database_path).await?);
//!
//!     let engine = SyncEngine::new(&config, db)?;
//!     let summary = engine.run_pass().await?;
//!
//!     println!(
//!         "{} downloaded, {} already present, {} failed",
//!         summary.files_downloaded, summary.files_already_present, summary.files_failed
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Idempotent media downloads
pub mod download;
/// Error types
pub mod error;
/// Talk index fetch client
pub mod feed;
/// Release metadata resolution (direct URL or listing-page scrape)
pub mod release;
/// Reconciliation and the one-pass sync engine
pub mod sync;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, NewFile, StoredFile, Talk, TalkRecord};
pub use download::Downloader;
pub use error::{DatabaseError, Error, FetchError, Result};
pub use feed::FeedClient;
pub use release::{HttpReleaseResolver, ReleaseResolver};
pub use sync::{SyncEngine, TalkAction, reconcile};
pub use types::{
    AudioCodec, AudioLink, DownloadOutcome, FeedTalk, FileKind, PassSummary, ReleaseMeta, TalkId,
    TalkStatus,
};
