//! Idempotent media downloads.
//!
//! `ensure_downloaded` is the whole download state machine: a file is fetched
//! only if the store has no completed record for it (or the recorded bytes
//! vanished from disk), any failure removes what was partially written, and
//! the record is written strictly after the bytes are. The absence of a
//! record is the retry signal for the next run; there is no in-run retry
//! state.

use crate::db::{Database, NewFile};
use crate::error::{FetchError, Result};
use crate::types::{DownloadOutcome, FileKind, TalkId};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Downloads media files into per-talk directories and records completions
pub struct Downloader {
    http: reqwest::Client,
    db: Arc<Database>,
    download_dir: PathBuf,
}

impl Downloader {
    /// Create a downloader writing below `download_dir`
    pub fn new(http: reqwest::Client, db: Arc<Database>, download_dir: PathBuf) -> Self {
        Self {
            http,
            db,
            download_dir,
        }
    }

    /// Directory holding all files of one talk
    pub fn talk_dir(&self, talk_id: TalkId) -> PathBuf {
        self.download_dir.join(talk_id.to_string())
    }

    /// Make sure the bytes for (talk, kind) are on disk and recorded
    ///
    /// Returns `AlreadyPresent` without network activity when a completed
    /// record exists and its file is still there. Fetch failures degrade to
    /// `Failed` (partial bytes removed, nothing recorded); local storage
    /// failures propagate as errors and abort the pass.
    pub async fn ensure_downloaded(
        &self,
        talk_id: TalkId,
        kind: &FileKind,
        url: &str,
    ) -> Result<DownloadOutcome> {
        let label = kind.label();

        if url.is_empty() {
            warn!(talk = %talk_id, kind = %label, "empty source URL, nothing to fetch");
            return Ok(DownloadOutcome::Failed);
        }

        if let Some(existing) = self.db.get_file(talk_id, &label).await? {
            if Path::new(&existing.local_path).exists() {
                debug!(talk = %talk_id, kind = %label, "already present, skipping");
                return Ok(DownloadOutcome::AlreadyPresent);
            }
            debug!(
                talk = %talk_id,
                kind = %label,
                path = %existing.local_path,
                "recorded file missing on disk, fetching again"
            );
        }

        let dest = self.talk_dir(talk_id).join(kind.file_name());
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match self.transfer(url, &dest).await {
            Ok(()) => {
                // Bytes are durable; only now may the record exist
                self.db
                    .record_file(&NewFile {
                        talk_id,
                        file_type: label.clone(),
                        file_url: url.to_string(),
                        local_path: dest.to_string_lossy().into_owned(),
                    })
                    .await?;
                info!(talk = %talk_id, kind = %label, url, "download complete");
                Ok(DownloadOutcome::Downloaded)
            }
            Err(e) if e.is_recoverable() => {
                if dest.exists() {
                    tokio::fs::remove_file(&dest).await?;
                }
                warn!(
                    talk = %talk_id,
                    kind = %label,
                    error = %e,
                    "download failed, will retry on the next run"
                );
                Ok(DownloadOutcome::Failed)
            }
            Err(e) => {
                // Storage failure: best-effort cleanup, then abort the pass
                let _ = tokio::fs::remove_file(&dest).await;
                Err(e)
            }
        }
    }

    /// Stream `url` into `dest`, verifying length when the server declares one
    async fn transfer(&self, url: &str, dest: &Path) -> Result<()> {
        debug!("Downloading {} -> {}", url, dest.display());

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let expected_len = response.content_length();
        let mut stream = response.bytes_stream();

        // Truncates stale bytes a crashed earlier run may have left behind
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, &e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = expected_len
            && written != expected
        {
            return Err(FetchError::Transfer {
                url: url.to_string(),
                reason: format!("received {} of {} bytes", written, expected),
            }
            .into());
        }

        Ok(())
    }
}
