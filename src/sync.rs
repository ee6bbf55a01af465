//! Feed reconciliation and the one-pass synchronization engine.
//!
//! The engine walks the talk index once, sequentially: upsert metadata where
//! the feed moved on, then make sure every eligible file is on disk. All
//! remote failures are scoped to the item they happened on; only storage
//! failures abort the pass.

use crate::config::Config;
use crate::db::{Database, Talk, TalkRecord};
use crate::download::Downloader;
use crate::error::Result;
use crate::feed::FeedClient;
use crate::release::{HttpReleaseResolver, ReleaseResolver};
use crate::types::{FeedTalk, FileKind, PassSummary, TalkStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do with one incoming talk record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TalkAction {
    /// Never seen this guid: store it and process fully
    Insert,
    /// Stored, but the feed's mtime moved: refresh metadata
    UpdateMetadata,
    /// Stored and current: no metadata write (files are checked regardless)
    UpToDate,
}

/// Decide how an incoming record relates to the stored one
///
/// Any mtime difference counts as an update; the feed is the source of truth
/// in both directions.
pub fn reconcile(incoming: &FeedTalk, stored: Option<&Talk>) -> TalkAction {
    match stored {
        None => TalkAction::Insert,
        Some(existing) if existing.last_mtime != incoming.mtime => TalkAction::UpdateMetadata,
        Some(_) => TalkAction::UpToDate,
    }
}

/// Drives one full pass: feed, reconciliation, release resolution, downloads
pub struct SyncEngine {
    db: Arc<Database>,
    feed: FeedClient,
    resolver: Arc<dyn ReleaseResolver>,
    downloader: Downloader,
    media_base_url: String,
}

impl SyncEngine {
    /// Create an engine with the HTTP-backed release resolver
    pub fn new(config: &Config, db: Arc<Database>) -> Result<Self> {
        let http = config.http_client()?;
        let resolver: Arc<dyn ReleaseResolver> =
            Arc::new(HttpReleaseResolver::new(http.clone(), config)?);
        Ok(Self::assemble(config, db, http, resolver))
    }

    /// Create an engine with a caller-supplied release resolver
    pub fn with_resolver(
        config: &Config,
        db: Arc<Database>,
        resolver: Arc<dyn ReleaseResolver>,
    ) -> Result<Self> {
        let http = config.http_client()?;
        Ok(Self::assemble(config, db, http, resolver))
    }

    fn assemble(
        config: &Config,
        db: Arc<Database>,
        http: reqwest::Client,
        resolver: Arc<dyn ReleaseResolver>,
    ) -> Self {
        Self {
            feed: FeedClient::new(http.clone(), config.feed_url.clone()),
            downloader: Downloader::new(http, db.clone(), config.download_dir.clone()),
            media_base_url: config.media_base_url.trim_end_matches('/').to_string(),
            db,
            resolver,
        }
    }

    /// Run one synchronization pass over the whole feed
    ///
    /// Fails only when the index itself cannot be fetched or the local store
    /// misbehaves; everything else degrades per item.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let talks = self.feed.fetch_talks().await?;
        info!(talks = talks.len(), "starting synchronization pass");

        let mut summary = PassSummary {
            talks_seen: talks.len(),
            ..PassSummary::default()
        };

        for talk in &talks {
            self.process_talk(talk, &mut summary).await?;
        }

        info!(
            inserted = summary.talks_inserted,
            updated = summary.talks_updated,
            downloaded = summary.files_downloaded,
            already_present = summary.files_already_present,
            failed = summary.files_failed,
            "synchronization pass complete"
        );
        Ok(summary)
    }

    async fn process_talk(&self, talk: &FeedTalk, summary: &mut PassSummary) -> Result<()> {
        let stored = self.db.get_talk(&talk.guid).await?;

        match reconcile(talk, stored.as_ref()) {
            TalkAction::Insert => {
                self.db.upsert_talk(&talk_record(talk)).await?;
                summary.talks_inserted += 1;
                debug!(guid = %talk.guid, title = %talk.title, "new talk stored");
            }
            TalkAction::UpdateMetadata => {
                self.db.upsert_talk(&talk_record(talk)).await?;
                summary.talks_updated += 1;
                debug!(guid = %talk.guid, mtime = talk.mtime, "talk metadata refreshed");
            }
            TalkAction::UpToDate => {
                debug!(guid = %talk.guid, "talk metadata current");
            }
        }

        // Thumbnail whenever the feed names one, muxed for every talk id.
        // File presence is checked even when metadata was current: bytes may
        // be missing after an earlier partial run.
        if let Some(raw) = &talk.thumbnail {
            let url = normalize_scheme_relative(raw);
            let outcome = self
                .downloader
                .ensure_downloaded(talk.talk_id(), &FileKind::Thumbnail, &url)
                .await?;
            summary.record(outcome);
        }

        let muxed_url = format!("{}/{}/muxed.mp4", self.media_base_url, talk.id);
        let outcome = self
            .downloader
            .ensure_downloaded(talk.talk_id(), &FileKind::Muxed, &muxed_url)
            .await?;
        summary.record(outcome);

        // Release metadata and media exist only once upstream says released;
        // asking earlier would just hit pages that are not there yet
        if TalkStatus::parse(&talk.status) == TalkStatus::Released {
            self.process_release(talk, stored.as_ref(), summary).await?;
        }

        Ok(())
    }

    async fn process_release(
        &self,
        talk: &FeedTalk,
        stored: Option<&Talk>,
        summary: &mut PassSummary,
    ) -> Result<()> {
        let Some(release_url) = self.release_url_for(talk, stored).await? else {
            return Ok(());
        };

        let meta = match self.resolver.fetch_release(&release_url).await {
            Ok(meta) => meta,
            Err(e) if e.is_recoverable() => {
                warn!(
                    guid = %talk.guid,
                    url = %release_url,
                    error = %e,
                    "no release metadata this run"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if meta.authors.is_some() || meta.description.is_some() {
            self.db
                .set_release_meta(
                    talk.talk_id(),
                    meta.authors.as_deref(),
                    meta.description.as_deref(),
                )
                .await?;
        }

        if let Some(hd_url) = &meta.video_hd_url {
            let outcome = self
                .downloader
                .ensure_downloaded(talk.talk_id(), &FileKind::VideoHd, hd_url)
                .await?;
            summary.record(outcome);
        }

        for track in &meta.audio {
            let outcome = self
                .downloader
                .ensure_downloaded(talk.talk_id(), &track.kind, &track.url)
                .await?;
            summary.record(outcome);
        }

        Ok(())
    }

    /// Pick the release URL: feed value first, then one stored earlier, then
    /// the listing-page scrape as last resort
    async fn release_url_for(
        &self,
        talk: &FeedTalk,
        stored: Option<&Talk>,
    ) -> Result<Option<String>> {
        if let Some(url) = &talk.release_url {
            return Ok(Some(url.clone()));
        }
        if let Some(url) = stored.and_then(|t| t.release_url.clone()) {
            return Ok(Some(url));
        }

        match self.resolver.find_release_url(talk).await {
            Ok(Some(url)) => {
                info!(guid = %talk.guid, url = %url, "release page located via listing");
                // Persist so future runs skip the scrape
                self.db.set_release_url(talk.talk_id(), &url).await?;
                Ok(Some(url))
            }
            Ok(None) => {
                debug!(guid = %talk.guid, "no release page found this run");
                Ok(None)
            }
            Err(e) if e.is_recoverable() => {
                warn!(guid = %talk.guid, error = %e, "release lookup failed, retrying next run");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn talk_record(talk: &FeedTalk) -> TalkRecord {
    TalkRecord {
        id: talk.talk_id(),
        guid: talk.guid.clone(),
        title: talk.title.clone(),
        room: talk.room.clone(),
        status: talk.status.clone(),
        start: talk.start,
        duration: talk.duration.unwrap_or(0).max(0),
        release_url: talk.release_url.clone(),
        last_mtime: talk.mtime,
    }
}

/// Upgrade protocol-relative URLs ("//host/path") to https
fn normalize_scheme_relative(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioCodec, AudioLink, ReleaseMeta, TalkId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed_talk(id: i64, guid: &str, status: &str, mtime: i64) -> FeedTalk {
        FeedTalk {
            id,
            guid: guid.to_string(),
            title: format!("Talk {}", id),
            room: None,
            status: status.to_string(),
            start: Some(1_735_300_000),
            duration: Some(1800),
            release_url: None,
            thumbnail: None,
            mtime,
        }
    }

    fn stored_talk(id: i64, guid: &str, mtime: i64) -> Talk {
        Talk {
            id: TalkId(id),
            guid: guid.to_string(),
            title: format!("Talk {}", id),
            room: None,
            status: "recorded".to_string(),
            start: Some(1_735_300_000),
            duration: 1800,
            release_url: None,
            authors: None,
            description: None,
            last_mtime: mtime,
        }
    }

    // -----------------------------------------------------------------------
    // reconcile: the pure decision
    // -----------------------------------------------------------------------

    #[test]
    fn unseen_guid_is_insert() {
        let incoming = feed_talk(1, "g-1", "recorded", 100);
        assert_eq!(reconcile(&incoming, None), TalkAction::Insert);
    }

    #[test]
    fn changed_mtime_is_update() {
        let incoming = feed_talk(1, "g-1", "recorded", 200);
        let stored = stored_talk(1, "g-1", 100);
        assert_eq!(
            reconcile(&incoming, Some(&stored)),
            TalkAction::UpdateMetadata
        );
    }

    #[test]
    fn decreased_mtime_is_also_update() {
        // Inequality either way means the feed moved; it stays authoritative
        let incoming = feed_talk(1, "g-1", "recorded", 50);
        let stored = stored_talk(1, "g-1", 100);
        assert_eq!(
            reconcile(&incoming, Some(&stored)),
            TalkAction::UpdateMetadata
        );
    }

    #[test]
    fn equal_mtime_is_up_to_date() {
        let incoming = feed_talk(1, "g-1", "recorded", 100);
        let stored = stored_talk(1, "g-1", 100);
        assert_eq!(reconcile(&incoming, Some(&stored)), TalkAction::UpToDate);
    }

    #[test]
    fn scheme_relative_urls_get_https() {
        assert_eq!(
            normalize_scheme_relative("//static.example/thumb.jpg"),
            "https://static.example/thumb.jpg"
        );
        assert_eq!(
            normalize_scheme_relative("https://static.example/thumb.jpg"),
            "https://static.example/thumb.jpg"
        );
    }

    // -----------------------------------------------------------------------
    // Engine behavior with a fake resolver and a mock media server
    // -----------------------------------------------------------------------

    struct FakeResolver {
        release_url: Option<String>,
        meta: ReleaseMeta,
        find_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
    }

    impl FakeResolver {
        fn new(release_url: Option<String>, meta: ReleaseMeta) -> Self {
            Self {
                release_url,
                meta,
                find_calls: AtomicUsize::new(0),
                fetch_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReleaseResolver for FakeResolver {
        async fn find_release_url(&self, _talk: &FeedTalk) -> Result<Option<String>> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.release_url.clone())
        }

        async fn fetch_release(&self, _release_url: &str) -> Result<ReleaseMeta> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.meta.clone())
        }
    }

    struct Harness {
        server: MockServer,
        config: Config,
        db: Arc<Database>,
        _dir: TempDir,
    }

    async fn harness(feed_body: serde_json::Value) -> Harness {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/index.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(feed_body))
            .mount(&server)
            .await;

        let config = Config {
            database_path: dir.path().join("relive.sqlite"),
            download_dir: dir.path().join("download"),
            feed_url: format!("{}/index.json", server.uri()),
            media_base_url: format!("{}/media", server.uri()),
            ..Config::default()
        };
        let db = Arc::new(Database::new(&config.database_path).await.unwrap());

        Harness {
            server,
            config,
            db,
            _dir: dir,
        }
    }

    async fn mount_media(server: &MockServer, url_path: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(url_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn recorded_talk_never_touches_the_resolver() {
        let h = harness(serde_json::json!([
            {"id": 1, "guid": "g-1", "title": "Talk 1", "status": "recorded", "mtime": 10}
        ]))
        .await;
        mount_media(&h.server, "/media/1/muxed.mp4", b"muxed-bytes").await;

        let resolver = Arc::new(FakeResolver::new(
            Some("https://media.example/v/one".into()),
            ReleaseMeta::default(),
        ));
        let engine =
            SyncEngine::with_resolver(&h.config, h.db.clone(), resolver.clone()).unwrap();

        let summary = engine.run_pass().await.unwrap();

        assert_eq!(summary.talks_inserted, 1);
        assert_eq!(summary.files_downloaded, 1);
        assert_eq!(resolver.find_calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn released_with_feed_url_skips_the_listing_scrape() {
        let h = harness(serde_json::json!([
            {"id": 2, "guid": "g-2", "title": "Talk 2", "status": "released",
             "release_url": "https://media.example/v/two", "mtime": 10}
        ]))
        .await;
        mount_media(&h.server, "/media/2/muxed.mp4", b"muxed-bytes").await;
        mount_media(&h.server, "/hd/two.mp4", b"hd-bytes").await;

        let resolver = Arc::new(FakeResolver::new(
            None,
            ReleaseMeta {
                authors: Some("Alice".into()),
                description: Some("About things".into()),
                video_hd_url: Some(format!("{}/hd/two.mp4", h.server.uri())),
                audio: vec![],
            },
        ));
        let engine =
            SyncEngine::with_resolver(&h.config, h.db.clone(), resolver.clone()).unwrap();

        let summary = engine.run_pass().await.unwrap();

        // Direct URL: metadata fetched, listing never scraped
        assert_eq!(resolver.find_calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.files_downloaded, 2); // muxed + hd

        let talk = h.db.get_talk("g-2").await.unwrap().unwrap();
        assert_eq!(talk.authors.as_deref(), Some("Alice"));
        assert_eq!(talk.description.as_deref(), Some("About things"));
    }

    #[tokio::test]
    async fn released_without_url_scrapes_once_and_persists() {
        let h = harness(serde_json::json!([
            {"id": 3, "guid": "g-3", "title": "Talk 3", "status": "released", "mtime": 10}
        ]))
        .await;
        mount_media(&h.server, "/media/3/muxed.mp4", b"muxed-bytes").await;

        let scraped = "https://media.example/v/three".to_string();
        let resolver = Arc::new(FakeResolver::new(
            Some(scraped.clone()),
            ReleaseMeta::default(),
        ));
        let engine =
            SyncEngine::with_resolver(&h.config, h.db.clone(), resolver.clone()).unwrap();

        engine.run_pass().await.unwrap();

        // Scraped URL was persisted on the talk row
        let talk = h.db.get_talk("g-3").await.unwrap().unwrap();
        assert_eq!(talk.release_url.as_deref(), Some(scraped.as_str()));
        assert_eq!(resolver.find_calls.load(Ordering::SeqCst), 1);

        // Second pass finds the stored URL and skips the scrape
        engine.run_pass().await.unwrap();
        assert_eq!(resolver.find_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unmatched_release_lookup_degrades_and_is_retried() {
        let h = harness(serde_json::json!([
            {"id": 4, "guid": "g-4", "title": "Talk 4", "status": "released", "mtime": 10}
        ]))
        .await;
        mount_media(&h.server, "/media/4/muxed.mp4", b"muxed-bytes").await;

        let resolver = Arc::new(FakeResolver::new(None, ReleaseMeta::default()));
        let engine =
            SyncEngine::with_resolver(&h.config, h.db.clone(), resolver.clone()).unwrap();

        let summary = engine.run_pass().await.unwrap();
        assert_eq!(summary.talks_inserted, 1);
        assert_eq!(resolver.fetch_calls.load(Ordering::SeqCst), 0);

        // Nothing was persisted, so the next run asks the listing again
        engine.run_pass().await.unwrap();
        assert_eq!(resolver.find_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn audio_tracks_from_release_meta_are_downloaded() {
        let h = harness(serde_json::json!([
            {"id": 5, "guid": "g-5", "title": "Talk 5", "status": "released",
             "release_url": "https://media.example/v/five", "mtime": 10}
        ]))
        .await;
        mount_media(&h.server, "/media/5/muxed.mp4", b"muxed-bytes").await;
        mount_media(&h.server, "/audio/five.mp3", b"mp3-bytes").await;

        let resolver = Arc::new(FakeResolver::new(
            None,
            ReleaseMeta {
                audio: vec![AudioLink {
                    kind: FileKind::Audio {
                        language: "deu".into(),
                        codec: AudioCodec::Mp3,
                    },
                    url: format!("{}/audio/five.mp3", h.server.uri()),
                }],
                ..ReleaseMeta::default()
            },
        ));
        let engine = SyncEngine::with_resolver(&h.config, h.db.clone(), resolver).unwrap();

        engine.run_pass().await.unwrap();

        let audio = h.db.get_file(TalkId(5), "audio_deu_mp3").await.unwrap();
        assert!(audio.is_some());
        let audio_path = h.config.download_dir.join("5").join("audio_deu.mp3");
        assert_eq!(std::fs::read(audio_path).unwrap(), b"mp3-bytes");
    }

    #[tokio::test]
    async fn thumbnail_from_feed_is_fetched() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/index.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 6, "guid": "g-6", "title": "Talk 6", "status": "recorded",
                 "thumbnail": format!("{}/thumbs/6.jpg", server.uri()), "mtime": 10}
            ])))
            .mount(&server)
            .await;
        mount_media(&server, "/media/6/muxed.mp4", b"muxed-bytes").await;
        mount_media(&server, "/thumbs/6.jpg", b"jpeg-bytes").await;

        let config = Config {
            database_path: dir.path().join("relive.sqlite"),
            download_dir: dir.path().join("download"),
            feed_url: format!("{}/index.json", server.uri()),
            media_base_url: format!("{}/media", server.uri()),
            ..Config::default()
        };
        let db = Arc::new(Database::new(&config.database_path).await.unwrap());

        let resolver = Arc::new(FakeResolver::new(None, ReleaseMeta::default()));
        let engine = SyncEngine::with_resolver(&config, db.clone(), resolver).unwrap();

        let summary = engine.run_pass().await.unwrap();

        assert_eq!(summary.files_downloaded, 2); // thumb + muxed
        assert!(db.get_file(TalkId(6), "thumb").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_pass_over_unchanged_feed_downloads_nothing() {
        let h = harness(serde_json::json!([
            {"id": 7, "guid": "g-7", "title": "Talk 7", "status": "recorded", "mtime": 10}
        ]))
        .await;

        // The muxed file may be fetched exactly once across both passes
        Mock::given(method("GET"))
            .and(path("/media/7/muxed.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"muxed-bytes".to_vec()))
            .expect(1)
            .mount(&h.server)
            .await;

        let resolver = Arc::new(FakeResolver::new(None, ReleaseMeta::default()));
        let engine = SyncEngine::with_resolver(&h.config, h.db.clone(), resolver).unwrap();

        let first = engine.run_pass().await.unwrap();
        assert_eq!(first.talks_inserted, 1);
        assert_eq!(first.files_downloaded, 1);

        let second = engine.run_pass().await.unwrap();
        assert_eq!(second.talks_inserted, 0);
        assert_eq!(second.talks_updated, 0);
        assert_eq!(second.files_downloaded, 0);
        assert_eq!(second.files_already_present, 1);
    }

    #[tokio::test]
    async fn failed_media_fetch_skips_item_but_continues_pass() {
        let h = harness(serde_json::json!([
            {"id": 8, "guid": "g-8", "title": "Talk 8", "status": "recorded", "mtime": 10},
            {"id": 9, "guid": "g-9", "title": "Talk 9", "status": "recorded", "mtime": 10}
        ]))
        .await;
        // Talk 8's muxed file errors, talk 9's succeeds
        Mock::given(method("GET"))
            .and(path("/media/8/muxed.mp4"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&h.server)
            .await;
        mount_media(&h.server, "/media/9/muxed.mp4", b"muxed-bytes").await;

        let resolver = Arc::new(FakeResolver::new(None, ReleaseMeta::default()));
        let engine = SyncEngine::with_resolver(&h.config, h.db.clone(), resolver).unwrap();

        let summary = engine.run_pass().await.unwrap();

        assert_eq!(summary.talks_inserted, 2);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.files_downloaded, 1);
        assert!(h.db.get_file(TalkId(8), "muxed").await.unwrap().is_none());
        assert!(h.db.get_file(TalkId(9), "muxed").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unreachable_feed_aborts_the_pass() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = Config {
            database_path: dir.path().join("relive.sqlite"),
            download_dir: dir.path().join("download"),
            feed_url: format!("{}/index.json", server.uri()),
            ..Config::default()
        };
        drop(server);

        let db = Arc::new(Database::new(&config.database_path).await.unwrap());
        let resolver = Arc::new(FakeResolver::new(None, ReleaseMeta::default()));
        let engine = SyncEngine::with_resolver(&config, db, resolver).unwrap();

        assert!(engine.run_pass().await.is_err());
    }
}
