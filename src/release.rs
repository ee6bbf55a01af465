//! Release metadata resolution.
//!
//! A released talk has an HTML release page carrying extended metadata
//! (speakers, description) and final media links (HD video, audio tracks).
//! The feed usually knows the page URL; when it doesn't, the listing page
//! for the event is scraped and matched by talk title.
//!
//! The engine depends on the [`ReleaseResolver`] capability, not on the
//! HTTP/scraper implementation, so tests can substitute a fake.

use crate::config::Config;
use crate::error::{Error, FetchError, Result};
use crate::types::{AudioCodec, AudioLink, FeedTalk, FileKind, ReleaseMeta};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

/// Languages recognized on release-page audio links
const AUDIO_LANGUAGES: &[&str] = &["deu", "eng", "fra"];

/// Capability to locate and read release pages
#[async_trait]
pub trait ReleaseResolver: Send + Sync {
    /// Locate a talk's release URL by matching its title against the listing
    /// page
    ///
    /// `Ok(None)` means "no unambiguous match this run"; not an error, the
    /// lookup is retried on a future run.
    async fn find_release_url(&self, talk: &FeedTalk) -> Result<Option<String>>;

    /// Fetch a release page and extract its metadata bundle
    async fn fetch_release(&self, release_url: &str) -> Result<ReleaseMeta>;
}

/// Compiled CSS selectors for the listing and release pages
struct Selectors {
    event_link: Selector,
    persons: Selector,
    description: Selector,
    any_link: Selector,
    audio_link: Selector,
}

impl Selectors {
    fn compile() -> Result<Self> {
        Ok(Self {
            event_link: compile_selector("div.event-preview div.caption h3 a")?,
            persons: compile_selector("p.persons a")?,
            description: compile_selector("p.description")?,
            any_link: compile_selector("a[href]")?,
            audio_link: compile_selector("a.download.audio")?,
        })
    }
}

fn compile_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Other(format!("invalid selector '{}': {}", css, e)))
}

/// HTTP + HTML implementation of [`ReleaseResolver`]
pub struct HttpReleaseResolver {
    http: reqwest::Client,
    index_url: String,
    base_url: Url,
    selectors: Selectors,
}

impl HttpReleaseResolver {
    /// Create a resolver against the configured listing page
    pub fn new(http: reqwest::Client, config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.release_base_url).map_err(|e| Error::Config {
            message: format!("invalid URL '{}': {}", config.release_base_url, e),
            key: Some("release_base_url".to_string()),
        })?;

        Ok(Self {
            http,
            index_url: config.release_index_url.clone(),
            base_url,
            selectors: Selectors::compile()?,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
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

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e).into())
    }
}

#[async_trait]
impl ReleaseResolver for HttpReleaseResolver {
    async fn find_release_url(&self, talk: &FeedTalk) -> Result<Option<String>> {
        if talk.title.trim().is_empty() {
            debug!(guid = %talk.guid, "talk has no title to match against the listing");
            return Ok(None);
        }

        let body = self.get_text(&self.index_url).await?;
        match_listing(&self.selectors, &body, &talk.title, &self.base_url)
    }

    async fn fetch_release(&self, release_url: &str) -> Result<ReleaseMeta> {
        let body = self.get_text(release_url).await?;
        Ok(parse_release_page(&self.selectors, &body))
    }
}

/// Match the talk title against listing-page event links
///
/// Exactly one candidate wins; zero or several yield `None` (an ambiguous
/// match is a resolution failure, never a guess).
fn match_listing(
    selectors: &Selectors,
    body: &str,
    title: &str,
    base_url: &Url,
) -> Result<Option<String>> {
    let doc = Html::parse_document(body);
    let needle = title.to_lowercase();

    let mut candidates = Vec::new();
    for link in doc.select(&selectors.event_link) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let text = element_text(&link);
        if text.to_lowercase().contains(&needle) {
            candidates.push(href.to_string());
        }
    }

    match candidates.as_slice() {
        [] => {
            debug!(title, "no listing entry matched");
            Ok(None)
        }
        [href] => {
            let url = base_url.join(href).map_err(|e| FetchError::Parse {
                url: base_url.as_str().to_string(),
                reason: format!("cannot join release link '{}': {}", href, e),
            })?;
            Ok(Some(url.to_string()))
        }
        many => {
            warn!(
                title,
                candidates = many.len(),
                "ambiguous listing match, skipping this run"
            );
            Ok(None)
        }
    }
}

/// Extract the metadata bundle from a release page body
fn parse_release_page(selectors: &Selectors, body: &str) -> ReleaseMeta {
    let doc = Html::parse_document(body);

    let authors: Vec<String> = doc
        .select(&selectors.persons)
        .map(|a| element_text(&a))
        .filter(|s| !s.is_empty())
        .collect();
    let authors = if authors.is_empty() {
        None
    } else {
        Some(authors.join(", "))
    };

    let description = doc.select(&selectors.description).next().map(|p| {
        p.text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    });
    let description = description.filter(|s| !s.is_empty());

    let video_hd_url = doc
        .select(&selectors.any_link)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains("h264-hd") && href.ends_with(".mp4"))
        .map(str::to_string);

    let mut audio = Vec::new();
    for link in doc.select(&selectors.audio_link) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let language = link
            .value()
            .classes()
            .find(|class| AUDIO_LANGUAGES.contains(class))
            .unwrap_or("unknown")
            .to_string();
        audio.push(AudioLink {
            kind: FileKind::Audio {
                language,
                codec: AudioCodec::from_url(href),
            },
            url: href.to_string(),
        });
    }

    ReleaseMeta {
        authors,
        description,
        video_hd_url,
        audio,
    }
}

fn element_text(element: &scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
