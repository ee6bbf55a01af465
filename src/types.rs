//! Core types for relive-dl

use serde::{Deserialize, Serialize};

/// Unique identifier for a talk, assigned by the upstream feed
///
/// Once a talk is stored its id never changes; it also names the talk's
/// directory under the download root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TalkId(pub i64);

impl TalkId {
    /// Create a new TalkId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TalkId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TalkId> for i64 {
    fn from(id: TalkId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TalkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for TalkId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TalkId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TalkId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Upstream talk status, as far as this tool cares
///
/// The raw string is stored verbatim; this enum only drives gating decisions.
/// Anything that is not `recorded` or `released` is inert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TalkStatus {
    /// Recording exists; a muxed file may be available
    Recorded,
    /// Final release published; release metadata and HD/audio may exist
    Released,
    /// Any other upstream value (live, scheduled, ...)
    Unknown,
}

impl TalkStatus {
    /// Classify an upstream status string
    pub fn parse(status: &str) -> Self {
        match status {
            "recorded" => TalkStatus::Recorded,
            "released" => TalkStatus::Released,
            _ => TalkStatus::Unknown,
        }
    }
}

/// Audio codec of a release-page audio link, inferred from the URL
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioCodec {
    /// MP3 audio
    Mp3,
    /// Opus audio
    Opus,
    /// Anything else
    Other,
}

impl AudioCodec {
    /// Infer the codec from an audio download URL
    pub fn from_url(url: &str) -> Self {
        if url.contains(".mp3") {
            AudioCodec::Mp3
        } else if url.contains(".opus") {
            AudioCodec::Opus
        } else {
            AudioCodec::Other
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Opus => "opus",
            AudioCodec::Other => "other",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Opus => "opus",
            AudioCodec::Other => "dat",
        }
    }
}

/// Role of a downloaded file within a talk's directory
///
/// The label doubles as the `file_type` column in the files table, so at most
/// one complete file exists per (talk, kind).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// Preview image from the feed
    Thumbnail,
    /// Combined audio+video recording produced shortly after the talk
    Muxed,
    /// HD video from the release page
    VideoHd,
    /// Audio track from the release page
    Audio {
        /// Track language code (deu, eng, fra, or "unknown")
        language: String,
        /// Track codec
        codec: AudioCodec,
    },
}

impl FileKind {
    /// Stable label used as the `file_type` key in the store
    pub fn label(&self) -> String {
        match self {
            FileKind::Thumbnail => "thumb".to_string(),
            FileKind::Muxed => "muxed".to_string(),
            FileKind::VideoHd => "video_hd".to_string(),
            FileKind::Audio { language, codec } => {
                format!("audio_{}_{}", language, codec.label())
            }
        }
    }

    /// File name within the talk's directory, derived only from the kind
    pub fn file_name(&self) -> String {
        match self {
            FileKind::Thumbnail => "thumb.jpg".to_string(),
            FileKind::Muxed => "muxed.mp4".to_string(),
            FileKind::VideoHd => "video_hd.mp4".to_string(),
            FileKind::Audio { language, codec } => {
                format!("audio_{}.{}", language, codec.extension())
            }
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Result of one `ensure_downloaded` call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A complete file record exists and the bytes are on disk; no network activity
    AlreadyPresent,
    /// The file was fetched, fully written, and recorded
    Downloaded,
    /// The fetch failed; any partial bytes were removed and nothing was recorded
    Failed,
}

/// One talk record as it arrives from the JSON feed
///
/// Unknown fields are ignored; everything except id and guid is optional
/// upstream.
#[derive(Clone, Debug, Deserialize)]
pub struct FeedTalk {
    /// Feed-assigned numeric id
    pub id: i64,

    /// Globally unique identifier
    pub guid: String,

    /// Talk title
    #[serde(default)]
    pub title: String,

    /// Room the talk was held in
    #[serde(default)]
    pub room: Option<String>,

    /// Upstream status string (recorded, released, live, ...)
    #[serde(default)]
    pub status: String,

    /// Start instant (unix seconds)
    #[serde(default)]
    pub start: Option<i64>,

    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<i64>,

    /// Canonical release page URL, when the feed already knows it
    #[serde(default)]
    pub release_url: Option<String>,

    /// Thumbnail URL (may be protocol-relative)
    #[serde(default)]
    pub thumbnail: Option<String>,

    /// Last-modified instant (unix seconds)
    #[serde(default)]
    pub mtime: i64,
}

impl FeedTalk {
    /// The talk's typed id
    pub fn talk_id(&self) -> TalkId {
        TalkId(self.id)
    }
}

/// One audio track exposed by a release page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioLink {
    /// File kind carrying language and codec
    pub kind: FileKind,
    /// Absolute download URL
    pub url: String,
}

/// Metadata extracted from a release page
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseMeta {
    /// Speaker names, joined with ", "
    pub authors: Option<String>,
    /// Talk description
    pub description: Option<String>,
    /// HD video download URL
    pub video_hd_url: Option<String>,
    /// Audio track links
    pub audio: Vec<AudioLink>,
}

/// Counters accumulated over one synchronization pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Talk records seen in the feed
    pub talks_seen: usize,
    /// Talks inserted for the first time
    pub talks_inserted: usize,
    /// Talks whose metadata was refreshed
    pub talks_updated: usize,
    /// Files fetched and recorded this pass
    pub files_downloaded: usize,
    /// Files already complete before this pass
    pub files_already_present: usize,
    /// File fetches that failed and will be retried next run
    pub files_failed: usize,
}

impl PassSummary {
    /// Fold one download outcome into the counters
    pub fn record(&mut self, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::AlreadyPresent => self.files_already_present += 1,
            DownloadOutcome::Downloaded => self.files_downloaded += 1,
            DownloadOutcome::Failed => self.files_failed += 1,
        }
    }
}
