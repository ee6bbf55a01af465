//! Configuration types for relive-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a synchronization pass
///
/// Every field has a default targeting the 38c3 relive instance, so an empty
/// config file (or none at all) yields a working setup. All values are plain
/// inputs to the core: no global state, no environment lookups.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file (default: "./relive.sqlite")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Root directory for downloaded media, one subdirectory per talk id
    /// (default: "./download")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// URL of the JSON talk index
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Base URL for muxed recordings; `<base>/<talk_id>/muxed.mp4`
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,

    /// HTML listing page scraped when the feed carries no release URL
    #[serde(default = "default_release_index_url")]
    pub release_index_url: String,

    /// Base URL that relative release links on the listing page are joined to
    #[serde(default = "default_release_base_url")]
    pub release_base_url: String,

    /// Time allowed for establishing a connection (default: 5 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Time allowed between reads on an established connection; a stalled
    /// transfer aborts when this elapses (default: 60 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// User-Agent header for all requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            download_dir: default_download_dir(),
            feed_url: default_feed_url(),
            media_base_url: default_media_base_url(),
            release_index_url: default_release_index_url(),
            release_base_url: default_release_base_url(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for
    /// absent fields
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file {}: {}", path.display(), e),
            key: None,
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| Error::Config {
            message: format!("failed to parse config file {}: {}", path.display(), e),
            key: None,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check that the configured URLs and timeouts are usable
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("feed_url", &self.feed_url),
            ("media_base_url", &self.media_base_url),
            ("release_index_url", &self.release_index_url),
            ("release_base_url", &self.release_base_url),
        ] {
            url::Url::parse(value).map_err(|e| Error::Config {
                message: format!("invalid URL '{}': {}", value, e),
                key: Some(key.to_string()),
            })?;
        }

        if self.connect_timeout.is_zero() {
            return Err(Error::Config {
                message: "connect_timeout must be greater than zero".to_string(),
                key: Some("connect_timeout".to_string()),
            });
        }
        if self.read_timeout.is_zero() {
            return Err(Error::Config {
                message: "read_timeout must be greater than zero".to_string(),
                key: Some("read_timeout".to_string()),
            });
        }

        Ok(())
    }

    /// Build the HTTP client shared by the feed, release, and download
    /// components
    ///
    /// Carries both timeout bounds: connect covers connection establishment,
    /// read covers the gap between packets on a live transfer.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./relive.sqlite")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./download")
}

fn default_feed_url() -> String {
    "https://relive.c3voc.de/relive/38c3/index.json".to_string()
}

fn default_media_base_url() -> String {
    "https://cdn.c3voc.de/relive/38c3".to_string()
}

fn default_release_index_url() -> String {
    "https://media.ccc.de/c/38c3".to_string()
}

fn default_release_base_url() -> String {
    "https://media.ccc.de".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    concat!("relive-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"feed_url": "https://example.com/feed.json"}"#).unwrap();

        assert_eq!(config.feed_url, "https://example.com/feed.json");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.download_dir, PathBuf::from("./download"));
    }

    #[test]
    fn timeouts_deserialize_as_seconds() {
        let config: Config =
            serde_json::from_str(r#"{"connect_timeout": 3, "read_timeout": 120}"#).unwrap();

        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.read_timeout, Duration::from_secs(120));
    }

    #[test]
    fn validate_rejects_unparseable_feed_url() {
        let config = Config {
            feed_url: "not a url".to_string(),
            ..Config::default()
        };

        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("feed_url")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn validate_rejects_zero_read_timeout() {
        let config = Config {
            read_timeout: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_is_a_config_error() {
        let err = Config::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
