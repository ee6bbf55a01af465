//! Error types for relive-dl
//!
//! Two broad classes matter to the sync engine:
//! - fetch errors ([`FetchError`]) are scoped to a single talk or file and
//!   degrade to "skip this item, retry on the next run"
//! - storage errors ([`DatabaseError`], I/O) are fatal for the whole pass,
//!   since the write-then-record guarantee can no longer be upheld

use thiserror::Error;

/// Result type alias for relive-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for relive-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "feed_url")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Remote fetch failed (feed, release page, or media transfer)
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is scoped to a single item and the pass may continue.
    ///
    /// Only fetch-class errors qualify; database and filesystem failures
    /// abort the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Fetch(_))
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Errors from a single remote fetch
///
/// Each variant carries the URL it happened against so skip logs can name
/// the exact resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connect or read deadline exceeded
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out
        url: String,
    },

    /// Connection could not be established
    #[error("connection failed for {url}: {reason}")]
    Connect {
        /// The URL that could not be reached
        url: String,
        /// The underlying connection failure
        reason: String,
    },

    /// Server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status {
        /// The URL that was requested
        url: String,
        /// The HTTP status code received
        status: u16,
    },

    /// Transfer broke off mid-stream
    #[error("transfer failed for {url}: {reason}")]
    Transfer {
        /// The URL being transferred
        url: String,
        /// The underlying transfer failure
        reason: String,
    },

    /// Response body had an unexpected shape (JSON or HTML)
    #[error("failed to parse response from {url}: {reason}")]
    Parse {
        /// The URL whose response could not be parsed
        url: String,
        /// What was wrong with the body
        reason: String,
    },
}

impl FetchError {
    /// Classify a [`reqwest::Error`] against the URL it occurred on
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            FetchError::Connect {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            FetchError::Transfer {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether the resource is absent upstream (HTTP 404)
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status: 404, .. })
    }
}
