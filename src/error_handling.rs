//! Error type definitions.
//!
//! Errors are scoped to the granularity at which they are contained: per-IP
//! query errors never abort a batch, per-database download/validation errors
//! never abort a refresh cycle, and refresh-path failures never take the
//! currently-live readers down.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use thiserror::Error;

use crate::refresh::RefreshSummary;

/// Error types for initialization failures.
#[derive(Error, Debug)]
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// The configured refresh schedule did not parse.
    #[error("Invalid refresh schedule: {0}")]
    ScheduleError(String),

    /// The configured source base URL did not parse.
    #[error("Invalid source URL: {0}")]
    SourceUrlError(String),

    /// Refresh was requested but no remote source is configured.
    #[error("No database source configured (set SOURCE_BASE_URL or --source-url)")]
    MissingSource,
}

/// Error types for a single IP query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The input did not parse as an IPv4 or IPv6 address.
    #[error("invalid IP address: {0:?}")]
    InvalidInput(String),

    /// No database readers are loaded at all, so no query can be answered.
    ///
    /// Distinct from a `NotFound` outcome: the service is degraded, not the
    /// address unknown.
    #[error("no GeoIP databases loaded")]
    ReaderUnavailable,
}

/// Error types for building and publishing a new reader generation.
#[derive(Error, Debug)]
pub enum ReloadError {
    /// The new generation contained no readers at all; the previous
    /// generation stays live.
    #[error("reload produced no usable databases under {base_path}")]
    NoDatabases {
        /// Database root the loader scanned.
        base_path: String,
    },

    /// The generation pointer could not be updated.
    #[error("reader generation state corrupted: {0}")]
    Internal(&'static str),
}

/// Error types for downloading one database file.
///
/// The transient/permanent split decides retriability: timeouts, connection
/// resets and 5xx responses are worth another attempt, while an explicit
/// rejection (403/404) never is.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Timeout, connection failure, 5xx — retried with backoff.
    #[error("transient download failure: {0}")]
    Transient(String),

    /// Explicit rejection (403/404 and other 4xx) — not retried.
    #[error("permanent download failure: {0}")]
    Permanent(String),

    /// The downloaded body is below the minimum plausible database size,
    /// which usually means an error page was served. Retried like a
    /// transient failure.
    #[error("downloaded file too small ({size} bytes), likely an error page")]
    TooSmall {
        /// Bytes actually received.
        size: u64,
    },

    /// Local filesystem failure while writing the temp file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether another attempt may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            DownloadError::Transient(_) | DownloadError::TooSmall { .. } => true,
            DownloadError::Permanent(_) => false,
            DownloadError::Io(_) => false,
        }
    }
}

/// Error types for validating one downloaded database file.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// File is below the minimum plausible size for a real database.
    #[error("file too small ({size} bytes, minimum {minimum})")]
    TooSmall {
        /// Bytes on disk.
        size: u64,
        /// Configured minimum.
        minimum: u64,
    },

    /// MMDB file is missing the MaxMind metadata marker in its tail.
    #[error("MaxMind metadata marker not found")]
    MissingMarker,

    /// The format-appropriate reader library refused to open the file.
    #[error("reader probe rejected the file: {0}")]
    ProbeFailed(String),

    /// The file could not be read for validation.
    #[error("I/O error during validation: {0}")]
    Io(#[from] std::io::Error),
}

/// Error types for a whole refresh cycle.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// Some, but not all, databases failed this cycle. The successful ones
    /// are live; outcomes carry the per-database detail.
    #[error("{failed} of {total} databases failed to refresh")]
    Partial {
        /// Number of failed databases.
        failed: usize,
        /// Number of databases attempted.
        total: usize,
        /// Per-database outcomes for the cycle.
        summary: RefreshSummary,
    },

    /// Every database failed this cycle; nothing was promoted.
    #[error("all {total} databases failed to refresh")]
    AllFailed {
        /// Number of databases attempted.
        total: usize,
        /// Per-database outcomes for the cycle.
        summary: RefreshSummary,
    },

    /// A retry request named a database outside the fixed catalog.
    #[error("unknown database name: {0:?}")]
    UnknownDatabase(String),
}

impl RefreshError {
    /// Per-database outcomes, when the cycle ran at all.
    pub fn summary(&self) -> Option<&RefreshSummary> {
        match self {
            RefreshError::Partial { summary, .. } | RefreshError::AllFailed { summary, .. } => {
                Some(summary)
            }
            RefreshError::UnknownDatabase(_) => None,
        }
    }
}
