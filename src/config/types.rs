//! Configuration types.
//!
//! [`Config`] is the library-facing configuration struct; it carries no CLI
//! dependencies and can be built programmatically, from the environment, or
//! from parsed command-line options.

use std::path::PathBuf;

use clap::ValueEnum;

use super::constants::{
    CACHE_TTL_SECS, CONNECT_TIMEOUT_SECS, DATABASE_PATH_ENV, DEFAULT_DATABASE_PATH,
    DEFAULT_REFRESH_SCHEDULE, DOWNLOAD_TIMEOUT_SECS, MIN_DATABASE_FILE_SIZE,
    REFRESH_SCHEDULE_ENV, SOURCE_BASE_URL_ENV,
};

/// Logging level for the application.
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Service configuration.
///
/// # Examples
///
/// ```no_run
/// use geoip_hub::config::Config;
/// use std::path::PathBuf;
///
/// let config = Config {
///     database_path: PathBuf::from("/data/databases"),
///     source_base_url: Some("https://geoip.example.com/databases".to_string()),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for database files.
    pub database_path: PathBuf,

    /// Base URL of the remote database repository. Refresh cycles are
    /// unavailable without one; queries work regardless.
    pub source_base_url: Option<String>,

    /// Refresh schedule, 5-field cron.
    pub schedule: String,

    /// Connection timeout for downloads, seconds.
    pub connect_timeout_secs: u64,

    /// Total transfer timeout per download, seconds.
    pub download_timeout_secs: u64,

    /// Size floor below which a downloaded file is rejected.
    pub min_file_size: u64,

    /// Open-probe downloaded files with the reader libraries during
    /// validation.
    pub probe_on_validate: bool,

    /// Memoize query results in the in-process cache.
    pub use_cache: bool,

    /// Query cache TTL, seconds.
    pub cache_ttl_secs: u64,

    /// Log level.
    pub log_level: LogLevel,

    /// Log format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            source_base_url: None,
            schedule: DEFAULT_REFRESH_SCHEDULE.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            download_timeout_secs: DOWNLOAD_TIMEOUT_SECS,
            min_file_size: MIN_DATABASE_FILE_SIZE,
            probe_on_validate: true,
            use_cache: true,
            cache_ttl_secs: CACHE_TTL_SECS,
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
        }
    }
}

impl Config {
    /// Default configuration with environment overrides applied
    /// (`DATABASE_PATH`, `SOURCE_BASE_URL`, `REFRESH_SCHEDULE`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(DATABASE_PATH_ENV) {
            if !path.is_empty() {
                config.database_path = PathBuf::from(path);
            }
        }
        if let Ok(url) = std::env::var(SOURCE_BASE_URL_ENV) {
            if !url.is_empty() {
                config.source_base_url = Some(url);
            }
        }
        if let Ok(schedule) = std::env::var(REFRESH_SCHEDULE_ENV) {
            if !schedule.is_empty() {
                config.schedule = schedule;
            }
        }
        config
    }
}
