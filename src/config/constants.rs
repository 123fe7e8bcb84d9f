//! Configuration constants.
//!
//! Defaults for timeouts, retry behavior, and the refresh schedule. All of
//! them can be overridden through [`Config`](super::Config).

/// Default root under which database files live
/// (`<root>/raw/{maxmind,ip2location}/<file>`).
pub const DEFAULT_DATABASE_PATH: &str = "/data/databases";

/// Default refresh schedule: Mondays at 04:00 local time, shortly after the
/// weekly database publication. The day is spelled out because the cron
/// parser counts numeric weekdays from Sunday = 1.
pub const DEFAULT_REFRESH_SCHEDULE: &str = "0 4 * * Mon";

/// Environment variable overriding the database root.
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";

/// Environment variable providing the remote database repository URL.
pub const SOURCE_BASE_URL_ENV: &str = "SOURCE_BASE_URL";

/// Environment variable overriding the refresh schedule.
pub const REFRESH_SCHEDULE_ENV: &str = "REFRESH_SCHEDULE";

// Network operation timeouts
/// Connection timeout for database downloads in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 60;
/// Total transfer timeout for one database download in seconds (30 minutes;
/// the ISP databases run to hundreds of megabytes)
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 1800;

// Download retry behavior
/// Initial retry delay in milliseconds
pub const RETRY_INITIAL_DELAY_MS: u64 = 500;
/// Backoff multiplier per retry
pub const RETRY_FACTOR: u64 = 2;
/// Maximum delay between retries in seconds
pub const RETRY_MAX_DELAY_SECS: u64 = 15;
/// Download attempts per database per cycle, including the first
pub const RETRY_MAX_ATTEMPTS: usize = 3;

// Validation
/// Files smaller than this are treated as error pages, not databases
pub const MIN_DATABASE_FILE_SIZE: u64 = 1000;

// Cache
/// Default query cache TTL in seconds (7 days, one refresh interval)
pub const CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;
