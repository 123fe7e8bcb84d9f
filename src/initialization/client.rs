//! HTTP client initialization.

use std::time::Duration;

use reqwest::ClientBuilder;

use crate::config::Config;

/// Initializes the HTTP client used for database downloads.
///
/// Creates a `reqwest::Client` configured with:
/// - Connect timeout from the configuration (a hung connection attempt must
///   not stall a whole refresh cycle)
/// - Total transfer timeout from the configuration (covers the full
///   download of one database file)
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.download_timeout_secs))
        .build()
}
