//! Application initialization and resource setup.
//!
//! This module provides functions to initialize all shared resources:
//! - Logger (plain or JSON formatting)
//! - HTTP client (with download timeouts)
//! - The wired-up service: query cache, reader manager, refresh coordinator
//!
//! There are no global instances: everything is constructed once here and
//! shared by handle.

mod client;
mod logger;

// Re-export public API
pub use client::init_client;
pub use logger::init_logger_with;

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::cache::{MemoryCache, NoCache, QueryCache};
use crate::config::Config;
use crate::error_handling::InitializationError;
use crate::manager::ReaderManager;
use crate::refresh::{HttpSource, RefreshCoordinator, RefreshOptions};
use crate::retry::RetryPolicy;

/// The constructed-once service handles.
pub struct GeoIpService {
    /// Owner of the current reader generation; answers queries.
    pub manager: Arc<ReaderManager>,
    /// Keeps the on-disk databases current. Absent when no remote source is
    /// configured — queries still work against whatever is on disk.
    pub coordinator: Option<Arc<RefreshCoordinator>>,
}

impl GeoIpService {
    /// The coordinator, or the error explaining how to configure one.
    pub fn require_coordinator(&self) -> Result<&Arc<RefreshCoordinator>, InitializationError> {
        self.coordinator
            .as_ref()
            .ok_or(InitializationError::MissingSource)
    }
}

/// Initializes the query cache selected by the configuration.
pub fn init_cache(config: &Config) -> Arc<dyn QueryCache> {
    if config.use_cache {
        Arc::new(MemoryCache::new(Duration::from_secs(config.cache_ttl_secs)))
    } else {
        Arc::new(NoCache)
    }
}

/// Builds the full service: cache, manager (with initial load), and the
/// coordinator when a remote source is configured.
pub async fn init_service(config: &Config) -> Result<GeoIpService, InitializationError> {
    let cache = init_cache(config);
    let manager = Arc::new(ReaderManager::load(&config.database_path, Arc::clone(&cache)).await);

    let coordinator = match config.source_base_url.as_deref() {
        Some(base) => {
            let base_url = Url::parse(base)
                .map_err(|e| InitializationError::SourceUrlError(format!("{}: {}", base, e)))?;
            let client = init_client(config)?;
            let source = Arc::new(HttpSource::new(client, base_url));
            Some(Arc::new(RefreshCoordinator::new(
                source,
                Arc::clone(&manager),
                Arc::clone(&cache),
                config.database_path.clone(),
                RefreshOptions {
                    retry_policy: RetryPolicy::default(),
                    min_file_size: config.min_file_size,
                    probe_on_validate: config.probe_on_validate,
                },
            )))
        }
        None => None,
    };

    Ok(GeoIpService {
        manager,
        coordinator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_service_without_source_has_no_coordinator() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = Config {
            database_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let service = init_service(&config).await.expect("service");
        assert!(service.coordinator.is_none());
        assert!(matches!(
            service.require_coordinator(),
            Err(InitializationError::MissingSource)
        ));
    }

    #[tokio::test]
    async fn test_init_service_with_source() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = Config {
            database_path: temp_dir.path().to_path_buf(),
            source_base_url: Some("https://geoip.example.com/databases".to_string()),
            ..Default::default()
        };
        let service = init_service(&config).await.expect("service");
        assert!(service.coordinator.is_some());
    }

    #[tokio::test]
    async fn test_init_service_rejects_bad_source_url() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = Config {
            database_path: temp_dir.path().to_path_buf(),
            source_base_url: Some("not a url".to_string()),
            ..Default::default()
        };
        let result = init_service(&config).await;
        assert!(matches!(
            result,
            Err(InitializationError::SourceUrlError(_))
        ));
    }
}
