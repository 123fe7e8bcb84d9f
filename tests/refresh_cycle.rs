//! End-to-end refresh cycle tests.
//!
//! Each test runs the coordinator against an in-process HTTP server and a
//! temp database directory, exercising the full download → validate → swap →
//! reload path with the real readers.

mod helpers;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use httptest::{matchers::*, responders::*, Expectation, Server};
use tempfile::TempDir;
use url::Url;

use geoip_hub::cache::{cache_key, MemoryCache, QueryCache};
use geoip_hub::{
    parse_schedule, run_scheduler, CycleStatus, HttpSource, ReaderManager, RefreshCoordinator,
    RefreshError, RefreshOptions, RefreshState, RetryPolicy, CATALOG,
};

const CITY_PATH: &str = "/databases/raw/maxmind/GeoIP2-City.mmdb";
const COUNTRY_PATH: &str = "/databases/raw/maxmind/GeoIP2-Country.mmdb";
const ISP_PATH: &str = "/databases/raw/maxmind/GeoIP2-ISP.mmdb";
const CONNECTION_TYPE_PATH: &str = "/databases/raw/maxmind/GeoIP2-Connection-Type.mmdb";
const LOCATION_V4_PATH: &str =
    "/databases/raw/ip2location/IP-COUNTRY-REGION-CITY-LATITUDE-LONGITUDE-ISP-DOMAIN-MOBILE-USAGETYPE.BIN";
const LOCATION_V6_PATH: &str =
    "/databases/raw/ip2location/IPV6-COUNTRY-REGION-CITY-LATITUDE-LONGITUDE-ISP-DOMAIN-MOBILE-USAGETYPE.BIN";
const PROXY_PATH: &str = "/databases/raw/ip2location/IP2PROXY-IP-PROXYTYPE-COUNTRY.BIN";

/// (request path, is an MMDB file) for every catalog database.
const DB_PATHS: [(&str, bool); 7] = [
    (CITY_PATH, true),
    (COUNTRY_PATH, true),
    (ISP_PATH, true),
    (CONNECTION_TYPE_PATH, true),
    (LOCATION_V4_PATH, false),
    (LOCATION_V6_PATH, false),
    (PROXY_PATH, false),
];

fn fast_options() -> RefreshOptions {
    RefreshOptions {
        retry_policy: RetryPolicy {
            max_attempts: 2,
            initial_delay_ms: 1,
            factor: 1,
            max_delay: Duration::from_millis(5),
        },
        min_file_size: 1000,
        // The BIN fixtures are opaque blobs; the open-probe would reject
        // them before the swap this suite wants to observe.
        probe_on_validate: false,
    }
}

fn coordinator_for(
    server: &Server,
    base_path: &Path,
    cache: Arc<MemoryCache>,
) -> (Arc<ReaderManager>, Arc<RefreshCoordinator>) {
    let manager = Arc::new(ReaderManager::new(base_path, cache.clone()));
    let source = Arc::new(HttpSource::new(
        reqwest::Client::new(),
        Url::parse(&server.url("/databases/").to_string()).unwrap(),
    ));
    let coordinator = Arc::new(RefreshCoordinator::new(
        source,
        Arc::clone(&manager),
        cache,
        base_path.to_path_buf(),
        fast_options(),
    ));
    (manager, coordinator)
}

fn expect_database(server: &Server, path: &'static str, body: Vec<u8>) {
    server.expect(
        Expectation::matching(request::method_path("GET", path))
            .respond_with(status_code(200).body(body)),
    );
}

fn expect_rejection(server: &Server, path: &'static str, status: u16) {
    server.expect(
        Expectation::matching(request::method_path("GET", path))
            .respond_with(status_code(status)),
    );
}

/// Serves a parseable MMDB for the MaxMind files and an opaque blob for the
/// BIN files.
fn expect_all_databases(server: &Server) {
    for (path, is_mmdb) in DB_PATHS {
        let body = if is_mmdb {
            helpers::minimal_mmdb()
        } else {
            helpers::opaque_blob()
        };
        expect_database(server, path, body);
    }
}

async fn seed_stale_cache_entry(cache: &MemoryCache) {
    cache
        .set(
            &cache_key("8.8.8.8", false),
            serde_json::json!({"country": "stale"}),
        )
        .await;
}

#[tokio::test]
async fn test_full_cycle_swaps_everything_and_clears_cache() {
    let server = Server::run();
    expect_all_databases(&server);

    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(600)));
    seed_stale_cache_entry(&cache).await;

    let (manager, coordinator) = coordinator_for(&server, temp_dir.path(), cache.clone());
    let summary = coordinator.run_cycle().await.expect("cycle succeeds");

    assert_eq!(summary.status, CycleStatus::Success);
    assert_eq!(summary.succeeded(), CATALOG.len());

    // Every live file exists after the swap phase.
    for descriptor in &CATALOG {
        let live = descriptor.live_path(temp_dir.path());
        assert!(live.exists(), "{} missing after cycle", descriptor.name);
    }

    // The reload adopted the new files: the parseable MaxMind databases are
    // available, the opaque BIN blobs were skipped by the loader.
    assert_eq!(manager.generation_number(), 1);
    let status = manager.status();
    for kind in [
        "maxmind_city",
        "maxmind_country",
        "maxmind_isp",
        "maxmind_connection_type",
    ] {
        assert_eq!(status.get(kind), Some(&true), "{} not available", kind);
    }

    // A fully successful cycle clears the query cache.
    assert!(cache.is_empty().await);
    assert_eq!(coordinator.state(), RefreshState::Idle);
}

#[tokio::test]
async fn test_validation_failure_leaves_old_file_live() {
    let server = Server::run();
    // The City file comes back as a large but marker-less blob: big enough
    // to pass the download size floor, rejected by validation.
    for (path, is_mmdb) in DB_PATHS {
        let body = if path == CITY_PATH || !is_mmdb {
            helpers::opaque_blob()
        } else {
            helpers::minimal_mmdb()
        };
        expect_database(&server, path, body);
    }

    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(600)));
    seed_stale_cache_entry(&cache).await;

    // Seed an existing live City file that the failed refresh must not touch.
    let city = geoip_hub::descriptor_by_name("GeoIP2-City.mmdb").unwrap();
    let city_live = city.live_path(temp_dir.path());
    tokio::fs::create_dir_all(city_live.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(&city_live, b"previous city database")
        .await
        .unwrap();

    let (manager, coordinator) = coordinator_for(&server, temp_dir.path(), cache.clone());
    let err = coordinator.run_cycle().await.expect_err("partial failure");

    assert!(matches!(&err, RefreshError::Partial { failed: 1, .. }));
    let summary = err.summary().expect("partial failure carries a summary");
    assert_eq!(summary.status, CycleStatus::FailedPartial);
    assert!(!summary.outcomes["GeoIP2-City.mmdb"].success);
    assert!(summary.outcomes["GeoIP2-Country.mmdb"].success);

    // The rejected download was discarded; the old file is byte-identical.
    let contents = tokio::fs::read(&city_live).await.unwrap();
    assert_eq!(contents, b"previous city database");

    // Siblings were promoted and the reader manager adopted them.
    let country = geoip_hub::descriptor_by_name("GeoIP2-Country.mmdb").unwrap();
    assert!(country.live_path(temp_dir.path()).exists());
    assert_eq!(manager.generation_number(), 1);
    assert_eq!(manager.status().get("maxmind_country"), Some(&true));

    // A partial cycle leaves the cache alone.
    assert!(!cache.is_empty().await);
    assert_eq!(coordinator.state(), RefreshState::FailedPartial);
}

#[tokio::test]
async fn test_all_downloads_rejected_is_total_failure() {
    let server = Server::run();
    for (path, _) in DB_PATHS {
        expect_rejection(&server, path, 403);
    }

    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(600)));
    let (manager, coordinator) = coordinator_for(&server, temp_dir.path(), cache);

    let err = coordinator.run_cycle().await.expect_err("total failure");
    assert!(matches!(
        err,
        RefreshError::AllFailed { total, .. } if total == CATALOG.len()
    ));

    // Nothing was promoted and no reload was attempted.
    assert_eq!(manager.generation_number(), 0);
    for descriptor in &CATALOG {
        assert!(!descriptor.live_path(temp_dir.path()).exists());
    }
}

#[tokio::test]
async fn test_concurrent_triggers_run_one_cycle() {
    let server = Server::run();
    // Each database may be fetched exactly once across both triggers; the
    // default expectation cardinality enforces it.
    expect_all_databases(&server);

    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(600)));
    let (_manager, coordinator) = coordinator_for(&server, temp_dir.path(), cache);

    let first = Arc::clone(&coordinator);
    let second = Arc::clone(&coordinator);
    let (a, b) = tokio::join!(
        async move { first.run_cycle().await },
        async move { second.run_cycle().await },
    );

    // Both triggers observe the same successful cycle.
    assert_eq!(a.expect("first trigger").status, CycleStatus::Success);
    assert_eq!(b.expect("second trigger").status, CycleStatus::Success);
}

#[tokio::test]
async fn test_retry_rejects_unknown_names() {
    let server = Server::run();
    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(600)));
    let (_manager, coordinator) = coordinator_for(&server, temp_dir.path(), cache);

    let err = coordinator
        .retry(&["GeoLite2-City.mmdb".to_string()])
        .await
        .expect_err("unknown name");
    assert!(matches!(err, RefreshError::UnknownDatabase(name) if name == "GeoLite2-City.mmdb"));
}

#[tokio::test]
async fn test_retry_refreshes_only_the_requested_subset() {
    let server = Server::run();
    expect_database(&server, CITY_PATH, helpers::minimal_mmdb());

    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(600)));
    seed_stale_cache_entry(&cache).await;
    let (manager, coordinator) = coordinator_for(&server, temp_dir.path(), cache.clone());

    let summary = coordinator
        .retry(&["GeoIP2-City.mmdb".to_string()])
        .await
        .expect("subset refresh");

    assert_eq!(summary.status, CycleStatus::Success);
    assert_eq!(summary.outcomes.len(), 1);
    let city = geoip_hub::descriptor_by_name("GeoIP2-City.mmdb").unwrap();
    assert!(city.live_path(temp_dir.path()).exists());
    assert_eq!(manager.status().get("maxmind_city"), Some(&true));

    // A subset refresh does not clear the cache.
    assert!(!cache.is_empty().await);
}

#[tokio::test]
async fn test_scheduler_stops_on_cancellation() {
    let server = Server::run();
    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(600)));
    let (_manager, coordinator) = coordinator_for(&server, temp_dir.path(), cache);

    // The next Monday 04:00 slot is comfortably in the future; no cycle
    // fires before the cancellation lands.
    let schedule = parse_schedule("0 4 * * Mon").unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(run_scheduler(coordinator, schedule, cancel.child_token()));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler exits promptly on cancellation")
        .expect("scheduler task completes cleanly");
}

#[tokio::test]
async fn test_cycle_removes_orphaned_temp_files() {
    let server = Server::run();
    for (path, _) in DB_PATHS {
        expect_rejection(&server, path, 404);
    }

    let temp_dir = TempDir::new().unwrap();
    // An orphan from a crashed earlier attempt.
    let orphan = temp_dir.path().join("raw/maxmind/GeoIP2-City.mmdb.tmp.9");
    tokio::fs::create_dir_all(orphan.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(&orphan, b"leftover").await.unwrap();

    let cache = Arc::new(MemoryCache::new(Duration::from_secs(600)));
    let (_manager, coordinator) = coordinator_for(&server, temp_dir.path(), cache);
    let _ = coordinator.run_cycle().await;

    assert!(!orphan.exists(), "orphaned temp file not cleaned up");
}
