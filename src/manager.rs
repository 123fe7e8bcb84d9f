//! Reader lifecycle management.
//!
//! [`ReaderManager`] is the single authority over which reader generation is
//! current. Queries take a cheap atomic snapshot of the current generation
//! and never wait for reloads; reloads build a complete new generation off
//! to the side and publish it with one pointer swap. A superseded
//! generation's readers stay open until the last in-flight query drops its
//! `Arc`, then close via `Drop` — a query can never observe a reader
//! mid-close or a set mixing files from two generations.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::json;

use crate::cache::{cache_key, QueryCache};
use crate::error_handling::{QueryError, ReloadError};
use crate::readers::DatabaseSet;
use crate::resolver::{self, QueryOutcome};

/// One immutable, fully-loaded snapshot of open readers.
pub struct ReaderGeneration {
    /// Monotonically increasing generation counter; 0 is the empty
    /// pre-load generation.
    pub number: u64,
    /// The readers loaded for this generation.
    pub set: DatabaseSet,
}

/// Owns the current [`ReaderGeneration`] and the reload protocol.
///
/// Constructed once and shared by handle; there is no global instance.
pub struct ReaderManager {
    base_path: PathBuf,
    cache: Arc<dyn QueryCache>,
    current: RwLock<Arc<ReaderGeneration>>,
    reload_lock: tokio::sync::Mutex<()>,
}

/// Result of one entry in a batch query. Errors are contained per item.
pub struct IpReport {
    /// The input exactly as queried.
    pub ip: String,
    /// Outcome or per-item error for this input.
    pub result: Result<QueryOutcome, QueryError>,
}

impl IpReport {
    /// One JSON object per input line, suitable for JSONL output.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.result {
            Ok(QueryOutcome::Found(result)) => json!({
                "ip": self.ip,
                "status": "ok",
                "data": result,
            }),
            Ok(QueryOutcome::NotFound) => json!({
                "ip": self.ip,
                "status": "not_found",
            }),
            Err(e) => {
                let status = match e {
                    QueryError::InvalidInput(_) => "invalid_input",
                    QueryError::ReaderUnavailable => "unavailable",
                };
                json!({
                    "ip": self.ip,
                    "status": status,
                    "error": e.to_string(),
                })
            }
        }
    }
}

impl ReaderManager {
    /// Creates a manager with no databases loaded (generation 0).
    ///
    /// Callers normally follow up with [`reload`](Self::reload) or use
    /// [`load`](Self::load).
    pub fn new(base_path: &Path, cache: Arc<dyn QueryCache>) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            cache,
            current: RwLock::new(Arc::new(ReaderGeneration {
                number: 0,
                set: DatabaseSet::empty(),
            })),
            reload_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Creates a manager and performs the initial load.
    ///
    /// Unlike [`reload`](Self::reload), an empty result is not an error at
    /// startup: the service comes up degraded and the first successful
    /// refresh cycle brings it to full coverage.
    pub async fn load(base_path: &Path, cache: Arc<dyn QueryCache>) -> Self {
        let manager = Self::new(base_path, cache);
        match manager.reload().await {
            Ok(()) => {}
            Err(ReloadError::NoDatabases { .. }) => {
                log::warn!(
                    "No databases found under {}; queries will report the service unavailable \
                     until a refresh succeeds",
                    base_path.display()
                );
            }
            Err(e) => log::error!("Initial database load failed: {}", e),
        }
        manager
    }

    /// Snapshot of the current generation, or `None` if the pointer lock is
    /// poisoned (treated as service-degraded, mirroring a missing set).
    fn current(&self) -> Option<Arc<ReaderGeneration>> {
        self.current.read().ok().map(|guard| Arc::clone(&guard))
    }

    /// The current generation counter (0 before the first load).
    pub fn generation_number(&self) -> u64 {
        self.current().map(|generation| generation.number).unwrap_or(0)
    }

    /// Per-kind availability of the current generation, over the full
    /// catalog.
    pub fn status(&self) -> std::collections::BTreeMap<&'static str, bool> {
        match self.current() {
            Some(generation) => generation.set.availability(),
            None => DatabaseSet::empty().availability(),
        }
    }

    /// Resolves one IP against the current generation, consulting the cache
    /// before and feeding it after.
    pub async fn query(&self, ip: &str, full_data: bool) -> Result<QueryOutcome, QueryError> {
        let ip_addr = resolver::parse_ip(ip)?;

        let generation = self.current().ok_or(QueryError::ReaderUnavailable)?;
        if generation.set.is_empty() {
            return Err(QueryError::ReaderUnavailable);
        }

        let key = cache_key(ip, full_data);
        if let Some(cached) = self.cache.get(&key).await {
            if let Some(outcome) = QueryOutcome::from_json(cached) {
                log::debug!("Cache hit for {}", key);
                return Ok(outcome);
            }
        }

        let outcome = resolver::resolve(&generation.set, ip_addr, full_data);
        self.cache.set(&key, outcome.to_json()).await;
        Ok(outcome)
    }

    /// Resolves many IPs independently; one bad input never aborts the rest.
    pub async fn query_batch(&self, ips: &[String], full_data: bool) -> Vec<IpReport> {
        let mut reports = Vec::with_capacity(ips.len());
        for ip in ips {
            let result = self.query(ip, full_data).await;
            reports.push(IpReport {
                ip: ip.clone(),
                result,
            });
        }
        reports
    }

    /// Builds a new generation from the current on-disk files and publishes
    /// it atomically.
    ///
    /// Single-flight: a `reload` that arrives while another is running
    /// waits for it and adopts its result instead of loading again. On
    /// failure the previous generation remains live.
    pub async fn reload(&self) -> Result<(), ReloadError> {
        let base_path = self.base_path.clone();
        self.reload_via(|| async move { DatabaseSet::load(&base_path).await })
            .await
    }

    /// Reload protocol with the loader injected, shared by `reload` and the
    /// concurrency tests.
    async fn reload_via<F, Fut>(&self, load: F) -> Result<(), ReloadError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = DatabaseSet>,
    {
        let observed = self.generation_number();
        let _guard = self.reload_lock.lock().await;

        // Someone else finished a reload while we waited; adopt it.
        if self.generation_number() > observed {
            log::debug!(
                "Reload collapsed into generation {} published meanwhile",
                self.generation_number()
            );
            return Ok(());
        }

        let set = load().await;
        if set.is_empty() {
            return Err(ReloadError::NoDatabases {
                base_path: self.base_path.display().to_string(),
            });
        }

        let number = observed + 1;
        let loaded = set.len();
        let generation = Arc::new(ReaderGeneration { number, set });

        let previous = {
            let mut slot = self
                .current
                .write()
                .map_err(|_| ReloadError::Internal("generation lock poisoned"))?;
            std::mem::replace(&mut *slot, generation)
        };

        log::info!(
            "Published reader generation {} ({} databases); generation {} retiring",
            number,
            loaded,
            previous.number
        );
        // `previous` drops here; its readers close once the last in-flight
        // query releases its snapshot.
        Ok(())
    }
}
