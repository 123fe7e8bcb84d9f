//! Database refresh coordination.
//!
//! A refresh cycle moves through `Downloading → Validating → Swapping →
//! ReaderReload` and back to `Idle` (or `FailedPartial`). Failures are
//! contained per database: one bad download or validation never blocks the
//! others, and a cycle can only ever *improve* what is being served — the
//! worst outcome of any refresh-path failure is continuing to serve the
//! previous data.

mod download;
mod scheduler;
mod validate;

pub use download::{DatabaseSource, HttpSource};
pub use scheduler::{parse_schedule, run_scheduler};
pub use validate::validate_file;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::Serialize;

use crate::cache::QueryCache;
use crate::catalog::{descriptor_by_name, DatabaseDescriptor, CATALOG};
use crate::error_handling::RefreshError;
use crate::manager::ReaderManager;
use crate::retry::RetryPolicy;

/// Result of refreshing one database in one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    /// Whether the file was downloaded, validated and promoted.
    pub success: bool,
    /// Bytes received for this database (also set when validation later
    /// rejected the file).
    pub bytes_downloaded: u64,
    /// Failure detail, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Aggregate verdict of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleStatus {
    /// Every attempted database was promoted.
    Success,
    /// Some databases were promoted, some failed.
    FailedPartial,
    /// Nothing was promoted.
    Failed,
}

/// Per-database outcomes plus the aggregate verdict for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    /// Aggregate verdict.
    pub status: CycleStatus,
    /// Outcome per database name.
    pub outcomes: BTreeMap<String, RefreshOutcome>,
}

impl RefreshSummary {
    fn from_outcomes(outcomes: BTreeMap<String, RefreshOutcome>) -> Self {
        let failed = outcomes.values().filter(|o| !o.success).count();
        let status = if failed == 0 {
            CycleStatus::Success
        } else if failed == outcomes.len() {
            CycleStatus::Failed
        } else {
            CycleStatus::FailedPartial
        };
        Self { status, outcomes }
    }

    /// Number of databases promoted this cycle.
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.success).count()
    }

    /// Number of databases that failed this cycle.
    pub fn failed(&self) -> usize {
        self.outcomes.values().filter(|o| !o.success).count()
    }

    fn into_result(self) -> Result<RefreshSummary, RefreshError> {
        match self.status {
            CycleStatus::Success => Ok(self),
            CycleStatus::FailedPartial => Err(RefreshError::Partial {
                failed: self.failed(),
                total: self.outcomes.len(),
                summary: self,
            }),
            CycleStatus::Failed => Err(RefreshError::AllFailed {
                total: self.outcomes.len(),
                summary: self,
            }),
        }
    }
}

/// Observable phase of the refresh state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No cycle running.
    Idle,
    /// Fetching remote copies into temp files.
    Downloading,
    /// Sanity-checking downloaded temp files.
    Validating,
    /// Renaming validated temp files onto the live paths.
    Swapping,
    /// Asking the reader manager to adopt the new files.
    ReaderReload,
    /// Last cycle left at least one database stale.
    FailedPartial,
}

/// Tuning knobs for the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct RefreshOptions {
    /// Retry policy applied to each database download.
    pub retry_policy: RetryPolicy,
    /// Size floor below which a download or file is rejected.
    pub min_file_size: u64,
    /// Whether validation also open-probes files with the reader libraries.
    pub probe_on_validate: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            min_file_size: crate::config::MIN_DATABASE_FILE_SIZE,
            probe_on_validate: true,
        }
    }
}

/// Keeps the on-disk databases current and hands them to the reader manager.
///
/// Cycles are strictly serialized; a full-catalog trigger that arrives while
/// another full cycle is running collapses into it and receives its result.
pub struct RefreshCoordinator {
    source: Arc<dyn DatabaseSource>,
    manager: Arc<ReaderManager>,
    cache: Arc<dyn QueryCache>,
    base_path: PathBuf,
    options: RefreshOptions,
    state: RwLock<RefreshState>,
    cycle_lock: tokio::sync::Mutex<()>,
    full_cycles: AtomicU64,
    last_summary: RwLock<Option<RefreshSummary>>,
}

impl RefreshCoordinator {
    /// Creates a coordinator writing into `base_path` (the same root the
    /// manager loads from).
    pub fn new(
        source: Arc<dyn DatabaseSource>,
        manager: Arc<ReaderManager>,
        cache: Arc<dyn QueryCache>,
        base_path: PathBuf,
        options: RefreshOptions,
    ) -> Self {
        Self {
            source,
            manager,
            cache,
            base_path,
            options,
            state: RwLock::new(RefreshState::Idle),
            cycle_lock: tokio::sync::Mutex::new(()),
            full_cycles: AtomicU64::new(0),
            last_summary: RwLock::new(None),
        }
    }

    /// Current phase of the state machine.
    pub fn state(&self) -> RefreshState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(RefreshState::Idle)
    }

    fn set_state(&self, state: RefreshState) {
        if let Ok(mut slot) = self.state.write() {
            log::debug!("Refresh state: {:?} -> {:?}", *slot, state);
            *slot = state;
        }
    }

    /// Refreshes every catalog database.
    ///
    /// Fully successful cycles return the summary; partial and total
    /// failures surface as [`RefreshError`] carrying the same per-database
    /// outcomes. Concurrent callers collapse into the running cycle.
    pub async fn run_cycle(&self) -> Result<RefreshSummary, RefreshError> {
        let observed = self.full_cycles.load(Ordering::SeqCst);
        let _guard = self.cycle_lock.lock().await;

        if self.full_cycles.load(Ordering::SeqCst) > observed {
            if let Some(summary) = self.last_summary.read().ok().and_then(|slot| slot.clone()) {
                log::debug!("Refresh trigger collapsed into the cycle that just completed");
                return summary.into_result();
            }
        }

        let descriptors: Vec<&'static DatabaseDescriptor> = CATALOG.iter().collect();
        let summary = self.execute_cycle(&descriptors).await;

        self.full_cycles.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.last_summary.write() {
            *slot = Some(summary.clone());
        }
        summary.into_result()
    }

    /// Refreshes a named subset of the catalog.
    ///
    /// Unknown names are rejected before any network work starts. Subset
    /// cycles serialize behind any running cycle but never collapse into
    /// one (the caller asked for specific databases).
    pub async fn retry(&self, names: &[String]) -> Result<RefreshSummary, RefreshError> {
        let mut descriptors = Vec::with_capacity(names.len());
        for name in names {
            let descriptor = descriptor_by_name(name)
                .ok_or_else(|| RefreshError::UnknownDatabase(name.clone()))?;
            descriptors.push(descriptor);
        }

        let _guard = self.cycle_lock.lock().await;
        let summary = self.execute_cycle(&descriptors).await;
        summary.into_result()
    }

    /// One full pass of the state machine over `descriptors`.
    async fn execute_cycle(&self, descriptors: &[&'static DatabaseDescriptor]) -> RefreshSummary {
        let started = Instant::now();
        log::info!(
            "Starting database refresh cycle ({} databases)",
            descriptors.len()
        );
        let mut outcomes: BTreeMap<String, RefreshOutcome> = BTreeMap::new();

        // Downloading: every descriptor in parallel, each with its own
        // retries; failures surface here as per-database outcomes.
        self.set_state(RefreshState::Downloading);
        let mut downloads = FuturesUnordered::new();
        for descriptor in descriptors {
            let descriptor: &'static DatabaseDescriptor = *descriptor;
            let live_path = descriptor.live_path(&self.base_path);
            let source = Arc::clone(&self.source);
            let policy = self.options.retry_policy;
            let min_file_size = self.options.min_file_size;
            downloads.push(async move {
                let result = download::download_with_retry(
                    source.as_ref(),
                    descriptor,
                    &live_path,
                    policy,
                    min_file_size,
                )
                .await;
                (descriptor, live_path, result)
            });
        }

        let mut staged = Vec::new();
        while let Some((descriptor, live_path, result)) = downloads.next().await {
            match result {
                Ok((temp, bytes)) => staged.push((descriptor, live_path, temp, bytes)),
                Err(e) => {
                    log::error!("Failed to download {}: {}", descriptor.name, e);
                    outcomes.insert(
                        descriptor.name.to_string(),
                        RefreshOutcome {
                            success: false,
                            bytes_downloaded: 0,
                            error_message: Some(e.to_string()),
                        },
                    );
                }
            }
        }

        // Validating: per file; a rejected file is discarded, its siblings
        // continue.
        self.set_state(RefreshState::Validating);
        let mut validated = Vec::new();
        for (descriptor, live_path, temp, bytes) in staged {
            match validate::validate_file(
                descriptor,
                &temp,
                self.options.min_file_size,
                self.options.probe_on_validate,
            )
            .await
            {
                Ok(()) => validated.push((descriptor, live_path, temp, bytes)),
                Err(e) => {
                    log::error!("Validation failed for {}: {}", descriptor.name, e);
                    let _ = tokio::fs::remove_file(&temp).await;
                    outcomes.insert(
                        descriptor.name.to_string(),
                        RefreshOutcome {
                            success: false,
                            bytes_downloaded: bytes,
                            error_message: Some(format!("validation failed: {}", e)),
                        },
                    );
                }
            }
        }

        // Swapping: same-filesystem rename; a reader opening the live path
        // sees the fully-old or fully-new file, never a partial write.
        self.set_state(RefreshState::Swapping);
        let mut swapped = 0usize;
        for (descriptor, live_path, temp, bytes) in validated {
            match tokio::fs::rename(&temp, &live_path).await {
                Ok(()) => {
                    log::info!("Promoted {} ({} bytes)", descriptor.name, bytes);
                    swapped += 1;
                    outcomes.insert(
                        descriptor.name.to_string(),
                        RefreshOutcome {
                            success: true,
                            bytes_downloaded: bytes,
                            error_message: None,
                        },
                    );
                }
                Err(e) => {
                    log::error!("Failed to promote {}: {}", descriptor.name, e);
                    let _ = tokio::fs::remove_file(&temp).await;
                    outcomes.insert(
                        descriptor.name.to_string(),
                        RefreshOutcome {
                            success: false,
                            bytes_downloaded: bytes,
                            error_message: Some(format!("promotion failed: {}", e)),
                        },
                    );
                }
            }
        }

        // ReaderReload: adopt whatever went live. A reload failure is not a
        // cycle failure — the previous generation keeps serving.
        if swapped > 0 {
            self.set_state(RefreshState::ReaderReload);
            if let Err(e) = self.manager.reload().await {
                log::error!(
                    "Reader reload failed after refresh; continuing to serve the previous \
                     generation: {}",
                    e
                );
            }
        }

        self.cleanup_temp_files().await;

        let summary = RefreshSummary::from_outcomes(outcomes);

        // Cached results memoize the retired data; drop them only once the
        // whole catalog is fresh.
        if summary.status == CycleStatus::Success && descriptors.len() == CATALOG.len() {
            self.cache.clear_all().await;
            log::info!("Cache cleared after database update");
        }

        self.set_state(match summary.status {
            CycleStatus::Success => RefreshState::Idle,
            CycleStatus::FailedPartial | CycleStatus::Failed => RefreshState::FailedPartial,
        });

        log::info!(
            "Refresh cycle complete in {:.1}s: {}/{} successful",
            started.elapsed().as_secs_f64(),
            summary.succeeded(),
            summary.outcomes.len()
        );
        summary
    }

    /// Removes temp files left behind by crashed or failed attempts.
    async fn cleanup_temp_files(&self) {
        let mut removed = 0usize;
        for dir in ["raw/maxmind", "raw/ip2location"] {
            let dir_path = self.base_path.join(dir);
            let Ok(mut entries) = tokio::fs::read_dir(&dir_path).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.contains(".tmp.") {
                    match tokio::fs::remove_file(entry.path()).await {
                        Ok(()) => removed += 1,
                        Err(e) => {
                            log::warn!("Failed to remove temp file {}: {}", name, e);
                        }
                    }
                }
            }
        }
        if removed > 0 {
            log::info!("Cleaned up {} temporary files", removed);
        }
    }
}
