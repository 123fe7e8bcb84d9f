//! geoip_hub library: multi-source GeoIP resolution and refresh engine
//!
//! This library loads several independently-formatted binary geo-databases
//! (MaxMind MMDB, IP2Location/IP2Proxy BIN) into in-memory readers, answers
//! per-IP queries by merging fields across every loaded reader, and keeps
//! the reader set consistent while a background refresh process atomically
//! replaces the underlying files on a schedule.
//!
//! # Example
//!
//! ```no_run
//! use geoip_hub::config::Config;
//! use geoip_hub::initialization::init_service;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     database_path: "/data/databases".into(),
//!     source_base_url: Some("https://geoip.example.com/databases".to_string()),
//!     ..Default::default()
//! };
//!
//! let service = init_service(&config).await?;
//! let outcome = service.manager.query("8.8.8.8", false).await?;
//! println!("{}", outcome.to_json());
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your
//! application or ensure you're calling library functions within an async
//! context.

#![warn(missing_docs)]

mod catalog;
pub mod cache;
pub mod config;
mod error_handling;
pub mod initialization;
mod manager;
mod readers;
mod refresh;
mod resolver;
mod retry;

// Re-export public API
pub use catalog::{
    descriptor_by_kind, descriptor_by_name, DatabaseDescriptor, DatabaseKind, Provider, CATALOG,
};
pub use error_handling::{
    DownloadError, InitializationError, QueryError, RefreshError, ReloadError, ValidationError,
};
pub use manager::{IpReport, ReaderGeneration, ReaderManager};
pub use readers::{Closeable, DatabaseSet, LocationReader, MaxmindReader, ProxyReader, ReaderHandle};
pub use refresh::{
    parse_schedule, run_scheduler, validate_file, CycleStatus, DatabaseSource, HttpSource,
    RefreshCoordinator, RefreshOptions, RefreshOutcome, RefreshState, RefreshSummary,
};
pub use resolver::{Contribution, FieldValue, QueryOutcome, QueryResult, ESSENTIAL_FIELDS};
pub use retry::{RetryPolicy, Retryable};
