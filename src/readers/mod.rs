//! Loaded database readers.
//!
//! A [`DatabaseSet`] is the concrete collection of open readers for one
//! generation, keyed by [`DatabaseKind`]. Loading is best-effort per
//! database: a missing or corrupt file reduces query coverage but never
//! fails the whole load. Every entry is either fully open or absent — a
//! query can never observe a half-initialized handle.

mod ip2location;
mod maxmind;

pub use ip2location::{LocationReader, ProxyReader};
pub use maxmind::MaxmindReader;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use strum::IntoEnumIterator;

use crate::catalog::{DatabaseDescriptor, DatabaseKind, CATALOG};

/// Uniform cleanup capability for every concrete reader wrapper.
///
/// `close` is idempotent and infallible: failures while releasing a reader
/// are logged by the implementation, never propagated, so closing a set can
/// never block shutdown or a generation swap.
pub trait Closeable {
    /// Releases the underlying reader. Subsequent queries return no data.
    fn close(&mut self);
}

/// An open reader of any supported format.
pub enum ReaderHandle {
    /// MaxMind MMDB reader.
    Maxmind(MaxmindReader),
    /// IP2Location BIN reader.
    Location(LocationReader),
    /// IP2Proxy BIN reader.
    Proxy(ProxyReader),
}

impl Closeable for ReaderHandle {
    fn close(&mut self) {
        match self {
            ReaderHandle::Maxmind(reader) => reader.close(),
            ReaderHandle::Location(reader) => reader.close(),
            ReaderHandle::Proxy(reader) => reader.close(),
        }
    }
}

/// The set of readers loaded for one generation.
#[derive(Default)]
pub struct DatabaseSet {
    readers: BTreeMap<DatabaseKind, ReaderHandle>,
}

impl DatabaseSet {
    /// A set with no readers; queries against it report the service as
    /// unavailable rather than answering `NotFound`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every catalog database present under `base_path`.
    ///
    /// Files that are missing are skipped silently (reduced coverage);
    /// files that fail to open are logged and skipped. The returned set is
    /// whatever subset could actually be opened.
    pub async fn load(base_path: &Path) -> Self {
        let mut readers = BTreeMap::new();

        for descriptor in &CATALOG {
            let path = descriptor.live_path(base_path);
            if !path.exists() {
                log::debug!("Database not present, skipping: {}", path.display());
                continue;
            }

            match open_reader(descriptor, &path).await {
                Ok(handle) => {
                    log::info!(
                        "Loaded {} {} database: {}",
                        descriptor.provider,
                        descriptor.kind.key(),
                        descriptor.name
                    );
                    readers.insert(descriptor.kind, handle);
                }
                Err(e) => {
                    log::error!(
                        "Failed to load {} database {}: {:#}",
                        descriptor.provider,
                        descriptor.name,
                        e
                    );
                }
            }
        }

        Self { readers }
    }

    /// Closes every reader in the set. Idempotent.
    pub fn close(&mut self) {
        for handle in self.readers.values_mut() {
            handle.close();
        }
    }

    /// Whether no reader at all is loaded.
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Number of loaded readers.
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Whether a reader for `kind` is loaded.
    pub fn contains(&self, kind: DatabaseKind) -> bool {
        self.readers.contains_key(&kind)
    }

    /// The MaxMind reader registered under `kind`, if loaded.
    pub fn maxmind(&self, kind: DatabaseKind) -> Option<&MaxmindReader> {
        match self.readers.get(&kind) {
            Some(ReaderHandle::Maxmind(reader)) => Some(reader),
            _ => None,
        }
    }

    /// The IP2Location reader registered under `kind`, if loaded.
    pub fn location(&self, kind: DatabaseKind) -> Option<&LocationReader> {
        match self.readers.get(&kind) {
            Some(ReaderHandle::Location(reader)) => Some(reader),
            _ => None,
        }
    }

    /// The IP2Proxy reader, if loaded.
    pub fn proxy(&self) -> Option<&ProxyReader> {
        match self.readers.get(&DatabaseKind::Proxy) {
            Some(ReaderHandle::Proxy(reader)) => Some(reader),
            _ => None,
        }
    }

    /// Per-kind availability over the full catalog, loaded or not.
    pub fn availability(&self) -> BTreeMap<&'static str, bool> {
        DatabaseKind::iter()
            .map(|kind| (kind.key(), self.contains(kind)))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&mut self, kind: DatabaseKind, handle: ReaderHandle) {
        self.readers.insert(kind, handle);
    }
}

impl Drop for DatabaseSet {
    fn drop(&mut self) {
        self.close();
    }
}

async fn open_reader(descriptor: &DatabaseDescriptor, path: &Path) -> Result<ReaderHandle> {
    let handle = match descriptor.kind {
        DatabaseKind::City
        | DatabaseKind::Country
        | DatabaseKind::Isp
        | DatabaseKind::ConnectionType => {
            ReaderHandle::Maxmind(MaxmindReader::open(descriptor.name, path).await?)
        }
        DatabaseKind::LocationV4 | DatabaseKind::LocationV6 => {
            ReaderHandle::Location(LocationReader::open(descriptor.name, path).await?)
        }
        DatabaseKind::Proxy => ReaderHandle::Proxy(ProxyReader::open(descriptor.name, path).await?),
    };
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_empty_directory_yields_empty_set() {
        let temp_dir = TempDir::new().expect("temp dir");
        let set = DatabaseSet::load(temp_dir.path()).await;
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[tokio::test]
    async fn test_load_skips_corrupt_files() {
        // A corrupt file produces a missing key, not a crash.
        let temp_dir = TempDir::new().expect("temp dir");
        let city_path = temp_dir.path().join("raw/maxmind/GeoIP2-City.mmdb");
        tokio::fs::create_dir_all(city_path.parent().unwrap())
            .await
            .expect("create dirs");
        tokio::fs::write(&city_path, b"garbage bytes")
            .await
            .expect("write corrupt file");

        let set = DatabaseSet::load(temp_dir.path()).await;
        assert!(!set.contains(DatabaseKind::City));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_availability_covers_full_catalog() {
        let set = DatabaseSet::empty();
        let availability = set.availability();
        assert_eq!(availability.len(), CATALOG.len());
        assert!(availability.values().all(|loaded| !loaded));
        assert!(availability.contains_key("maxmind_city"));
        assert!(availability.contains_key("ip2proxy"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut set = DatabaseSet::empty();
        set.close();
        set.close();
    }
}
