//! Downloaded file validation.
//!
//! Validation runs against the temp file, before promotion, and is
//! deliberately cheaper than a full structural parse: a size floor for every
//! format, the metadata marker for MMDB files, and optionally an open-probe
//! with the real reader library as the strongest signal.

use std::path::Path;

use ip2location::DB;
use maxminddb::Reader;

use crate::catalog::{DatabaseDescriptor, Provider};
use crate::error_handling::ValidationError;

/// Marker that terminates the data section of every MMDB file; the metadata
/// map follows it.
const MMDB_METADATA_MARKER: &[u8] = b"\xab\xcd\xefMaxMind.com";

/// MMDB metadata lives in the last 128 KiB of the file.
const MARKER_SEARCH_WINDOW: usize = 128 * 1024;

/// Validates one downloaded database file.
///
/// # Arguments
///
/// * `descriptor` - Catalog entry the file claims to be
/// * `path` - Temp file to validate
/// * `min_file_size` - Size floor below which the file is rejected outright
/// * `probe` - Whether to also open the file with the reader library
pub async fn validate_file(
    descriptor: &DatabaseDescriptor,
    path: &Path,
    min_file_size: u64,
    probe: bool,
) -> Result<(), ValidationError> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() < min_file_size {
        return Err(ValidationError::TooSmall {
            size: metadata.len(),
            minimum: min_file_size,
        });
    }

    match descriptor.provider {
        Provider::MaxMind => {
            let bytes = tokio::fs::read(path).await?;
            if !tail_contains_marker(&bytes) {
                return Err(ValidationError::MissingMarker);
            }
            if probe {
                Reader::from_source(bytes)
                    .map_err(|e| ValidationError::ProbeFailed(e.to_string()))?;
            }
        }
        Provider::IP2Location | Provider::IP2Proxy => {
            // BIN files carry no cheap trailer to check; the open-probe is
            // the real validation for them.
            if probe {
                let path_buf = path.to_path_buf();
                tokio::task::spawn_blocking(move || DB::from_file(&path_buf))
                    .await
                    .map_err(|e| ValidationError::ProbeFailed(e.to_string()))?
                    .map_err(|e| ValidationError::ProbeFailed(format!("{:?}", e)))?;
            }
        }
    }

    Ok(())
}

fn tail_contains_marker(bytes: &[u8]) -> bool {
    let start = bytes.len().saturating_sub(MARKER_SEARCH_WINDOW);
    let tail = &bytes[start..];
    tail.windows(MMDB_METADATA_MARKER.len())
        .any(|window| window == MMDB_METADATA_MARKER)
}
