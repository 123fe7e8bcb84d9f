//! Shared test helpers.
//!
//! The refresh tests need files that the real reader libraries accept, so
//! `minimal_mmdb` hand-assembles the smallest MMDB file `maxminddb` will
//! open: a one-node search tree that resolves every address to "no data",
//! padding to clear the size floor, and a complete metadata section.

#![allow(dead_code)]

/// Marker separating the data section from the metadata map.
pub const METADATA_MARKER: &[u8] = b"\xab\xcd\xefMaxMind.com";

/// A parseable MMDB file with no data records.
///
/// Lookups against it succeed and report "address not found", which is all
/// the refresh tests need: the reader opens, so the database counts as
/// available after a reload.
pub fn minimal_mmdb() -> Vec<u8> {
    let mut bytes = Vec::new();

    // Search tree: one node, record size 24 bits, both records equal to
    // node_count (= "no data down this branch").
    bytes.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x01]);

    // Data section separator.
    bytes.extend_from_slice(&[0u8; 16]);

    // Padding so the file clears the minimum-size validation.
    bytes.extend_from_slice(&vec![0u8; 2048]);

    bytes.extend_from_slice(METADATA_MARKER);
    bytes.extend_from_slice(&metadata_map());
    bytes
}

/// Bytes that pass the size floor but are not a database of any format.
pub fn opaque_blob() -> Vec<u8> {
    vec![0x42u8; 2048]
}

/// The MMDB metadata map with every field the reader requires.
fn metadata_map() -> Vec<u8> {
    let mut map = vec![0xE9]; // map with 9 entries

    push_str(&mut map, "binary_format_major_version");
    map.extend_from_slice(&[0xA1, 0x02]); // uint16 2
    push_str(&mut map, "binary_format_minor_version");
    map.push(0xA0); // uint16 0
    push_str(&mut map, "build_epoch");
    map.extend_from_slice(&[0x04, 0x02, 0x65, 0x53, 0xF1, 0x00]); // uint64
    push_str(&mut map, "database_type");
    push_str(&mut map, "Test");
    push_str(&mut map, "description");
    map.push(0xE1); // map with 1 entry
    push_str(&mut map, "en");
    push_str(&mut map, "Test database");
    push_str(&mut map, "ip_version");
    map.extend_from_slice(&[0xA1, 0x06]); // uint16 6
    push_str(&mut map, "languages");
    map.extend_from_slice(&[0x01, 0x04]); // array with 1 entry
    push_str(&mut map, "en");
    push_str(&mut map, "node_count");
    map.extend_from_slice(&[0xC1, 0x01]); // uint32 1
    push_str(&mut map, "record_size");
    map.extend_from_slice(&[0xA1, 0x18]); // uint16 24

    map
}

fn push_str(out: &mut Vec<u8>, s: &str) {
    // UTF-8 string control byte; every string used here is under 29 bytes.
    out.push(0x40 | s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

#[test]
fn test_minimal_mmdb_is_parseable() {
    let reader = maxminddb::Reader::from_source(minimal_mmdb()).expect("reader opens the file");
    assert_eq!(reader.metadata.node_count, 1);
    assert_eq!(reader.metadata.record_size, 24);

    // Lookups resolve to "no data", never an error.
    let lookup = reader
        .lookup("::1".parse::<std::net::IpAddr>().unwrap())
        .expect("lookup succeeds");
    assert!(!lookup.has_data());
}
