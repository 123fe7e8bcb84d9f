//! The fixed catalog of known GeoIP databases.
//!
//! Every database this service distributes and queries is declared here at
//! compile time: its provider, its logical kind, and where it lives under the
//! shared `raw/{maxmind,ip2location}` on-disk layout. The loader and the
//! refresh coordinator both resolve paths through this catalog, so they can
//! never disagree about where a database file belongs.

use std::path::{Path, PathBuf};

use strum_macros::EnumIter;

/// Database vendor a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// MaxMind GeoIP2 (MMDB format).
    MaxMind,
    /// IP2Location geolocation databases (BIN format).
    IP2Location,
    /// IP2Proxy proxy-detection database (BIN format).
    IP2Proxy,
}

impl Provider {
    /// Provider name as reported in `_sources` provenance lists.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::MaxMind => "MaxMind",
            Provider::IP2Location => "IP2Location",
            Provider::IP2Proxy => "IP2Proxy",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical kind of a database, used as the key of a loaded reader set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum DatabaseKind {
    /// MaxMind city-level geolocation.
    City,
    /// MaxMind country-level geolocation (City fallback).
    Country,
    /// MaxMind ISP and autonomous-system data.
    Isp,
    /// MaxMind connection type.
    ConnectionType,
    /// IP2Location geolocation, IPv4 address space.
    LocationV4,
    /// IP2Location geolocation, IPv6 address space.
    LocationV6,
    /// IP2Proxy proxy detection.
    Proxy,
}

impl DatabaseKind {
    /// Stable status key for this kind, e.g. `"maxmind_city"`.
    pub fn key(&self) -> &'static str {
        match self {
            DatabaseKind::City => "maxmind_city",
            DatabaseKind::Country => "maxmind_country",
            DatabaseKind::Isp => "maxmind_isp",
            DatabaseKind::ConnectionType => "maxmind_connection_type",
            DatabaseKind::LocationV4 => "ip2location_v4",
            DatabaseKind::LocationV6 => "ip2location_v6",
            DatabaseKind::Proxy => "ip2proxy",
        }
    }
}

/// One entry of the fixed database catalog.
///
/// Descriptors are immutable and defined at compile time; configuration can
/// choose *where* the catalog is rooted, never *what* it contains.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseDescriptor {
    /// Logical file name, also the name used by the refresh/retry interfaces.
    pub name: &'static str,
    /// Vendor the file comes from.
    pub provider: Provider,
    /// Logical kind, the key under which the opened reader is registered.
    pub kind: DatabaseKind,
    /// Path relative to the database root, shared with the remote repository.
    pub relative_path: &'static str,
}

impl DatabaseDescriptor {
    /// Absolute live path of this database under `base_path`.
    pub fn live_path(&self, base_path: &Path) -> PathBuf {
        base_path.join(self.relative_path)
    }
}

/// The seven known databases, in resolver precedence order.
pub static CATALOG: [DatabaseDescriptor; 7] = [
    DatabaseDescriptor {
        name: "GeoIP2-City.mmdb",
        provider: Provider::MaxMind,
        kind: DatabaseKind::City,
        relative_path: "raw/maxmind/GeoIP2-City.mmdb",
    },
    DatabaseDescriptor {
        name: "GeoIP2-Country.mmdb",
        provider: Provider::MaxMind,
        kind: DatabaseKind::Country,
        relative_path: "raw/maxmind/GeoIP2-Country.mmdb",
    },
    DatabaseDescriptor {
        name: "GeoIP2-ISP.mmdb",
        provider: Provider::MaxMind,
        kind: DatabaseKind::Isp,
        relative_path: "raw/maxmind/GeoIP2-ISP.mmdb",
    },
    DatabaseDescriptor {
        name: "GeoIP2-Connection-Type.mmdb",
        provider: Provider::MaxMind,
        kind: DatabaseKind::ConnectionType,
        relative_path: "raw/maxmind/GeoIP2-Connection-Type.mmdb",
    },
    DatabaseDescriptor {
        name: "IP-COUNTRY-REGION-CITY-LATITUDE-LONGITUDE-ISP-DOMAIN-MOBILE-USAGETYPE.BIN",
        provider: Provider::IP2Location,
        kind: DatabaseKind::LocationV4,
        relative_path: "raw/ip2location/IP-COUNTRY-REGION-CITY-LATITUDE-LONGITUDE-ISP-DOMAIN-MOBILE-USAGETYPE.BIN",
    },
    DatabaseDescriptor {
        name: "IPV6-COUNTRY-REGION-CITY-LATITUDE-LONGITUDE-ISP-DOMAIN-MOBILE-USAGETYPE.BIN",
        provider: Provider::IP2Location,
        kind: DatabaseKind::LocationV6,
        relative_path: "raw/ip2location/IPV6-COUNTRY-REGION-CITY-LATITUDE-LONGITUDE-ISP-DOMAIN-MOBILE-USAGETYPE.BIN",
    },
    DatabaseDescriptor {
        name: "IP2PROXY-IP-PROXYTYPE-COUNTRY.BIN",
        provider: Provider::IP2Proxy,
        kind: DatabaseKind::Proxy,
        relative_path: "raw/ip2location/IP2PROXY-IP-PROXYTYPE-COUNTRY.BIN",
    },
];

/// Looks up a catalog entry by its logical file name.
pub fn descriptor_by_name(name: &str) -> Option<&'static DatabaseDescriptor> {
    CATALOG.iter().find(|d| d.name == name)
}

/// Looks up a catalog entry by kind.
pub fn descriptor_by_kind(kind: DatabaseKind) -> &'static DatabaseDescriptor {
    CATALOG
        .iter()
        .find(|d| d.kind == kind)
        .expect("every DatabaseKind has a catalog entry")
}
