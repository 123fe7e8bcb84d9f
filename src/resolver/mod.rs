//! Multi-source IP resolution.
//!
//! Answers a single-IP query by fanning out to every loaded reader in a
//! fixed order and merging their fields. Merging is last-writer-wins at the
//! field level: later sources both add new fields and overwrite earlier
//! ones for overlapping keys. This is deliberate, observable behavior —
//! IP2Proxy's verdict always wins for the proxy flags, and IP2Location's
//! geographic fields replace MaxMind's when both databases cover an address
//! (even though MaxMind City is usually the higher-fidelity source; see
//! DESIGN.md). Provenance is tracked per field so `full_data` callers can
//! see every contributor in order.

mod value;

pub use value::{Contribution, FieldValue};

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::catalog::{DatabaseKind, Provider};
use crate::error_handling::QueryError;
use crate::readers::DatabaseSet;

/// Fields returned when `full_data` is not requested.
pub const ESSENTIAL_FIELDS: [&str; 13] = [
    "country",
    "country_code",
    "city",
    "region",
    "postal_code",
    "isp",
    "organization",
    "timezone",
    "is_proxy",
    "is_vpn",
    "usage_type",
    "latitude",
    "longitude",
];

/// Merged result for one IP.
///
/// Serializes to a flat JSON object; the provenance and availability maps
/// appear under the reserved `_sources` / `_databases_available` keys and
/// only in `full_data` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Merged fields, every value non-placeholder.
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,

    /// Providers that contributed each field, in contribution order.
    #[serde(rename = "_sources", skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeMap<String, Vec<String>>>,

    /// Which catalog databases were loaded when this result was computed.
    #[serde(
        rename = "_databases_available",
        skip_serializing_if = "Option::is_none"
    )]
    pub databases_available: Option<BTreeMap<String, bool>>,
}

impl QueryResult {
    /// Convenience accessor for a merged field.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Outcome of resolving one valid IP.
///
/// `NotFound` is a result, not an error: callers may cache it.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// At least one reader had data for the address.
    Found(QueryResult),
    /// No loaded reader covers the address.
    NotFound,
}

impl QueryOutcome {
    /// JSON form used by the cache and by callers serializing responses:
    /// `null` for `NotFound`, the flat object otherwise.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            QueryOutcome::Found(result) => {
                serde_json::to_value(result).unwrap_or(serde_json::Value::Null)
            }
            QueryOutcome::NotFound => serde_json::Value::Null,
        }
    }

    /// Restores an outcome from its cached JSON form.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(QueryOutcome::NotFound),
            other => serde_json::from_value(other).ok().map(QueryOutcome::Found),
        }
    }
}

/// Parses a query input into an address, mapping syntax failures to the
/// per-item `InvalidInput` error.
pub fn parse_ip(input: &str) -> Result<IpAddr, QueryError> {
    input
        .parse::<IpAddr>()
        .map_err(|_| QueryError::InvalidInput(input.to_string()))
}

/// Resolves `ip` against every loaded reader in `set`.
///
/// Never mutates the set; safe against any generation snapshot.
pub fn resolve(set: &DatabaseSet, ip: IpAddr, full_data: bool) -> QueryOutcome {
    let contributions = collect(set, ip);
    let availability = full_data.then(|| {
        set.availability()
            .into_iter()
            .map(|(key, loaded)| (key.to_string(), loaded))
            .collect()
    });
    merge(contributions, availability, full_data)
}

/// Gathers per-provider contributions in fixed precedence order.
fn collect(set: &DatabaseSet, ip: IpAddr) -> Vec<(Provider, Contribution)> {
    let mut contributions = Vec::new();

    // MaxMind City, with Country as the coarse fallback when City is absent.
    if let Some(city) = set.maxmind(DatabaseKind::City) {
        if let Some(fields) = city.query_city(ip) {
            contributions.push((Provider::MaxMind, fields));
        }
    } else if let Some(country) = set.maxmind(DatabaseKind::Country) {
        if let Some(fields) = country.query_country(ip) {
            contributions.push((Provider::MaxMind, fields));
        }
    }

    if let Some(isp) = set.maxmind(DatabaseKind::Isp) {
        if let Some(fields) = isp.query_isp(ip) {
            contributions.push((Provider::MaxMind, fields));
        }
    }

    if let Some(connection) = set.maxmind(DatabaseKind::ConnectionType) {
        if let Some(fields) = connection.query_connection_type(ip) {
            contributions.push((Provider::MaxMind, fields));
        }
    }

    // IP2Location: pick the reader matching the address family, falling back
    // to the IPv4 database when no IPv6 one is loaded.
    let location = if ip.is_ipv6() {
        set.location(DatabaseKind::LocationV6)
            .or_else(|| set.location(DatabaseKind::LocationV4))
    } else {
        set.location(DatabaseKind::LocationV4)
    };
    if let Some(reader) = location {
        if let Some(fields) = reader.query(ip) {
            contributions.push((Provider::IP2Location, fields));
        }
    }

    if let Some(proxy) = set.proxy() {
        if let Some(fields) = proxy.query(ip) {
            contributions.push((Provider::IP2Proxy, fields));
        }
    }

    contributions
}

/// Merges ordered contributions into one result.
///
/// Later contributions overwrite earlier ones per field; `_sources` records
/// every contributor of a field in order. When `full_data` is false the
/// result is restricted to [`ESSENTIAL_FIELDS`].
fn merge(
    contributions: Vec<(Provider, Contribution)>,
    availability: Option<BTreeMap<String, bool>>,
    full_data: bool,
) -> QueryOutcome {
    let mut fields: BTreeMap<String, FieldValue> = BTreeMap::new();
    let mut sources: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (provider, contribution) in contributions {
        for (key, value) in contribution {
            if value.is_placeholder() {
                continue;
            }
            fields.insert(key.to_string(), value);
            let contributors = sources.entry(key.to_string()).or_default();
            if !contributors.iter().any(|name| name == provider.as_str()) {
                contributors.push(provider.as_str().to_string());
            }
        }
    }

    if fields.is_empty() {
        return QueryOutcome::NotFound;
    }

    if !full_data {
        fields.retain(|key, _| ESSENTIAL_FIELDS.contains(&key.as_str()));
        return QueryOutcome::Found(QueryResult {
            fields,
            sources: None,
            databases_available: None,
        });
    }

    QueryOutcome::Found(QueryResult {
        fields,
        sources: Some(sources),
        databases_available: availability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> FieldValue {
        FieldValue::Text(value.to_string())
    }

    #[test]
    fn test_parse_ip_accepts_both_families() {
        assert!(parse_ip("8.8.8.8").is_ok());
        assert!(parse_ip("2001:db8::1").is_ok());
    }

    #[test]
    fn test_parse_ip_rejects_bad_input() {
        for bad in ["", "not.an.ip", "256.1.1.1", "1.2.3", " 8.8.8.8", "8.8.8.8\n"] {
            let err = parse_ip(bad).unwrap_err();
            assert_eq!(err, QueryError::InvalidInput(bad.to_string()));
        }
    }

    #[test]
    fn test_merge_later_source_wins() {
        let contributions = vec![
            (Provider::MaxMind, vec![("country", text("X"))]),
            (Provider::IP2Location, vec![("country", text("Y"))]),
        ];
        let QueryOutcome::Found(result) = merge(contributions, None, false) else {
            panic!("expected a result");
        };
        assert_eq!(result.get("country"), Some(&text("Y")));
    }

    #[test]
    fn test_merge_tracks_sources_in_contribution_order() {
        let contributions = vec![
            (Provider::MaxMind, vec![("country", text("X"))]),
            (Provider::IP2Location, vec![("country", text("Y"))]),
        ];
        let QueryOutcome::Found(result) = merge(contributions, Some(BTreeMap::new()), true) else {
            panic!("expected a result");
        };
        let sources = result.sources.expect("full_data carries sources");
        assert_eq!(
            sources.get("country"),
            Some(&vec!["MaxMind".to_string(), "IP2Location".to_string()])
        );
    }

    #[test]
    fn test_merge_same_provider_listed_once() {
        // City and ISP are both MaxMind; a field touched by both lists the
        // provider a single time.
        let contributions = vec![
            (Provider::MaxMind, vec![("organization", text("A"))]),
            (Provider::MaxMind, vec![("organization", text("B"))]),
        ];
        let QueryOutcome::Found(result) = merge(contributions, Some(BTreeMap::new()), true) else {
            panic!("expected a result");
        };
        assert_eq!(result.get("organization"), Some(&text("B")));
        let sources = result.sources.unwrap();
        assert_eq!(sources.get("organization").unwrap().len(), 1);
    }

    #[test]
    fn test_merge_filters_placeholders() {
        let contributions = vec![
            (Provider::MaxMind, vec![("city", text("Mountain View"))]),
            (Provider::IP2Location, vec![("city", text("-"))]),
        ];
        let QueryOutcome::Found(result) = merge(contributions, None, false) else {
            panic!("expected a result");
        };
        // The placeholder never overwrites real data.
        assert_eq!(result.get("city"), Some(&text("Mountain View")));
    }

    #[test]
    fn test_merge_empty_is_not_found() {
        assert_eq!(merge(Vec::new(), None, false), QueryOutcome::NotFound);
    }

    #[test]
    fn test_country_fallback_shape() {
        // With only the Country database contributing, the result carries
        // the country fields and nothing city-level.
        let contributions = vec![(
            Provider::MaxMind,
            vec![
                ("country", text("United States")),
                ("country_code", text("US")),
            ],
        )];
        let QueryOutcome::Found(result) = merge(contributions, None, false) else {
            panic!("expected a result");
        };
        assert_eq!(result.get("country"), Some(&text("United States")));
        assert_eq!(result.get("country_code"), Some(&text("US")));
        assert!(result.get("city").is_none());
    }

    #[test]
    fn test_essential_filter_drops_extras() {
        let contributions = vec![(
            Provider::MaxMind,
            vec![
                ("country", text("United States")),
                ("accuracy_radius", FieldValue::Int(1000)),
                ("connection_type", text("Cable/DSL")),
            ],
        )];
        let QueryOutcome::Found(result) = merge(contributions, None, false) else {
            panic!("expected a result");
        };
        assert!(result.get("country").is_some());
        assert!(result.get("accuracy_radius").is_none());
        assert!(result.get("connection_type").is_none());
        assert!(result.sources.is_none());
    }

    #[test]
    fn test_full_data_keeps_all_fields() {
        let contributions = vec![(
            Provider::MaxMind,
            vec![
                ("country", text("United States")),
                ("accuracy_radius", FieldValue::Int(1000)),
            ],
        )];
        let QueryOutcome::Found(result) = merge(contributions, Some(BTreeMap::new()), true) else {
            panic!("expected a result");
        };
        assert!(result.get("accuracy_radius").is_some());
        assert!(result.databases_available.is_some());
    }

    #[test]
    fn test_proxy_flags_merge() {
        // IP2Proxy reporting a VPN yields the full flag set.
        let contributions = vec![
            (
                Provider::MaxMind,
                vec![("country", text("United States"))],
            ),
            (
                Provider::IP2Proxy,
                vec![
                    ("is_proxy", FieldValue::Bool(true)),
                    ("is_vpn", FieldValue::Bool(true)),
                    ("is_tor", FieldValue::Bool(false)),
                    ("is_datacenter", FieldValue::Bool(false)),
                    ("proxy_type", text("VPN")),
                ],
            ),
        ];
        let QueryOutcome::Found(result) = merge(contributions, None, false) else {
            panic!("expected a result");
        };
        assert_eq!(result.get("is_proxy"), Some(&FieldValue::Bool(true)));
        assert_eq!(result.get("is_vpn"), Some(&FieldValue::Bool(true)));
        assert_eq!(result.get("is_tor"), Some(&FieldValue::Bool(false)));
        // proxy_type is not an essential field.
        assert!(result.get("proxy_type").is_none());
    }

    #[test]
    fn test_outcome_json_round_trip() {
        let contributions = vec![(
            Provider::IP2Location,
            vec![
                ("country", text("Germany")),
                ("latitude", FieldValue::Float(52.52)),
                ("is_proxy", FieldValue::Bool(false)),
            ],
        )];
        let outcome = merge(contributions, None, false);
        let restored = QueryOutcome::from_json(outcome.to_json()).expect("round trip");
        assert_eq!(outcome, restored);

        assert_eq!(
            QueryOutcome::from_json(serde_json::Value::Null),
            Some(QueryOutcome::NotFound)
        );
    }
}
