//! MaxMind MMDB reader wrapper.
//!
//! Wraps `maxminddb::Reader` over owned bytes and extracts the fields each
//! MaxMind database kind contributes to a merged result. Lookup failures are
//! absorbed into "no contribution": a single unhealthy database must never
//! fail a query that other databases can still answer.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use maxminddb::Reader;

use crate::readers::Closeable;
use crate::resolver::{Contribution, FieldValue};

/// An open MaxMind database of any kind (City, Country, ISP, Connection-Type).
#[derive(Debug)]
pub struct MaxmindReader {
    inner: Option<Reader<Vec<u8>>>,
    name: &'static str,
}

impl MaxmindReader {
    /// Opens an MMDB file by reading it fully into memory.
    pub async fn open(name: &'static str, path: &Path) -> Result<Self> {
        let db_bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read MaxMind database from {}", path.display()))?;

        let reader = Reader::from_source(db_bytes)
            .with_context(|| format!("Failed to parse MaxMind database from {}", path.display()))?;

        Ok(Self {
            inner: Some(reader),
            name,
        })
    }

    /// Database build epoch, for status/debug logging.
    pub fn build_epoch(&self) -> Option<u64> {
        self.inner.as_ref().map(|r| r.metadata.build_epoch)
    }

    /// A handle with no underlying reader; contributes nothing to queries.
    #[cfg(test)]
    pub(crate) fn closed_for_test(name: &'static str) -> Self {
        Self { inner: None, name }
    }

    /// Decodes the record for `ip` as `T`, or `None` when the database has
    /// no data for it (or the reader is already closed).
    fn decode<'a, T>(&'a self, ip: IpAddr) -> Option<T>
    where
        T: serde::Deserialize<'a>,
    {
        let reader = self.inner.as_ref()?;
        let lookup = reader.lookup(ip).ok()?;
        if !lookup.has_data() {
            return None;
        }
        lookup.decode().ok()?
    }

    /// City database: geographic fields.
    pub fn query_city(&self, ip: IpAddr) -> Option<Contribution> {
        let city: maxminddb::geoip2::City = self.decode(ip)?;

        let mut fields = Contribution::new();
        push_text(&mut fields, "country", city.country.names.english);
        push_text(&mut fields, "country_code", city.country.iso_code);
        push_text(&mut fields, "city", city.city.names.english);
        // Subdivisions are ordered least to most specific.
        if let Some(subdivision) = city.subdivisions.last() {
            push_text(&mut fields, "region", subdivision.names.english);
        }
        push_text(&mut fields, "postal_code", city.postal.code);
        if let Some(latitude) = city.location.latitude {
            fields.push(("latitude", FieldValue::Float(latitude)));
        }
        if let Some(longitude) = city.location.longitude {
            fields.push(("longitude", FieldValue::Float(longitude)));
        }
        push_text(&mut fields, "timezone", city.location.time_zone);
        if let Some(radius) = city.location.accuracy_radius {
            fields.push(("accuracy_radius", FieldValue::Int(u32::from(radius))));
        }

        non_empty(fields)
    }

    /// Country database: coarse fallback when no City database is loaded.
    pub fn query_country(&self, ip: IpAddr) -> Option<Contribution> {
        let country: maxminddb::geoip2::Country = self.decode(ip)?;

        let mut fields = Contribution::new();
        push_text(&mut fields, "country", country.country.names.english);
        push_text(&mut fields, "country_code", country.country.iso_code);

        non_empty(fields)
    }

    /// ISP database: network operator fields.
    pub fn query_isp(&self, ip: IpAddr) -> Option<Contribution> {
        let isp: maxminddb::geoip2::Isp = self.decode(ip)?;

        let mut fields = Contribution::new();
        push_text(&mut fields, "isp", isp.isp);
        push_text(&mut fields, "organization", isp.organization);
        if let Some(asn) = isp.autonomous_system_number {
            fields.push(("autonomous_system_number", FieldValue::Int(asn)));
        }
        push_text(
            &mut fields,
            "autonomous_system_organization",
            isp.autonomous_system_organization,
        );

        non_empty(fields)
    }

    /// Connection-Type database: a single field.
    pub fn query_connection_type(&self, ip: IpAddr) -> Option<Contribution> {
        let connection: maxminddb::geoip2::ConnectionType = self.decode(ip)?;

        let mut fields = Contribution::new();
        push_text(&mut fields, "connection_type", connection.connection_type);

        non_empty(fields)
    }
}

impl Closeable for MaxmindReader {
    fn close(&mut self) {
        if self.inner.take().is_some() {
            log::debug!("Closed MaxMind reader: {}", self.name);
        }
    }
}

fn push_text(fields: &mut Contribution, key: &'static str, value: Option<&str>) {
    if let Some(text) = value {
        let value = FieldValue::from(text);
        if !value.is_placeholder() {
            fields.push((key, value));
        }
    }
}

fn non_empty(fields: Contribution) -> Option<Contribution> {
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}
