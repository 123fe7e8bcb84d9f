//! IP2Location / IP2Proxy BIN reader wrappers.
//!
//! The BIN reader performs seeks against the open file per lookup and
//! therefore needs `&mut self`; the wrappers hide that behind a short
//! `std::sync::Mutex` critical section so the rest of the query path can
//! treat a loaded generation as immutable. Lookup failures are absorbed into
//! "no contribution", matching the MaxMind wrapper.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use ip2location::{Record, DB};

use crate::readers::Closeable;
use crate::resolver::{Contribution, FieldValue};

/// An open IP2Location geolocation database (IPv4 or IPv6 variant).
pub struct LocationReader {
    inner: Mutex<Option<DB>>,
    name: &'static str,
}

/// An open IP2Proxy proxy-detection database.
pub struct ProxyReader {
    inner: Mutex<Option<DB>>,
    name: &'static str,
}

/// Opens a BIN database off the async runtime's blocking pool.
async fn open_bin(name: &'static str, path: &Path) -> Result<DB> {
    let path_buf = path.to_path_buf();
    let db = tokio::task::spawn_blocking(move || DB::from_file(&path_buf))
        .await
        .context("BIN open task failed")?
        .map_err(|e| {
            anyhow!(
                "Failed to open IP2Location database {} from {}: {:?}",
                name,
                path.display(),
                e
            )
        })?;
    Ok(db)
}

impl LocationReader {
    /// Opens an IP2Location BIN file.
    pub async fn open(name: &'static str, path: &Path) -> Result<Self> {
        let db = open_bin(name, path).await?;
        Ok(Self {
            inner: Mutex::new(Some(db)),
            name,
        })
    }

    /// Geolocation fields for `ip`, with source placeholders filtered out.
    pub fn query(&self, ip: IpAddr) -> Option<Contribution> {
        // The record borrows from the open DB, so extraction runs while the
        // lookup lock is held.
        let mut fields = Contribution::new();
        {
            let mut guard = self.inner.lock().ok()?;
            let db = guard.as_mut()?;
            let record = db.ip_lookup(ip).ok()?;
            let Record::LocationDb(rec) = record else {
                return None;
            };

            if let Some(country) = rec.country {
                push_text(&mut fields, "country", country.long_name);
                push_text(&mut fields, "country_code", country.short_name);
            }
            push_opt_text(&mut fields, "region", rec.region);
            push_opt_text(&mut fields, "city", rec.city);
            if let Some(latitude) = rec.latitude {
                fields.push(("latitude", FieldValue::Float(f64::from(latitude))));
            }
            if let Some(longitude) = rec.longitude {
                fields.push(("longitude", FieldValue::Float(f64::from(longitude))));
            }
            push_opt_text(&mut fields, "isp", rec.isp);
            push_opt_text(&mut fields, "domain", rec.domain);
            push_opt_text(&mut fields, "usage_type", rec.usage_type);
            push_opt_text(&mut fields, "mobile_brand", rec.mobile_brand);
        }

        non_empty(fields)
    }
}

impl Closeable for LocationReader {
    fn close(&mut self) {
        let taken = self
            .inner
            .get_mut()
            .map(|slot| slot.take().is_some())
            .unwrap_or(false);
        if taken {
            log::debug!("Closed IP2Location reader: {}", self.name);
        }
    }
}

impl ProxyReader {
    /// Opens an IP2Proxy BIN file.
    pub async fn open(name: &'static str, path: &Path) -> Result<Self> {
        let db = open_bin(name, path).await?;
        Ok(Self {
            inner: Mutex::new(Some(db)),
            name,
        })
    }

    /// Proxy-detection fields for `ip`.
    ///
    /// A record whose proxy type is the `"-"` placeholder means "known
    /// address, not a proxy": the flags are still reported, all false, so
    /// downstream consumers can rely on their presence.
    pub fn query(&self, ip: IpAddr) -> Option<Contribution> {
        // The record borrows from the open DB, so extraction runs while the
        // lookup lock is held.
        let mut fields = Contribution::new();
        {
            let mut guard = self.inner.lock().ok()?;
            let db = guard.as_mut()?;
            let record = db.ip_lookup(ip).ok()?;
            let Record::ProxyDb(rec) = record else {
                return None;
            };

            let proxy_type = rec
                .proxy_type
                .filter(|proxy_type| proxy_type.as_ref() != "-" && !proxy_type.is_empty());

            match proxy_type {
                Some(proxy_type) => {
                    let tokens: Vec<&str> = proxy_type.split(',').map(str::trim).collect();
                    fields.push(("is_proxy", FieldValue::Bool(true)));
                    fields.push(("is_vpn", FieldValue::Bool(tokens.contains(&"VPN"))));
                    fields.push(("is_tor", FieldValue::Bool(tokens.contains(&"TOR"))));
                    fields.push(("is_datacenter", FieldValue::Bool(tokens.contains(&"DCH"))));
                    fields.push(("proxy_type", FieldValue::Text(proxy_type.into_owned())));
                }
                None => {
                    fields.push(("is_proxy", FieldValue::Bool(false)));
                    fields.push(("is_vpn", FieldValue::Bool(false)));
                    fields.push(("is_tor", FieldValue::Bool(false)));
                    fields.push(("is_datacenter", FieldValue::Bool(false)));
                }
            }
        }

        Some(fields)
    }
}

impl Closeable for ProxyReader {
    fn close(&mut self) {
        let taken = self
            .inner
            .get_mut()
            .map(|slot| slot.take().is_some())
            .unwrap_or(false);
        if taken {
            log::debug!("Closed IP2Proxy reader: {}", self.name);
        }
    }
}

fn push_text(fields: &mut Contribution, key: &'static str, value: impl Into<String>) {
    let value = FieldValue::Text(value.into());
    if !value.is_placeholder() {
        fields.push((key, value));
    }
}

fn push_opt_text(fields: &mut Contribution, key: &'static str, value: Option<impl Into<String>>) {
    if let Some(text) = value {
        push_text(fields, key, text);
    }
}

fn non_empty(fields: Contribution) -> Option<Contribution> {
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}
