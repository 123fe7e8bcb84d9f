//! Field value representation for merged query results.

use serde::{Deserialize, Serialize};

/// A single merged field value.
///
/// Serializes untagged, so a `QueryResult` renders as a flat JSON object
/// (`{"country": "United States", "latitude": 37.386, "is_proxy": false}`).
/// Untagged deserialization restores cached results from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean flag (the proxy verdict fields).
    Bool(bool),
    /// Small unsigned integer (ASN, accuracy radius).
    Int(u32),
    /// Coordinate or other floating-point value.
    Float(f64),
    /// Everything else.
    Text(String),
}

/// Fields contributed by one reader for one IP, in extraction order.
pub type Contribution = Vec<(&'static str, FieldValue)>;

impl FieldValue {
    /// Whether this value is a placeholder a source database uses for
    /// "no data" (`"-"` or an empty string). Placeholders are dropped
    /// before merging so they can never overwrite real data.
    pub fn is_placeholder(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.is_empty() || text == "-",
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(value)
    }
}
