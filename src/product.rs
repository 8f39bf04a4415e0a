//! PIM product record shapes.
//!
//! Only the fields the media pipeline actually inspects are modeled; the PIM
//! export carries plenty more, and unknown keys are ignored on deserialize.
//! Optional wrappers reflect sporadic omissions in upstream exports.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One localized/scoped value of a product attribute.
///
/// `data` is deliberately untyped: the PIM emits strings, numbers, objects
/// and arrays through the same slot depending on attribute type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeValue {
    pub data: serde_json::Value,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

/// A product as delivered by the PIM export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub identifier: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    /// Attribute map keyed by attribute code, preserving export order.
    #[serde(default)]
    pub values: IndexMap<String, Vec<AttributeValue>>,
}

impl ProductRecord {
    /// First non-empty string value of `attribute`, any scope/locale.
    pub fn first_string_value(&self, attribute: &str) -> Option<&str> {
        self.values.get(attribute).and_then(|entries| {
            entries
                .iter()
                .filter_map(|v| v.data.as_str())
                .map(str::trim)
                .find(|s| !s.is_empty())
        })
    }
}
