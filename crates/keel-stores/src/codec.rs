//! JSON encoding of cache field values

use keel_core::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Decode a field value, reporting undecodable values as corrupt cache entries
pub fn decode<T: DeserializeOwned>(collection: &str, field: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        CacheError::Corrupt {
            collection: collection.to_string(),
            field: field.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Field prefix selecting one namespace, or every field when `None`
pub fn namespace_prefix(namespace: Option<&str>) -> String {
    namespace.map(|ns| format!("{}/", ns)).unwrap_or_default()
}
