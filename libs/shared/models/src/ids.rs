//! Identifier normalisation.
//!
//! The backend is inconsistent about identifier types: users come back with
//! numeric ids from `/auth/me` while signaling events carry them as strings.
//! Everything on the client side is keyed by the string form.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Renders a JSON scalar as an identifier string.
pub fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_id(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or numeric id, got {}", value)))
}

pub fn deserialize_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_id(&value).unwrap_or_default())
}
