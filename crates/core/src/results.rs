//! Conversion between a session's [`ValueMap`] and the single persisted result string.
//!
//! Structured results are stored as a JSON object with sorted keys. Results written before
//! structured entry existed are free text; they are surfaced as [`StoredResult::Legacy`] and
//! never migrated.

use serde_json::Value;

use crate::value::{FieldValue, ValueMap};
use crate::{LimsError, LimsResult};

/// A persisted result string, interpreted.
#[derive(Clone, Debug, PartialEq)]
pub enum StoredResult {
    /// Nothing has been recorded yet.
    Empty,
    Structured(ValueMap),
    /// Free text that is not a JSON object. Read-only.
    Legacy(String),
}

impl StoredResult {
    /// The structured values; empty for [`StoredResult::Empty`] and [`StoredResult::Legacy`].
    pub fn values(&self) -> ValueMap {
        match self {
            StoredResult::Structured(values) => values.clone(),
            StoredResult::Empty | StoredResult::Legacy(_) => ValueMap::new(),
        }
    }

    pub fn into_values(self) -> ValueMap {
        match self {
            StoredResult::Structured(values) => values,
            StoredResult::Empty | StoredResult::Legacy(_) => ValueMap::new(),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, StoredResult::Legacy(_))
    }
}

/// Serialize `values` into the persisted result string.
pub fn serialize(values: &ValueMap) -> LimsResult<String> {
    serde_json::to_string(values).map_err(LimsError::Serialization)
}

/// Interpret a persisted result string. Never fails.
///
/// Object entries that are neither strings nor finite numbers are skipped with a warning.
pub fn deserialize(stored: &str) -> StoredResult {
    if stored.trim().is_empty() {
        return StoredResult::Empty;
    }

    let object = match serde_json::from_str::<Value>(stored) {
        Ok(Value::Object(object)) => object,
        Ok(_) | Err(_) => return StoredResult::Legacy(stored.to_owned()),
    };

    let mut values = ValueMap::new();
    for (key, value) in object {
        let field_value = match value {
            Value::String(s) => FieldValue::Text(s),
            Value::Number(n) => match n.as_f64().filter(|n| n.is_finite()) {
                Some(n) => FieldValue::Number(n),
                None => {
                    tracing::warn!(key = %key, "skipping non-finite number in stored result");
                    continue;
                }
            },
            other => {
                tracing::warn!(key = %key, value = %other, "skipping unsupported value in stored result");
                continue;
            }
        };
        values.insert(key, field_value);
    }

    StoredResult::Structured(values)
}
