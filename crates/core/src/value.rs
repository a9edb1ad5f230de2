//! Field values and the per-session value map.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::btree_map::{self, BTreeMap};

use profiles::ProfileComponent;

/// The value of one profile field.
///
/// Numbers are always finite; [`ValueMap`] refuses to store anything else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric interpretation of the value.
    ///
    /// Text is trimmed and parsed; empty or non-numeric text, and non-finite numbers, yield
    /// `None`. Zero is a number like any other.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }

    /// Text shown to the user and substituted into report templates.
    ///
    /// Whole numbers render without a fractional part (`5`, not `5.0`).
    pub fn display(&self) -> String {
        match self {
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }

    /// Whether this value counts as "not entered".
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Number(n) => !n.is_finite(),
            FieldValue::Text(s) => s.trim().is_empty(),
        }
    }

    /// Store numeric-looking input for number components as a number.
    ///
    /// Text typed into a number field that does not parse is kept as text so the technician's
    /// input is never silently discarded; formulas treat it as not ready.
    pub fn coerce_for(self, component: &ProfileComponent) -> Self {
        match (component, &self) {
            (ProfileComponent::Number(_), FieldValue::Text(s)) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => FieldValue::Number(n),
                _ => self,
            },
            _ => self,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

/// Mapping from component key to current value for one data-entry session.
///
/// Absent keys mean "not entered". Blank text and non-finite numbers are never stored:
/// inserting one removes the key instead.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValueMap(BTreeMap<String, FieldValue>);

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_number)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set `key`, or remove it when `value` is blank. Returns whether a value is now stored.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) -> bool {
        let key = key.into();
        if value.is_blank() {
            self.0.remove(&key);
            false
        } else {
            self.0.insert(key, value);
            true
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<'a> IntoIterator for &'a ValueMap {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for ValueMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, FieldValue>::deserialize(deserializer)?;
        Ok(raw.into_iter().collect())
    }
}
