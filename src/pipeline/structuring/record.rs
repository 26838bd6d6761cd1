use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder for any field the model could not determine.
pub const UNKNOWN: &str = "Unknown";

/// Keys every record carries.
pub const CANONICAL_KEYS: [&str; 5] = ["category", "year", "month", "summary", "original_name"];

/// Structured result for one file. Values are always strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationRecord(BTreeMap<String, String>);

impl ClassificationRecord {
    /// Every canonical key set to `"Unknown"`.
    pub fn with_defaults() -> Self {
        Self(
            CANONICAL_KEYS
                .iter()
                .map(|k| (k.to_string(), UNKNOWN.to_string()))
                .collect(),
        )
    }

    /// Normalize a decoded model response: keys are lower-cased, scalars are
    /// stringified, null or blank values fall back to `"Unknown"`, and missing
    /// canonical keys are filled in.
    pub fn from_json(map: Map<String, Value>) -> Self {
        let mut record = Self::with_defaults();
        for (key, value) in map {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => s,
                other => other.to_string(),
            };
            if value.trim().is_empty() {
                continue;
            }
            record.insert(key.trim().to_lowercase(), value);
        }
        record
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Set `original_name` unless the model already produced one.
    pub fn fill_original_name(&mut self, stem: &str) {
        if self.get("original_name").map_or(true, |v| v == UNKNOWN) {
            self.insert("original_name", stem);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ClassificationRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
