// ============================================================
// INPUT RECORD
// ============================================================
// One raw CSV row, keyed by header name

use serde::{Deserialize, Serialize};

/// Immutable, ordered mapping from field name to raw string value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    fields: Vec<(String, String)>,
}

impl InputRecord {
    /// Build a record from header/value pairs, keeping their order.
    /// A repeated header keeps its first value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields: Vec<(String, String)> = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            if fields.iter().any(|(existing, _)| *existing == name) {
                continue;
            }
            fields.push((name, value.into()));
        }
        Self { fields }
    }

    /// Raw value for `name`, if the field is present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Field names in input order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Records read from one source file, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBatch {
    pub name: String,
    pub records: Vec<InputRecord>,
}

impl SourceBatch {
    pub fn new(name: impl Into<String>, records: Vec<InputRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    /// Header names, taken from the first record
    pub fn field_names(&self) -> Vec<String> {
        self.records
            .first()
            .map(|record| record.names().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
