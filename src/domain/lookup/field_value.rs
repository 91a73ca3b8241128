// ============================================================
// CONVERTED VALUES
// ============================================================
// Scalar or multi-valued output of a field conversion

use serde::{Deserialize, Serialize};

use super::SourceRef;

/// Value produced by a field conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Single(String),
    Multi(Vec<String>),
}

impl FieldValue {
    pub fn empty() -> Self {
        FieldValue::Single(String::new())
    }

    /// Split `raw` on `delim`, trimming and dropping blank tokens.
    /// Without a delimiter the trimmed value is kept as a scalar.
    pub fn split(raw: &str, delim: Option<&str>) -> Self {
        match delim {
            Some(delim) if !delim.is_empty() => FieldValue::Multi(
                raw.split(delim)
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => FieldValue::Single(raw.trim().to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Single(value) => value.is_empty(),
            FieldValue::Multi(values) => values.iter().all(|value| value.is_empty()),
        }
    }

    /// More than one distinct non-empty value
    pub fn is_multi_valued(&self) -> bool {
        self.values().len() > 1
    }

    /// Non-empty values, de-duplicated in first-seen order
    pub fn values(&self) -> Vec<String> {
        match self {
            FieldValue::Single(value) if value.is_empty() => Vec::new(),
            FieldValue::Single(value) => vec![value.clone()],
            FieldValue::Multi(values) => {
                let mut out: Vec<String> = Vec::with_capacity(values.len());
                for value in values {
                    if !value.is_empty() && !out.contains(value) {
                        out.push(value.clone());
                    }
                }
                out
            }
        }
    }

    /// Flatten to one cell, joining multiple values with `delim`
    pub fn joined(&self, delim: &str) -> String {
        self.values().join(delim)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::Multi(values)
    }
}

/// Output of converting one input record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedRecord {
    pub source: SourceRef,

    /// Converted fields in conversion order
    fields: Vec<(String, FieldValue)>,

    /// Fields still waiting on the deferred pass
    pub pending_deferred: Vec<String>,
}

impl ConvertedRecord {
    pub fn new(source: SourceRef) -> Self {
        Self {
            source,
            fields: Vec::new(),
            pending_deferred: Vec::new(),
        }
    }

    /// Insert or replace a field value
    pub fn set(&mut self, name: &str, value: FieldValue) {
        if let Some(slot) = self.fields.iter_mut().find(|(field, _)| field == name) {
            slot.1 = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// True when no field carries a value and nothing is pending
    pub fn is_blank(&self) -> bool {
        self.pending_deferred.is_empty() && self.fields.iter().all(|(_, value)| value.is_empty())
    }
}
