// ============================================================
// TRACKED VALUES
// ============================================================
// Distinct values of tracked fields, in first-seen order

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedValues {
    values: BTreeMap<String, Vec<String>>,

    #[serde(skip)]
    seen: HashSet<(String, String)>,
}

impl TrackedValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `field`; blanks and repeats are ignored
    pub fn insert(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        if self.seen.insert((field.to_string(), value.to_string())) {
            self.values
                .entry(field.to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    /// Make sure `field` has an entry even when no value was seen
    pub fn declare(&mut self, field: &str) {
        self.values.entry(field.to_string()).or_default();
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.values.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values
            .iter()
            .map(|(field, values)| (field.as_str(), values.as_slice()))
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.seen.clear();
    }
}
