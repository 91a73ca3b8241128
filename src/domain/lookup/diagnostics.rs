// ============================================================
// CONVERSION DIAGNOSTICS
// ============================================================
// Per-batch error buckets surfaced to the caller after a run

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coordinates of an input row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Source file the row was read from
    pub file: String,

    /// Row index within the source file (0-based, header excluded)
    pub row: usize,

    /// Row index across the whole batch
    pub batch_row: usize,
}

impl SourceRef {
    pub fn new(file: impl Into<String>, row: usize, batch_row: usize) -> Self {
        Self {
            file: file.into(),
            row,
            batch_row,
        }
    }
}

/// One diagnostic bucket: a plain counter or a list of offending rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticEntry {
    Count(usize),
    Locations(Vec<SourceRef>),
}

impl DiagnosticEntry {
    pub fn len(&self) -> usize {
        match self {
            DiagnosticEntry::Count(count) => *count,
            DiagnosticEntry::Locations(locations) => locations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Error-category to bucket mapping accumulated over one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: BTreeMap<String, DiagnosticEntry>,
}

impl Diagnostics {
    pub const INVALID: &'static str = "invalid";
    pub const UNKNOWN: &'static str = "unknown";
    pub const EXTRA_FIELDS: &'static str = "extra_fields";
    pub const MISSING_FIELDS: &'static str = "missing_fields";
    pub const DEFERRED_MISS: &'static str = "deferred_lookup_miss";
    pub const AMBIGUOUS_KEY: &'static str = "ambiguous_key";
    pub const MULTIVALUE_KEY: &'static str = "multivalue_key";
    pub const MISSING_KEY: &'static str = "missing_key";
    pub const DUPLICATE_KEY: &'static str = "duplicate_key";

    pub fn new() -> Self {
        Self::default()
    }

    /// Bump a counter bucket
    pub fn count(&mut self, category: &str) {
        let entry = self
            .entries
            .entry(category.to_string())
            .or_insert(DiagnosticEntry::Count(0));
        match entry {
            DiagnosticEntry::Count(count) => *count += 1,
            DiagnosticEntry::Locations(_) => {}
        }
    }

    /// Append a row location to a location bucket
    pub fn record(&mut self, category: &str, source: &SourceRef) {
        let entry = self
            .entries
            .entry(category.to_string())
            .or_insert_with(|| DiagnosticEntry::Locations(Vec::new()));
        match entry {
            DiagnosticEntry::Locations(locations) => locations.push(source.clone()),
            DiagnosticEntry::Count(count) => *count += 1,
        }
    }

    pub fn get(&self, category: &str) -> Option<&DiagnosticEntry> {
        self.entries.get(category)
    }

    /// Number of events in a bucket, zero when absent
    pub fn total(&self, category: &str) -> usize {
        self.entries.get(category).map_or(0, DiagnosticEntry::len)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        for (category, entry) in other.entries {
            match entry {
                DiagnosticEntry::Count(count) => {
                    for _ in 0..count {
                        self.count(&category);
                    }
                }
                DiagnosticEntry::Locations(locations) => {
                    for source in &locations {
                        self.record(&category, source);
                    }
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(DiagnosticEntry::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DiagnosticEntry)> {
        self.entries.iter().map(|(category, entry)| (category.as_str(), entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_and_record_buckets() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.count(Diagnostics::DUPLICATE_KEY);
        diagnostics.count(Diagnostics::DUPLICATE_KEY);
        diagnostics.record(Diagnostics::INVALID, &SourceRef::new("a.csv", 3, 7));

        assert_eq!(diagnostics.total(Diagnostics::DUPLICATE_KEY), 2);
        assert_eq!(
            diagnostics.get(Diagnostics::INVALID),
            Some(&DiagnosticEntry::Locations(vec![SourceRef::new("a.csv", 3, 7)]))
        );
        assert_eq!(diagnostics.total(Diagnostics::UNKNOWN), 0);
    }

    #[test]
    fn test_merge_keeps_bucket_shapes() {
        let mut left = Diagnostics::new();
        left.count(Diagnostics::MISSING_KEY);
        let mut right = Diagnostics::new();
        right.count(Diagnostics::MISSING_KEY);
        right.record(Diagnostics::INVALID, &SourceRef::new("b.csv", 0, 4));

        left.merge(right);
        assert_eq!(left.total(Diagnostics::MISSING_KEY), 2);
        assert_eq!(left.total(Diagnostics::INVALID), 1);
    }

    #[test]
    fn test_serializes_as_plain_values() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.count(Diagnostics::AMBIGUOUS_KEY);
        let json = serde_json::to_string(&diagnostics).unwrap();
        assert_eq!(json, r#"{"ambiguous_key":1}"#);
    }
}
