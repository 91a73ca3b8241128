// ============================================================
// OUTPUT FORMATTER
// ============================================================
// Expands converted records into flat lookup rows grouped by key value

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::application::use_cases::field_mappings::ConversionSpec;
use crate::domain::lookup::{ConvertedRecord, Diagnostics, OutputRow, RowGroup};

/// Separator used when a persistent field carries several values
const PERSISTENT_JOIN: &str = "|";

/// Flat row groups plus the diagnostics raised while building them
#[derive(Debug, Default)]
pub struct FormattedOutput {
    pub groups: Vec<RowGroup>,
    pub diagnostics: Diagnostics,
}

/// Turns converted records into the rows of a flat lookup table
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    key_fields: Vec<String>,
    persistent_fields: Vec<String>,
    merge_fields: Vec<String>,
    allow_mv_keys: bool,
    eliminate_duplicates: bool,
}

impl OutputFormatter {
    pub fn new(spec: &ConversionSpec) -> Self {
        Self {
            key_fields: spec.registry.key_fields(),
            persistent_fields: spec.registry.persistent_fields(),
            merge_fields: spec.policy.merge_fields.clone(),
            allow_mv_keys: spec.policy.allow_mv_keys,
            eliminate_duplicates: spec.policy.eliminate_duplicates,
        }
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    /// Expand one record into one group per value of its anchoring key.
    ///
    /// The anchoring key is the multi-valued key field when there is one,
    /// otherwise the first key field with a value. Each group holds a main
    /// row (keys, single-valued and persistent fields) followed by one
    /// satellite row per value of every other multi-valued field.
    pub fn expand(&self, record: &ConvertedRecord, diagnostics: &mut Diagnostics) -> Vec<RowGroup> {
        let keys: Vec<(&str, Vec<String>)> = self
            .key_fields
            .iter()
            .filter_map(|field| record.get(field).map(|value| (field.as_str(), value.values())))
            .filter(|(_, values)| !values.is_empty())
            .collect();

        if keys.is_empty() {
            debug!(source = %record.source.file, row = record.source.row, "Record has no key value");
            diagnostics.record(Diagnostics::MISSING_KEY, &record.source);
            return Vec::new();
        }

        let multi_keys: Vec<&str> = keys
            .iter()
            .filter(|(_, values)| values.len() > 1)
            .map(|(field, _)| *field)
            .collect();
        if multi_keys.len() > 1 {
            warn!(
                source = %record.source.file,
                row = record.source.row,
                fields = ?multi_keys,
                "More than one multi-valued key field; skipping record"
            );
            diagnostics.record(Diagnostics::AMBIGUOUS_KEY, &record.source);
            return Vec::new();
        }
        if !multi_keys.is_empty() && !self.allow_mv_keys {
            warn!(
                source = %record.source.file,
                row = record.source.row,
                field = multi_keys[0],
                "Multi-valued key field not allowed; skipping record"
            );
            diagnostics.record(Diagnostics::MULTIVALUE_KEY, &record.source);
            return Vec::new();
        }

        // Duplicates are detected on the anchor only; the other key values
        // are copied into the rows and never deduplicated.
        let anchor = multi_keys.first().copied().unwrap_or(keys[0].0);

        let mut base = OutputRow::new();
        for (field, values) in &keys {
            if *field != anchor {
                base.insert(field.to_string(), values[0].clone());
            }
        }
        for field in &self.persistent_fields {
            if self.key_fields.contains(field) {
                continue;
            }
            if let Some(value) = record.get(field) {
                base.insert(field.clone(), value.joined(PERSISTENT_JOIN));
            }
        }

        let mut singles: Vec<(&str, String)> = Vec::new();
        let mut multis: Vec<(&str, Vec<String>)> = Vec::new();
        for (field, value) in record.fields() {
            let field_name = field.to_string();
            if self.key_fields.contains(&field_name) || self.persistent_fields.contains(&field_name) {
                continue;
            }
            if self.merge_fields.contains(&field_name) || value.is_multi_valued() {
                multis.push((field, value.values()));
            } else {
                singles.push((field, value.values().into_iter().next().unwrap_or_default()));
            }
        }

        let anchor_values = keys
            .iter()
            .find(|(field, _)| *field == anchor)
            .map(|(_, values)| values.clone())
            .unwrap_or_default();

        anchor_values
            .into_iter()
            .map(|anchor_value| {
                let mut keyed = base.clone();
                keyed.insert(anchor.to_string(), anchor_value.clone());

                let mut main = keyed.clone();
                for (field, value) in &singles {
                    main.insert(field.to_string(), value.clone());
                }

                let mut group = RowGroup::new(anchor, anchor_value);
                group.rows.push(main);
                for (field, values) in &multis {
                    for value in values {
                        let mut satellite = keyed.clone();
                        satellite.insert(field.to_string(), value.clone());
                        group.rows.push(satellite);
                    }
                }
                group
            })
            .collect()
    }

    /// Buffered formatting over a whole batch.
    ///
    /// The first record to produce a key value owns it. A later record with
    /// the same key either appends its `merge_fields` values (tagged with the
    /// key) or, when no merge fields are configured, is discarded entirely.
    pub fn format_output(&self, records: &[ConvertedRecord]) -> FormattedOutput {
        let mut output = FormattedOutput::default();
        let mut seen: HashMap<(String, String), usize> = HashMap::new();

        for record in records {
            for group in self.expand(record, &mut output.diagnostics) {
                let key = (group.key_field.clone(), group.key_value.clone());
                let Some(&idx) = seen.get(&key) else {
                    seen.insert(key, output.groups.len());
                    output.groups.push(group);
                    continue;
                };

                if self.merge_fields.is_empty() {
                    debug!(
                        key_field = %key.0,
                        key_value = %key.1,
                        source = %record.source.file,
                        row = record.source.row,
                        "Duplicate key; keeping the first record"
                    );
                    output.diagnostics.count(Diagnostics::DUPLICATE_KEY);
                    continue;
                }

                for field in &self.merge_fields {
                    let Some(value) = record.get(field) else {
                        continue;
                    };
                    for item in value.values() {
                        let mut row = OutputRow::new();
                        row.insert(key.0.clone(), key.1.clone());
                        row.insert(field.clone(), item);
                        output.groups[idx].rows.push(row);
                    }
                }
            }
        }

        output
    }

    /// Lazily format records one at a time without buffering the table.
    /// Repeated keys are dropped inline when duplicates are eliminated.
    pub fn format_streamed_output<I>(&self, records: I) -> impl Iterator<Item = RowGroup>
    where
        I: IntoIterator<Item = ConvertedRecord>,
    {
        let mut stream = StreamFormatter::new(self.clone());
        records
            .into_iter()
            .flat_map(move |record| stream.format_record(&record))
    }
}

/// Record-at-a-time formatter keeping only the set of processed keys
#[derive(Debug, Default)]
pub struct StreamFormatter {
    formatter: OutputFormatter,
    processed: HashSet<(String, String)>,
    pub diagnostics: Diagnostics,
}

impl StreamFormatter {
    pub fn new(formatter: OutputFormatter) -> Self {
        Self {
            formatter,
            processed: HashSet::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn format_record(&mut self, record: &ConvertedRecord) -> Vec<RowGroup> {
        let groups = self.formatter.expand(record, &mut self.diagnostics);
        if !self.formatter.eliminate_duplicates {
            return groups;
        }

        let mut kept = Vec::with_capacity(groups.len());
        for group in groups {
            if self
                .processed
                .insert((group.key_field.clone(), group.key_value.clone()))
            {
                kept.push(group);
            } else {
                self.diagnostics.count(Diagnostics::DUPLICATE_KEY);
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::field_mappings::{FieldAttributes, StringField};
    use crate::domain::lookup::{ConversionPolicy, FieldValue, SourceRef};

    fn spec(policy: ConversionPolicy) -> ConversionSpec {
        ConversionSpec::new(policy)
            .with(StringField::new(FieldAttributes::new("ip").key().delimited("|")))
            .unwrap()
            .with(StringField::new(FieldAttributes::new("nt_host").key()))
            .unwrap()
            .with(StringField::new(FieldAttributes::new("owner").persistent()))
            .unwrap()
            .with(StringField::named("x"))
            .unwrap()
            .with(StringField::new(FieldAttributes::new("category").delimited("|")))
            .unwrap()
    }

    fn record(row: usize, fields: &[(&str, FieldValue)]) -> ConvertedRecord {
        let mut record = ConvertedRecord::new(SourceRef::new("in.csv", row, row));
        for (name, value) in fields {
            record.set(name, value.clone());
        }
        record
    }

    fn multi(values: &[&str]) -> FieldValue {
        FieldValue::Multi(values.iter().map(|value| value.to_string()).collect())
    }

    fn row(pairs: &[(&str, &str)]) -> OutputRow {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_main_and_satellite_rows() {
        let formatter = OutputFormatter::new(&spec(ConversionPolicy::default()));
        let mut diagnostics = Diagnostics::new();
        let groups = formatter.expand(
            &record(
                0,
                &[
                    ("nt_host", FieldValue::from("web01")),
                    ("owner", FieldValue::from("ops")),
                    ("x", FieldValue::from("1")),
                    ("category", multi(&["server", "pci"])),
                ],
            ),
            &mut diagnostics,
        );

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key_field, "nt_host");
        assert_eq!(
            groups[0].rows,
            vec![
                row(&[("nt_host", "web01"), ("owner", "ops"), ("x", "1")]),
                row(&[("nt_host", "web01"), ("owner", "ops"), ("category", "server")]),
                row(&[("nt_host", "web01"), ("owner", "ops"), ("category", "pci")]),
            ]
        );
    }

    #[test]
    fn test_multi_valued_key_permutations() {
        let policy = ConversionPolicy {
            allow_mv_keys: true,
            ..Default::default()
        };
        let formatter = OutputFormatter::new(&spec(policy));
        let mut diagnostics = Diagnostics::new();
        let groups = formatter.expand(
            &record(
                0,
                &[
                    ("ip", multi(&["10.0.0.1", "10.0.1.0/24"])),
                    ("nt_host", FieldValue::from("web01")),
                ],
            ),
            &mut diagnostics,
        );

        let keys: Vec<(&str, &str)> = groups
            .iter()
            .map(|group| (group.key_field.as_str(), group.key_value.as_str()))
            .collect();
        assert_eq!(keys, vec![("ip", "10.0.0.1"), ("ip", "10.0.1.0/24")]);
        assert_eq!(groups[1].rows[0], row(&[("ip", "10.0.1.0/24"), ("nt_host", "web01")]));
    }

    #[test]
    fn test_multi_valued_key_rejected_when_disallowed() {
        let formatter = OutputFormatter::new(&spec(ConversionPolicy::default()));
        let mut diagnostics = Diagnostics::new();
        let groups = formatter.expand(
            &record(0, &[("ip", multi(&["10.0.0.1", "10.0.0.2"]))]),
            &mut diagnostics,
        );
        assert!(groups.is_empty());
        assert_eq!(diagnostics.total(Diagnostics::MULTIVALUE_KEY), 1);
    }

    #[test]
    fn test_two_multi_valued_keys_are_ambiguous() {
        let policy = ConversionPolicy {
            allow_mv_keys: true,
            ..Default::default()
        };
        let formatter = OutputFormatter::new(&spec(policy));
        let output = formatter.format_output(&[
            record(
                0,
                &[
                    ("ip", multi(&["10.0.0.1", "10.0.0.2"])),
                    ("nt_host", multi(&["a", "b"])),
                ],
            ),
            record(1, &[("x", FieldValue::from("orphan"))]),
        ]);
        assert!(output.groups.is_empty());
        assert_eq!(output.diagnostics.total(Diagnostics::AMBIGUOUS_KEY), 1);
        assert_eq!(output.diagnostics.total(Diagnostics::MISSING_KEY), 1);
    }

    // A repeated key drops the later record entirely, not just the colliding
    // field. This first-seen-wins default is easy to miss when debugging
    // merged asset lists.
    #[test]
    fn test_duplicate_key_discards_later_record_without_merge_fields() {
        let formatter = OutputFormatter::new(&spec(ConversionPolicy::default()));
        let output = formatter.format_output(&[
            record(0, &[("nt_host", FieldValue::from("web01")), ("x", FieldValue::from("first"))]),
            record(1, &[("nt_host", FieldValue::from("web01")), ("x", FieldValue::from("second"))]),
        ]);

        assert_eq!(output.groups.len(), 1);
        assert_eq!(
            output.groups[0].rows,
            vec![row(&[("nt_host", "web01"), ("x", "first")])]
        );
        assert_eq!(output.diagnostics.total(Diagnostics::DUPLICATE_KEY), 1);
    }

    #[test]
    fn test_shared_non_anchor_key_is_not_a_duplicate() {
        let formatter = OutputFormatter::new(&spec(ConversionPolicy::default()));
        let output = formatter.format_output(&[
            record(0, &[("ip", FieldValue::from("10.0.0.1")), ("nt_host", FieldValue::from("web01"))]),
            record(1, &[("ip", FieldValue::from("10.0.0.2")), ("nt_host", FieldValue::from("web01"))]),
        ]);

        let anchors: Vec<(&str, &str)> = output
            .groups
            .iter()
            .map(|group| (group.key_field.as_str(), group.key_value.as_str()))
            .collect();
        assert_eq!(anchors, vec![("ip", "10.0.0.1"), ("ip", "10.0.0.2")]);
        assert_eq!(output.diagnostics.total(Diagnostics::DUPLICATE_KEY), 0);
    }

    #[test]
    fn test_duplicate_key_appends_merge_fields() {
        let policy = ConversionPolicy {
            merge_fields: vec!["x".to_string()],
            ..Default::default()
        };
        let formatter = OutputFormatter::new(&spec(policy));
        let output = formatter.format_output(&[
            record(0, &[("nt_host", FieldValue::from("web01")), ("x", FieldValue::from("first"))]),
            record(
                1,
                &[
                    ("nt_host", FieldValue::from("web01")),
                    ("x", FieldValue::from("second")),
                    ("owner", FieldValue::from("ignored")),
                ],
            ),
        ]);

        assert_eq!(output.groups.len(), 1);
        assert_eq!(
            output.groups[0].rows,
            vec![
                row(&[("nt_host", "web01")]),
                row(&[("nt_host", "web01"), ("x", "first")]),
                row(&[("nt_host", "web01"), ("x", "second")]),
            ]
        );
        assert_eq!(output.diagnostics.total(Diagnostics::DUPLICATE_KEY), 0);
    }

    #[test]
    fn test_streamed_output_eliminates_duplicates() {
        let records = vec![
            record(0, &[("nt_host", FieldValue::from("web01"))]),
            record(1, &[("nt_host", FieldValue::from("web01"))]),
            record(2, &[("nt_host", FieldValue::from("web02"))]),
        ];

        let keep_all = OutputFormatter::new(&spec(ConversionPolicy::default()));
        assert_eq!(keep_all.format_streamed_output(records.clone()).count(), 3);

        let dedup = OutputFormatter::new(&spec(ConversionPolicy {
            eliminate_duplicates: true,
            ..Default::default()
        }));
        let values: Vec<String> = dedup
            .format_streamed_output(records)
            .map(|group| group.key_value)
            .collect();
        assert_eq!(values, vec!["web01", "web02"]);
    }
}
