// ============================================================
// CONVERSION ENGINE
// ============================================================
// Two-pass conversion of input records through the field mappings:
// an immediate dependency-ordered pass per record, then a deferred pass
// once every mapping has seen the whole batch.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::application::use_cases::field_mappings::{
    Conversion, ConversionInput, ConversionSpec, DeferredInput, FieldMapping,
};
use crate::domain::error::{AppError, Result};
use crate::domain::lookup::{
    ConvertedRecord, Diagnostics, FieldMetadata, FieldValue, InputRecord, SourceBatch, SourceRef,
    TrackedValues,
};

/// Lifecycle of one field while its record is converted
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldState {
    Pending,
    Done(FieldValue),
    Deferred(DeferralReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferralReason {
    /// The mapping asked for the deferred pass
    Requested,
    /// Dependencies never resolved during the immediate pass
    Unresolved,
}

/// A field waiting for the deferred pass
#[derive(Debug, Clone)]
struct PendingField {
    field: String,
    reason: DeferralReason,
    raw: Option<String>,
    requirements: BTreeMap<String, String>,
}

enum RecordOutcome {
    Converted(ConvertedRecord, Vec<PendingField>),
    Rejected { field: String, reason: String },
}

/// Result of converting one batch
#[derive(Debug, Default)]
pub struct ConversionBatch {
    pub records: Vec<ConvertedRecord>,
    pub diagnostics: Diagnostics,
    pub tracked: TrackedValues,
    pub metadata: BTreeMap<String, FieldMetadata>,
    pub records_read: usize,
}

/// Counters returned by the streaming conversion
#[derive(Debug, Default)]
pub struct StreamSummary {
    pub diagnostics: Diagnostics,
    pub tracked: TrackedValues,
    pub records_read: usize,
    pub records_converted: usize,
}

/// Drives the field mappings of one [`ConversionSpec`] over batches of records
pub struct ConversionEngine {
    spec: ConversionSpec,
}

impl ConversionEngine {
    pub fn new(spec: ConversionSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &ConversionSpec {
        &self.spec
    }

    /// Classify a source's fields and report mismatches.
    /// Strict policy turns a mismatch into an error.
    fn field_metadata(
        &self,
        source: &SourceBatch,
        diagnostics: &mut Diagnostics,
    ) -> Result<FieldMetadata> {
        let registry = &self.spec.registry;
        let metadata = FieldMetadata::compute(
            source.field_names(),
            registry.expected_fields(),
            registry.generated_fields(),
            &registry.consumed_fields(),
        );

        if !metadata.custom.is_empty() && !self.spec.policy.allow_custom {
            warn!(
                source = %source.name,
                fields = ?metadata.custom,
                "Input carries fields with no mapping; they will be dropped"
            );
            diagnostics.count(Diagnostics::EXTRA_FIELDS);
        }
        if !metadata.missing.is_empty() && !source.records.is_empty() {
            warn!(
                source = %source.name,
                fields = ?metadata.missing,
                "Input lacks expected fields; they will be blank"
            );
            diagnostics.count(Diagnostics::MISSING_FIELDS);
        }

        let mismatch = (!metadata.custom.is_empty() && !self.spec.policy.allow_custom)
            || (!metadata.missing.is_empty() && !source.records.is_empty());
        if self.spec.policy.strict && mismatch {
            return Err(AppError::ValidationError(format!(
                "Source '{}' does not match the field mappings (extra: {:?}, missing: {:?})",
                source.name, metadata.custom, metadata.missing
            )));
        }

        Ok(metadata)
    }

    /// Conversion order: mapped fields in registration order, then custom fields
    fn field_order(&self, metadata: &FieldMetadata) -> Vec<String> {
        let mut order = self.spec.registry.names();
        order.extend(metadata.custom.iter().cloned());
        order
    }

    fn input_for<'a>(
        mapping: &dyn FieldMapping,
        record: &'a InputRecord,
        values: &HashMap<String, FieldValue>,
        row_id: usize,
    ) -> ConversionInput<'a> {
        let attributes = mapping.attributes();
        let raw = if attributes.is_generated {
            None
        } else {
            record.get(&attributes.name)
        };
        let dependencies = attributes
            .depends
            .iter()
            .filter_map(|name| values.get(name).map(|value| (name.clone(), value.clone())))
            .collect();
        let requirements = attributes
            .requires
            .iter()
            .map(|name| (name.clone(), record.get(name).unwrap_or("").to_string()))
            .collect();
        ConversionInput {
            raw,
            dependencies,
            requirements,
            row_id,
        }
    }

    /// First mapped field whose raw value fails validation.
    /// Runs before any mapping converts, so a rejected record never reaches batch state.
    fn validate_record(&self, record: &InputRecord, order: &[String]) -> Option<(String, String)> {
        order.iter().find_map(|name| {
            let mapping = self.spec.registry.get(name)?;
            let raw = if mapping.attributes().is_generated {
                None
            } else {
                record.get(name)
            };
            (!mapping.validate(raw))
                .then(|| (name.clone(), format!("rejected value '{}'", raw.unwrap_or(""))))
        })
    }

    /// Immediate pass over one record: a fixed-point loop that converts a
    /// field once none of its dependencies are still remaining.
    fn convert_record(
        &mut self,
        record: &InputRecord,
        source: &SourceRef,
        order: &[String],
    ) -> RecordOutcome {
        if let Some((field, reason)) = self.validate_record(record, order) {
            return RecordOutcome::Rejected { field, reason };
        }

        let allow_custom = self.spec.policy.allow_custom;
        let mut states: HashMap<String, FieldState> = order
            .iter()
            .map(|name| (name.clone(), FieldState::Pending))
            .collect();
        let mut values: HashMap<String, FieldValue> = HashMap::new();
        let mut remaining: Vec<String> = order.to_vec();

        while !remaining.is_empty() {
            let mut progressed = false;

            for name in remaining.clone() {
                let Some(idx) = self.spec.registry.position(&name) else {
                    if allow_custom {
                        let value = FieldValue::Single(record.get(&name).unwrap_or("").to_string());
                        values.insert(name.clone(), value.clone());
                        states.insert(name.clone(), FieldState::Done(value));
                    }
                    remaining.retain(|field| *field != name);
                    progressed = true;
                    continue;
                };

                let blocked = self
                    .spec
                    .registry
                    .at(idx)
                    .attributes()
                    .depends
                    .iter()
                    .any(|dep| *dep != name && remaining.contains(dep));
                if blocked {
                    continue;
                }

                let mapping = self.spec.registry.at_mut(idx);
                let input = Self::input_for(&*mapping, record, &values, source.batch_row);
                let state = match mapping.convert(&input) {
                    Conversion::Converted(value) => {
                        values.insert(name.clone(), value.clone());
                        FieldState::Done(value)
                    }
                    Conversion::Deferred => FieldState::Deferred(DeferralReason::Requested),
                    Conversion::Invalid(reason) => {
                        return RecordOutcome::Rejected { field: name, reason };
                    }
                };
                states.insert(name.clone(), state);
                remaining.retain(|field| *field != name);
                progressed = true;
            }

            if !progressed {
                debug!(
                    row = source.batch_row,
                    fields = ?remaining,
                    "Unresolved field dependencies; deferring"
                );
                for name in remaining.drain(..) {
                    states.insert(name, FieldState::Deferred(DeferralReason::Unresolved));
                }
            }
        }

        let mut converted = ConvertedRecord::new(source.clone());
        let mut pending = Vec::new();
        for name in order {
            match states.remove(name) {
                Some(FieldState::Done(value)) => converted.set(name, value),
                Some(FieldState::Deferred(reason)) => {
                    let Some(mapping) = self.spec.registry.get(name) else {
                        continue;
                    };
                    let attributes = mapping.attributes();
                    let requirements = attributes
                        .deferred_requires
                        .iter()
                        .chain(attributes.requires.iter())
                        .map(|field| (field.clone(), record.get(field).unwrap_or("").to_string()))
                        .collect();
                    converted.pending_deferred.push(name.clone());
                    pending.push(PendingField {
                        field: name.clone(),
                        reason,
                        raw: record.get(name).map(str::to_string),
                        requirements,
                    });
                }
                _ => {}
            }
        }

        RecordOutcome::Converted(converted, pending)
    }

    /// Second pass over one record's deferred fields
    fn resolve_deferred(
        &mut self,
        record: &mut ConvertedRecord,
        pending: Vec<PendingField>,
        diagnostics: &mut Diagnostics,
    ) {
        for field in pending {
            let Some(idx) = self.spec.registry.position(&field.field) else {
                continue;
            };
            let mapping = self.spec.registry.at_mut(idx);
            let resolved = match field.reason {
                DeferralReason::Requested => {
                    let deferred_requires = &mapping.attributes().deferred_requires;
                    let requirements = field
                        .requirements
                        .iter()
                        .filter(|(name, _)| deferred_requires.contains(*name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    mapping.convert_deferred(&DeferredInput {
                        requirements,
                        row_id: record.source.batch_row,
                    })
                }
                DeferralReason::Unresolved => {
                    let dependencies = mapping
                        .attributes()
                        .depends
                        .iter()
                        .filter_map(|name| {
                            record.get(name).map(|value| (name.clone(), value.clone()))
                        })
                        .collect();
                    let requirements = field
                        .requirements
                        .iter()
                        .filter(|(name, _)| mapping.attributes().requires.contains(*name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    let input = ConversionInput {
                        raw: field.raw.as_deref(),
                        dependencies,
                        requirements,
                        row_id: record.source.batch_row,
                    };
                    match mapping.convert(&input) {
                        Conversion::Converted(value) => Some(value),
                        Conversion::Deferred | Conversion::Invalid(_) => None,
                    }
                }
            };

            let value = resolved.unwrap_or_else(|| {
                warn!(
                    field = %field.field,
                    source = %record.source.file,
                    row = record.source.row,
                    "No deferred value for record; leaving field blank"
                );
                diagnostics.record(Diagnostics::DEFERRED_MISS, &record.source);
                FieldValue::empty()
            });
            record.set(&field.field, value);
        }
        record.pending_deferred.clear();
    }

    fn track(&self, record: &ConvertedRecord, tracked: &mut TrackedValues) {
        for field in self.spec.registry.tracked_fields() {
            tracked.declare(&field);
            if let Some(value) = record.get(&field) {
                for item in value.values() {
                    tracked.insert(&field, &item);
                }
            }
        }
    }

    fn reset(&mut self) {
        for mapping in self.spec.registry.iter_mut() {
            mapping.reset();
        }
    }

    /// Convert every record of every source, then run the deferred pass.
    /// Record-level failures land in the diagnostics; configuration problems
    /// are returned as errors. Mapping state is reset before returning.
    pub fn convert_batch(&mut self, sources: &[SourceBatch]) -> Result<ConversionBatch> {
        let result = self.convert_batch_inner(sources);
        self.reset();
        result
    }

    fn convert_batch_inner(&mut self, sources: &[SourceBatch]) -> Result<ConversionBatch> {
        let mut batch = ConversionBatch::default();
        let mut converted: Vec<(ConvertedRecord, Vec<PendingField>)> = Vec::new();
        let mut batch_row = 0usize;

        for source in sources {
            let metadata = self.field_metadata(source, &mut batch.diagnostics)?;
            for mapping in self.spec.registry.iter_mut() {
                mapping.preprocess(&metadata);
            }
            let order = self.field_order(&metadata);

            for (row, record) in source.records.iter().enumerate() {
                let source_ref = SourceRef::new(&source.name, row, batch_row);
                batch_row += 1;
                batch.records_read += 1;

                match self.convert_record(record, &source_ref, &order) {
                    RecordOutcome::Converted(record, pending) => {
                        if record.is_blank() {
                            debug!(source = %source.name, row, "Record produced no values");
                            batch.diagnostics.record(Diagnostics::UNKNOWN, &source_ref);
                            continue;
                        }
                        converted.push((record, pending));
                    }
                    RecordOutcome::Rejected { field, reason } => {
                        for mapping in self.spec.registry.iter_mut() {
                            mapping.discard(source_ref.batch_row);
                        }
                        warn!(
                            source = %source.name,
                            row,
                            field = %field,
                            reason = %reason,
                            "Discarding record with invalid field"
                        );
                        batch.diagnostics.record(Diagnostics::INVALID, &source_ref);
                    }
                }
            }

            batch.metadata.insert(source.name.clone(), metadata);
        }

        for mapping in self.spec.registry.iter_mut() {
            mapping.postprocess();
        }

        for (mut record, pending) in converted {
            if !pending.is_empty() {
                self.resolve_deferred(&mut record, pending, &mut batch.diagnostics);
            }
            self.track(&record, &mut batch.tracked);
            batch.records.push(record);
        }

        info!(
            read = batch.records_read,
            converted = batch.records.len(),
            "Conversion batch complete"
        );
        Ok(batch)
    }

    /// Single-pass conversion handing each record to `sink` as soon as it is
    /// converted. Dependencies are converted ahead on demand; mappings that
    /// defer are not allowed.
    pub fn convert_streamed<F>(&mut self, sources: &[SourceBatch], mut sink: F) -> Result<StreamSummary>
    where
        F: FnMut(ConvertedRecord) -> Result<()>,
    {
        if self.spec.registry.has_deferring_fields() {
            return Err(AppError::ConfigError(
                "Streaming conversion cannot run mappings that defer".to_string(),
            ));
        }

        let mut summary = StreamSummary::default();
        let result = self.convert_streamed_inner(sources, &mut sink, &mut summary);
        self.reset();
        result.map(|_| summary)
    }

    fn convert_streamed_inner<F>(
        &mut self,
        sources: &[SourceBatch],
        sink: &mut F,
        summary: &mut StreamSummary,
    ) -> Result<()>
    where
        F: FnMut(ConvertedRecord) -> Result<()>,
    {
        let mut batch_row = 0usize;
        for source in sources {
            let metadata = self.field_metadata(source, &mut summary.diagnostics)?;
            for mapping in self.spec.registry.iter_mut() {
                mapping.preprocess(&metadata);
            }
            let order = self.field_order(&metadata);

            for (row, record) in source.records.iter().enumerate() {
                let source_ref = SourceRef::new(&source.name, row, batch_row);
                batch_row += 1;
                summary.records_read += 1;

                match self.convert_streamed_record(record, &source_ref, &order) {
                    Ok(converted) if converted.is_blank() => {
                        summary.diagnostics.record(Diagnostics::UNKNOWN, &source_ref);
                    }
                    Ok(converted) => {
                        self.track(&converted, &mut summary.tracked);
                        summary.records_converted += 1;
                        sink(converted)?;
                    }
                    Err((field, reason)) => {
                        warn!(
                            source = %source.name,
                            row,
                            field = %field,
                            reason = %reason,
                            "Discarding record with invalid field"
                        );
                        summary.diagnostics.record(Diagnostics::INVALID, &source_ref);
                    }
                }
            }
        }
        Ok(())
    }

    fn convert_streamed_record(
        &mut self,
        record: &InputRecord,
        source: &SourceRef,
        order: &[String],
    ) -> std::result::Result<ConvertedRecord, (String, String)> {
        let mut values: HashMap<String, FieldValue> = HashMap::new();
        let mut visiting: HashSet<String> = HashSet::new();
        let mut converted = ConvertedRecord::new(source.clone());
        if let Some(rejected) = self.validate_record(record, order) {
            return Err(rejected);
        }

        for name in order {
            match self.spec.registry.position(name) {
                Some(idx) => {
                    self.resolve_streamed(idx, record, source, &mut values, &mut visiting)?;
                }
                None if self.spec.policy.allow_custom => {
                    let value = FieldValue::Single(record.get(name).unwrap_or("").to_string());
                    values.insert(name.clone(), value);
                }
                None => {}
            }
        }

        for name in order {
            if let Some(value) = values.remove(name) {
                converted.set(name, value);
            }
        }
        Ok(converted)
    }

    /// Convert the mapping at `idx`, converting its dependencies first
    fn resolve_streamed(
        &mut self,
        idx: usize,
        record: &InputRecord,
        source: &SourceRef,
        values: &mut HashMap<String, FieldValue>,
        visiting: &mut HashSet<String>,
    ) -> std::result::Result<(), (String, String)> {
        let name = self.spec.registry.at(idx).name().to_string();
        if values.contains_key(&name) || !visiting.insert(name.clone()) {
            return Ok(());
        }

        let depends = self.spec.registry.at(idx).attributes().depends.clone();
        for dep in depends {
            if let Some(dep_idx) = self.spec.registry.position(&dep) {
                self.resolve_streamed(dep_idx, record, source, values, visiting)?;
            }
        }

        let mapping = self.spec.registry.at_mut(idx);
        let input = Self::input_for(&*mapping, record, values, source.batch_row);
        match mapping.convert(&input) {
            Conversion::Converted(value) => {
                values.insert(name, value);
                Ok(())
            }
            Conversion::Deferred => Err((name, "deferred while streaming".to_string())),
            Conversion::Invalid(reason) => Err((name, reason)),
        }
    }
}
