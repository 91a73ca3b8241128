// ============================================================
// FIELD MAPPINGS
// ============================================================
// Named conversion rules applied to each input field.
// Every field kind implements `FieldMapping`; the engine only sees the trait.

mod derived;
mod identity;
mod ip;
mod normalized;
mod registry;
mod text;

pub use derived::DerivedField;
pub use identity::IdentityField;
pub use ip::IpField;
pub use normalized::{BooleanField, MacField, PriorityField};
pub use registry::{ConversionSpec, FieldRegistry};
pub use text::StringField;

use std::collections::BTreeMap;

use crate::domain::lookup::{FieldMetadata, FieldValue};

/// Static description of a mapping, shared by every field kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAttributes {
    /// Output field name
    pub name: String,

    /// Output fields whose converted values this mapping reads
    pub depends: Vec<String>,

    /// Raw input fields read during the immediate pass
    pub requires: Vec<String>,

    /// Raw input fields read during the deferred pass
    pub deferred_requires: Vec<String>,

    /// Produced without a raw input column
    pub is_generated: bool,

    /// Part of the output table's key
    pub is_key_field: bool,

    /// Copied into every row expanded from one record
    pub is_persistent: bool,

    /// Distinct values collected for an ancillary table
    pub is_tracked: bool,

    /// Separator for multi-valued raw cells
    pub delim: Option<String>,

    /// May hand its value over to the deferred pass
    pub defers: bool,
}

impl FieldAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key_field = true;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.is_persistent = true;
        self
    }

    pub fn tracked(mut self) -> Self {
        self.is_tracked = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.is_generated = true;
        self
    }

    pub fn deferring(mut self) -> Self {
        self.defers = true;
        self
    }

    pub fn delimited(mut self, delim: impl Into<String>) -> Self {
        self.delim = Some(delim.into());
        self
    }

    pub fn depends_on<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn deferred_requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deferred_requires.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn delim(&self) -> Option<&str> {
        self.delim.as_deref()
    }
}

/// Inputs handed to one immediate conversion
#[derive(Debug, Clone, Default)]
pub struct ConversionInput<'a> {
    /// The field's own raw value, absent when the column is missing
    pub raw: Option<&'a str>,

    /// Converted values of `depends`; deferred or missing dependencies are absent
    pub dependencies: BTreeMap<String, FieldValue>,

    /// Raw values of `requires`, blank when the column is missing
    pub requirements: BTreeMap<String, String>,

    /// Position of the record in the batch
    pub row_id: usize,
}

impl ConversionInput<'_> {
    pub fn raw_trimmed(&self) -> &str {
        self.raw.map(str::trim).unwrap_or("")
    }

    pub fn dependency(&self, name: &str) -> Option<&FieldValue> {
        self.dependencies.get(name)
    }

    pub fn requirement(&self, name: &str) -> &str {
        self.requirements.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Inputs handed to one deferred conversion
#[derive(Debug, Clone, Default)]
pub struct DeferredInput {
    /// Raw values of `deferred_requires`
    pub requirements: BTreeMap<String, String>,

    /// Join key back to state built during postprocess
    pub row_id: usize,
}

/// Outcome of an immediate conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    Converted(FieldValue),
    Deferred,
    Invalid(String),
}

/// Capability every field kind provides to the conversion engine
pub trait FieldMapping: Send {
    fn attributes(&self) -> &FieldAttributes;

    fn name(&self) -> &str {
        &self.attributes().name
    }

    /// Reject a raw value before conversion; a rejection discards the whole record
    fn validate(&self, _raw: Option<&str>) -> bool {
        true
    }

    /// Called once per source before its records are converted
    fn preprocess(&mut self, _metadata: &FieldMetadata) {}

    fn convert(&mut self, input: &ConversionInput<'_>) -> Conversion;

    /// Resolve a deferred value; `None` when no state exists for the row
    fn convert_deferred(&mut self, _input: &DeferredInput) -> Option<FieldValue> {
        None
    }

    /// Forget the batch state contributed by the rejected record at `row_id`
    fn discard(&mut self, _row_id: usize) {}

    /// Called once after every record of the batch finished its immediate pass
    fn postprocess(&mut self) {}

    /// Drop all batch-scoped state
    fn reset(&mut self) {}
}
