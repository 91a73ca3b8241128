use super::{Conversion, ConversionInput, FieldAttributes, FieldMapping};
use crate::domain::lookup::FieldValue;

/// Plain text field, optionally multi-valued and lower-cased
#[derive(Debug, Clone)]
pub struct StringField {
    attributes: FieldAttributes,
    lowercase: bool,
}

impl StringField {
    pub fn new(attributes: FieldAttributes) -> Self {
        Self {
            attributes,
            lowercase: false,
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(FieldAttributes::new(name))
    }

    /// Host names and domains compare case-insensitively downstream
    pub fn hostname(attributes: FieldAttributes) -> Self {
        Self {
            attributes,
            lowercase: true,
        }
    }
}

impl FieldMapping for StringField {
    fn attributes(&self) -> &FieldAttributes {
        &self.attributes
    }

    fn convert(&mut self, input: &ConversionInput<'_>) -> Conversion {
        let raw = input.raw_trimmed();
        let raw = if self.lowercase {
            raw.to_lowercase()
        } else {
            raw.to_string()
        };
        Conversion::Converted(FieldValue::split(&raw, self.attributes.delim()))
    }
}
