use super::{Conversion, ConversionInput, FieldAttributes, FieldMapping};
use crate::domain::lookup::FieldValue;

type DeriveFn = Box<dyn Fn(&ConversionInput<'_>) -> FieldValue + Send>;

/// Generated field computed from other converted fields
pub struct DerivedField {
    attributes: FieldAttributes,
    derive: DeriveFn,
}

impl DerivedField {
    pub fn new<F>(attributes: FieldAttributes, derive: F) -> Self
    where
        F: Fn(&ConversionInput<'_>) -> FieldValue + Send + 'static,
    {
        Self {
            attributes: attributes.generated(),
            derive: Box::new(derive),
        }
    }

    /// Join every value of the dependencies, in dependency order, with `separator`
    pub fn joined(attributes: FieldAttributes, separator: &str) -> Self {
        let separator = separator.to_string();
        let order = attributes.depends.clone();
        Self::new(attributes, move |input| {
            let mut parts: Vec<String> = Vec::new();
            for name in &order {
                if let Some(value) = input.dependency(name) {
                    for part in value.values() {
                        if !parts.contains(&part) {
                            parts.push(part);
                        }
                    }
                }
            }
            FieldValue::Single(parts.join(&separator))
        })
    }
}

impl std::fmt::Debug for DerivedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedField")
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl FieldMapping for DerivedField {
    fn attributes(&self) -> &FieldAttributes {
        &self.attributes
    }

    fn convert(&mut self, input: &ConversionInput<'_>) -> Conversion {
        Conversion::Converted((self.derive)(input))
    }
}
