use tracing::warn;

use super::{Conversion, ConversionInput, FieldAttributes, FieldMapping};
use crate::application::use_cases::identity_resolver::IdentityResolver;
use crate::domain::lookup::{FieldMetadata, FieldValue, IdentityMatchConfig};

/// Key field holding every identity candidate of a record
#[derive(Debug, Clone)]
pub struct IdentityField {
    attributes: FieldAttributes,
    resolver: IdentityResolver,
}

impl IdentityField {
    pub fn new(name: &str, config: IdentityMatchConfig) -> Self {
        let resolver = IdentityResolver::new(config);
        let attributes = FieldAttributes::new(name)
            .key()
            .delimited("|")
            .requires(resolver.required_fields());
        Self {
            attributes,
            resolver,
        }
    }
}

impl FieldMapping for IdentityField {
    fn attributes(&self) -> &FieldAttributes {
        &self.attributes
    }

    fn preprocess(&mut self, metadata: &FieldMetadata) {
        let absent: Vec<&String> = self
            .attributes
            .requires
            .iter()
            .filter(|name| !metadata.actual.contains(name))
            .collect();
        if !absent.is_empty() {
            warn!(
                field = %self.attributes.name,
                absent = ?absent,
                "Identity matching reads fields missing from the input"
            );
        }
    }

    fn convert(&mut self, input: &ConversionInput<'_>) -> Conversion {
        let candidates = self
            .resolver
            .resolve(input.raw.unwrap_or(""), &input.requirements);
        Conversion::Converted(FieldValue::Multi(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lookup::MatchStrategy;
    use std::collections::BTreeMap;

    #[test]
    fn test_identity_field_requires_strategy_inputs() {
        let config = IdentityMatchConfig {
            convention: true,
            conventions: vec!["first(1)last()".to_string()],
            ..Default::default()
        };
        let field = IdentityField::new("identity", config);
        let attributes = field.attributes();
        assert!(attributes.is_key_field);
        assert_eq!(attributes.requires, vec!["email", "first", "last"]);
    }

    #[test]
    fn test_identity_field_converts_candidates() {
        let config = IdentityMatchConfig {
            match_order: vec![MatchStrategy::Exact, MatchStrategy::Email, MatchStrategy::EmailShort],
            ..Default::default()
        };
        let mut field = IdentityField::new("identity", config);
        let mut requirements = BTreeMap::new();
        requirements.insert("email".to_string(), "Ann.Lee@corp.example".to_string());

        let converted = field.convert(&ConversionInput {
            raw: Some("alee|ALEE"),
            requirements,
            ..Default::default()
        });
        assert_eq!(
            converted,
            Conversion::Converted(FieldValue::Multi(vec![
                "alee".to_string(),
                "ann.lee@corp.example".to_string(),
                "ann.lee".to_string()
            ]))
        );
    }
}
