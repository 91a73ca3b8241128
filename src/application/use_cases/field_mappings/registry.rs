use std::collections::HashMap;

use super::FieldMapping;
use crate::domain::error::{AppError, Result};
use crate::domain::lookup::ConversionPolicy;

/// Ordered set of field mappings, unique by name
#[derive(Default)]
pub struct FieldRegistry {
    mappings: Vec<Box<dyn FieldMapping>>,
    index: HashMap<String, usize>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M>(&mut self, mapping: M) -> Result<()>
    where
        M: FieldMapping + 'static,
    {
        self.register_boxed(Box::new(mapping))
    }

    pub fn register_boxed(&mut self, mapping: Box<dyn FieldMapping>) -> Result<()> {
        let name = mapping.name().to_string();
        if name.is_empty() {
            return Err(AppError::ConfigError(
                "Field mapping name must not be empty".to_string(),
            ));
        }
        if self.index.contains_key(&name) {
            return Err(AppError::ConfigError(format!(
                "Field mapping '{}' registered twice",
                name
            )));
        }
        self.index.insert(name, self.mappings.len());
        self.mappings.push(mapping);
        Ok(())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&dyn FieldMapping> {
        self.position(name).map(|idx| self.mappings[idx].as_ref())
    }

    pub fn at(&self, idx: usize) -> &dyn FieldMapping {
        self.mappings[idx].as_ref()
    }

    pub fn at_mut(&mut self, idx: usize) -> &mut dyn FieldMapping {
        self.mappings[idx].as_mut()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn FieldMapping> {
        self.mappings.iter().map(|mapping| mapping.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn FieldMapping>> {
        self.mappings.iter_mut()
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|mapping| mapping.name().to_string()).collect()
    }

    fn names_where(&self, predicate: impl Fn(&dyn FieldMapping) -> bool) -> Vec<String> {
        self.iter()
            .filter(|mapping| predicate(*mapping))
            .map(|mapping| mapping.name().to_string())
            .collect()
    }

    pub fn key_fields(&self) -> Vec<String> {
        self.names_where(|mapping| mapping.attributes().is_key_field)
    }

    pub fn persistent_fields(&self) -> Vec<String> {
        self.names_where(|mapping| mapping.attributes().is_persistent)
    }

    pub fn tracked_fields(&self) -> Vec<String> {
        self.names_where(|mapping| mapping.attributes().is_tracked)
    }

    pub fn expected_fields(&self) -> Vec<String> {
        self.names_where(|mapping| !mapping.attributes().is_generated)
    }

    pub fn generated_fields(&self) -> Vec<String> {
        self.names_where(|mapping| mapping.attributes().is_generated)
    }

    /// Raw fields read through `requires` or `deferred_requires`
    pub fn consumed_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for mapping in self.iter() {
            let attributes = mapping.attributes();
            for name in attributes.requires.iter().chain(&attributes.deferred_requires) {
                if !fields.contains(name) {
                    fields.push(name.clone());
                }
            }
        }
        fields
    }

    pub fn has_deferring_fields(&self) -> bool {
        self.iter().any(|mapping| mapping.attributes().defers)
    }
}

/// Field mappings plus job-level policy for one conversion job
#[derive(Default)]
pub struct ConversionSpec {
    pub registry: FieldRegistry,
    pub policy: ConversionPolicy,
}

impl ConversionSpec {
    pub fn new(policy: ConversionPolicy) -> Self {
        Self {
            registry: FieldRegistry::new(),
            policy,
        }
    }

    pub fn register<M>(&mut self, mapping: M) -> Result<()>
    where
        M: FieldMapping + 'static,
    {
        self.registry.register(mapping)
    }

    /// Builder form of [`Self::register`]
    pub fn with<M>(mut self, mapping: M) -> Result<Self>
    where
        M: FieldMapping + 'static,
    {
        self.registry.register(mapping)?;
        Ok(self)
    }
}
