pub mod field_mappings;
pub mod identity_resolver;
pub mod ip_ranges;
pub mod lookup_conversion;
