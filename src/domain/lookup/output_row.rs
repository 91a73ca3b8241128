// ============================================================
// OUTPUT ROWS
// ============================================================
// Flat rows ready for lookup-table serialization

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat mapping from output field name to a scalar cell value
pub type OutputRow = BTreeMap<String, String>;

/// All rows produced for one key value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowGroup {
    /// Key field the group is anchored on
    pub key_field: String,

    /// Value of the key field shared by every row
    pub key_value: String,

    pub rows: Vec<OutputRow>,
}

impl RowGroup {
    pub fn new(key_field: impl Into<String>, key_value: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            key_value: key_value.into(),
            rows: Vec::new(),
        }
    }
}
