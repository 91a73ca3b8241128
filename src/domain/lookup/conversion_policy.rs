// ============================================================
// CONVERSION POLICY
// ============================================================
// Job-level switches applied on top of the field mappings

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionPolicy {
    /// Pass un-mapped input fields through unchanged
    pub allow_custom: bool,

    /// Permit a key field to carry more than one value
    pub allow_mv_keys: bool,

    /// Drop repeated keys inline while streaming
    pub eliminate_duplicates: bool,

    /// Fields appended to an existing key instead of discarding the repeat.
    /// When empty, a repeated key discards the later record entirely.
    pub merge_fields: Vec<String>,

    /// Fail the batch on extra or missing input fields
    pub strict: bool,
}
