// ============================================================
// FIELD METADATA
// ============================================================
// Which fields a source actually carries versus what the mappings expect

use serde::{Deserialize, Serialize};

/// Field sets computed once per source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Fields present in the input, in header order
    pub actual: Vec<String>,

    /// Mapped fields read from the input
    pub expected: Vec<String>,

    /// Mapped fields produced without a raw column
    pub generated: Vec<String>,

    /// Input fields with no mapping and no mapping requiring them
    pub custom: Vec<String>,

    /// Expected fields absent from the input
    pub missing: Vec<String>,
}

impl FieldMetadata {
    /// Classify `actual` against the mapped field sets.
    /// `consumed` lists raw fields that mappings read through their requirements.
    pub fn compute(
        actual: Vec<String>,
        expected: Vec<String>,
        generated: Vec<String>,
        consumed: &[String],
    ) -> Self {
        let custom = actual
            .iter()
            .filter(|name| {
                !expected.contains(name) && !generated.contains(name) && !consumed.contains(name)
            })
            .cloned()
            .collect();
        let missing = expected
            .iter()
            .filter(|name| !actual.contains(name))
            .cloned()
            .collect();

        Self {
            actual,
            expected,
            generated,
            custom,
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_compute_classifies_fields() {
        let metadata = FieldMetadata::compute(
            names(&["ip", "owner", "email", "notes"]),
            names(&["ip", "mac", "owner"]),
            names(&["asset_id"]),
            &names(&["email"]),
        );
        assert_eq!(metadata.custom, names(&["notes"]));
        assert_eq!(metadata.missing, names(&["mac"]));
    }
}
