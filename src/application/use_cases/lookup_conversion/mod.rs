// ============================================================
// LOOKUP CONVERSION
// ============================================================
// Records in, flat lookup tables out:
// engine (two-pass conversion) -> formatter (row expansion) -> router (tables)

mod engine;
mod formatter;
mod job;
mod presets;

pub use engine::{ConversionBatch, ConversionEngine, StreamSummary};
pub use formatter::{FormattedOutput, OutputFormatter, StreamFormatter};
pub use job::{JobReport, LookupJob};
pub use presets::{
    asset_routing, asset_spec, identity_routing, identity_spec, LookupKind, ASSET_BY_CIDR,
    ASSET_BY_STR, ASSET_FIELDS, IDENTITY_EXPANDED, IDENTITY_FIELDS,
};
