// ============================================================
// LOOKUP DOMAIN LAYER
// ============================================================
// Value types flowing through lookup conversion
// No I/O, no async

mod conversion_policy;
mod diagnostics;
mod field_metadata;
mod field_value;
mod identity_config;
mod input_record;
mod output_row;
mod routing;
mod tracked_values;

pub use conversion_policy::ConversionPolicy;
pub use diagnostics::{DiagnosticEntry, Diagnostics, SourceRef};
pub use field_metadata::FieldMetadata;
pub use field_value::{ConvertedRecord, FieldValue};
pub use identity_config::{IdentityMatchConfig, MatchStrategy};
pub use input_record::{InputRecord, SourceBatch};
pub use output_row::{OutputRow, RowGroup};
pub use routing::{
    AncillaryConfig, DestinationConfig, RouteConfig, RoutePredicate, RouteRule, RoutingConfig,
};
pub use tracked_values::TrackedValues;
