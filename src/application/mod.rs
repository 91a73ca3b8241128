pub mod use_cases;

pub use use_cases::lookup_conversion::{JobReport, LookupJob};
