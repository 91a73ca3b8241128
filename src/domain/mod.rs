pub mod error;

// Lookup conversion value types
pub mod lookup;
