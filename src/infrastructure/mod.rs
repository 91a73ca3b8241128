pub mod config;
pub mod csv;
pub mod routing;
pub mod staging;
