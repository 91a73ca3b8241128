pub mod application;
pub mod domain;
pub mod infrastructure;

use std::path::Path;

use tracing::error;

pub use crate::application::use_cases::lookup_conversion::{JobReport, LookupJob, LookupKind};
pub use crate::domain::error::{AppError, Result};
pub use crate::infrastructure::config::LookupJobConfig;

/// Load the job configuration and run it once
pub fn run(config_path: Option<&Path>) -> Result<JobReport> {
    let config = LookupJobConfig::load(config_path).map_err(|err| {
        error!(error = %err, "Failed to load job configuration");
        err
    })?;
    LookupJob::new(config).run()
}
