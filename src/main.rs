use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    match lookupgen_lib::run(config_path.as_deref()) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize job report");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            tracing::error!(error = %err, "Lookup job failed");
            ExitCode::FAILURE
        }
    }
}
