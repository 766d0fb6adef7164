use std::process::ExitCode;

use bdt::{cli, config::Settings, steps::BdtWorld, trace};
use cucumber::World;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let opts = cucumber::cli::Opts::<_, _, _, cli::Opts>::parsed();
    let cli::Opts {
        features,
        log_level,
        json_logs,
        no_color,
    } = opts.custom.clone();
    trace::init(!no_color, json_logs, &log_level);

    match Settings::from_env() {
        Ok(settings) => {
            settings.install();
        }
        Err(error) => {
            error!(message = "Invalid configuration.", %error);
            return ExitCode::FAILURE;
        }
    }

    info!(message = "Running features.", version = %bdt::get_version(), features = %features.display());
    // Scenarios share the run's session, one at a time.
    BdtWorld::cucumber()
        .max_concurrent_scenarios(1)
        .with_cli(opts)
        .run_and_exit(features)
        .await;
    ExitCode::SUCCESS
}
