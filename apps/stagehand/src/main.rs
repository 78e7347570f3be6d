//! # Stagehand
//!
//! Promote the newest Staging model version to Production.
//!
//! With no subcommand this runs `promote` against the MLflow registry named
//! by `MLFLOW_TRACKING_URI` (or `DAGSHUB_REPO_OWNER`/`DAGSHUB_REPO_NAME`,
//! defaulting to the `irfanshaikh911/CI_MLOPS` DagsHub repository),
//! authenticating with `DAGSHUB_TOKEN`. The token is the only required
//! variable.

use clap::Parser;
use stagehand::cli::{self, Cli, EXIT_ERROR};
use stagehand::logging::init_tracing;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let mut stdout = std::io::stdout().lock();
    match cli::run(cli, |key| std::env::var(key).ok(), &mut stdout) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(%err, "stagehand failed");
            eprintln!("Error: {err}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
