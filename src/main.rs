use std::process::ExitCode;

use clap::Parser;
use drive_bucket::cli::{run, Cli, EXIT_FAILURE};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    // RUST_LOG wins; otherwise info.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli).await {
        Ok(outcome) => {
            tracing::info!(?outcome, "CLI completed");
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            tracing::error!(error = ?e, "CLI exited with error");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
