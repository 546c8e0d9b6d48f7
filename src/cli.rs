///
/// This module implements the CLI interface for drive-bucket: command parsing, config
/// layering, adapter wiring and the async entrypoint.
///
/// All pipeline logic (listing, staging, archiving, key generation, failure policy) lives in
/// the [`drive-bucket-core`] crate. This module builds the Drive, OAuth and Cloud Storage
/// adapters from configuration and hands them to the core orchestrator.
///
/// ## How To Use
/// - For command-line users: run the `drive-bucket` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`] and map the
///   returned [`RunOutcome`] to a process exit code.
///
/// [`drive-bucket-core`]: ../../drive-bucket-core/
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use drive_bucket_core::config::{FailurePolicy, TransferMode};
use drive_bucket_core::contract::SessionProvider;
use drive_bucket_core::transfer::TransferOrchestrator;

use crate::auth::{StaticTokenSession, TokenFileSession};
use crate::drive::DriveClient;
use crate::load_config::{load_config, CliConfig};
use crate::progress::LogProgress;
use crate::storage::GcsUploader;

/// Exit code for fatal errors: bad config, failed authorization or listing, aborted run.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code when the run completed but at least one folder failed.
pub const EXIT_PARTIAL: u8 = 3;

/// CLI for drive-bucket: archive Drive folders into a Cloud Storage bucket.
#[derive(Parser)]
#[clap(
    name = "drive-bucket",
    version,
    about = "Archive dated Google Drive folders and upload them to a Cloud Storage bucket"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Archive every selected folder and upload it to the bucket
    Transfer {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Only folders whose name sorts at or after this value
        #[clap(long)]
        min_date: Option<String>,
        /// Upload one zip per folder, or every file as its own object
        #[clap(long, value_enum)]
        mode: Option<ModeArg>,
        /// Stop at the first failed folder
        #[clap(long)]
        fail_fast: bool,
    },
    /// List the folders a transfer would process, without downloading anything
    List {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Only folders whose name sorts at or after this value
        #[clap(long)]
        min_date: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Archive,
    Files,
}

impl From<ModeArg> for TransferMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Archive => TransferMode::Archive,
            ModeArg::Files => TransferMode::Files,
        }
    }
}

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    PartialFailure { failed: usize },
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::PartialFailure { .. } => EXIT_PARTIAL,
        }
    }
}

/// Adapters built from configuration.
struct Adapters {
    drive_sessions: Arc<TokenFileSession>,
    drive: DriveClient,
    uploader: GcsUploader,
}

impl Adapters {
    fn from_config(config: &CliConfig) -> Self {
        let drive_sessions = Arc::new(TokenFileSession::new(
            &config.drive.token_file,
            &config.drive.client_secret,
        ));
        let storage_sessions: Arc<dyn SessionProvider> =
            match std::env::var(&config.storage.access_token_env) {
                Ok(token) if !token.is_empty() => {
                    tracing::info!(
                        env = %config.storage.access_token_env,
                        "Using pre-issued storage access token"
                    );
                    Arc::new(StaticTokenSession::new(token))
                }
                _ => drive_sessions.clone() as Arc<dyn SessionProvider>,
            };
        let uploader = GcsUploader::new(storage_sessions, config.storage.api_base.clone())
            .with_project_id(config.storage.project_id.clone())
            .with_timeout(Duration::from_secs(config.storage.upload_timeout_secs));
        Self {
            drive_sessions,
            drive: DriveClient::new(config.drive.api_base.clone()),
            uploader,
        }
    }
}

fn load_with_overrides(config: Option<PathBuf>, min_date: Option<String>) -> Result<CliConfig> {
    let mut config = load_config(config.as_deref())?;
    if let Some(min_date) = min_date {
        config.drive.min_date = min_date;
    }
    Ok(config)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<RunOutcome> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Transfer {
            config,
            min_date,
            mode,
            fail_fast,
        } => {
            let mut config = load_with_overrides(config, min_date)?;
            if let Some(mode) = mode {
                config.transfer.mode = mode.into();
            }
            if fail_fast {
                config.transfer.failure_policy = FailurePolicy::Abort;
            }
            config.validate_transfer()?;
            tracing::info!(command = "transfer", "Starting transfer");

            let transfer_config = config.transfer_config();
            let adapters = Adapters::from_config(&config);
            let progress = LogProgress::default();
            let report = TransferOrchestrator::new(
                &transfer_config,
                &*adapters.drive_sessions,
                &adapters.drive,
                &adapters.uploader,
            )
            .with_progress(&progress)
            .run()
            .await?;

            for folder in report.folders.iter() {
                tracing::info!(
                    folder = %folder.folder_name,
                    outcome = ?folder.outcome,
                    "Folder result"
                );
            }
            let failed = report.failed().count();
            if failed == 0 {
                tracing::info!(
                    folders = report.folders.len(),
                    "Transfer completed successfully"
                );
                Ok(RunOutcome::Success)
            } else {
                tracing::warn!(
                    failed,
                    folders = report.folders.len(),
                    "Transfer completed with failed folders"
                );
                Ok(RunOutcome::PartialFailure { failed })
            }
        }
        Commands::List { config, min_date } => {
            let config = load_with_overrides(config, min_date)?;
            config.validate_listing()?;
            tracing::info!(command = "list", "Listing candidate folders");

            let transfer_config = config.transfer_config();
            let adapters = Adapters::from_config(&config);
            let folders = TransferOrchestrator::new(
                &transfer_config,
                &*adapters.drive_sessions,
                &adapters.drive,
                &adapters.uploader,
            )
            .select_folders()
            .await?;
            for folder in &folders {
                println!("{}\t{}", folder.name, folder.id);
            }
            tracing::info!(count = folders.len(), "Listing complete");
            Ok(RunOutcome::Success)
        }
    }
}
