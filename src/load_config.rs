/// `load_config` module: loads the YAML config file, layers environment overrides on top,
/// and maps the result onto the core's plain [`TransferConfig`].
///
/// This module is the only place where untrusted YAML and environment values are parsed.
///
/// # Sources, lowest precedence first
/// 1. The YAML file passed with `--config` (optional; every section has defaults)
/// 2. Environment variables (a `.env` file is loaded by `main`):
///    `DRIVE_ROOT_FOLDER_ID`, `DRIVE_MIN_DATE`, `GCS_BUCKET`, `GCS_KEY_PREFIX`, `GCS_PROJECT_ID`
/// 3. CLI flags, applied by the caller
///
/// # Errors
/// All errors use `anyhow::Error` for context-rich diagnostics and surface at the CLI boundary.
use anyhow::{bail, Result};
use drive_bucket_core::config::{FailurePolicy, TransferConfig, TransferMode};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_ROOT_FOLDER_ID: &str = "DRIVE_ROOT_FOLDER_ID";
pub const ENV_MIN_DATE: &str = "DRIVE_MIN_DATE";
pub const ENV_BUCKET: &str = "GCS_BUCKET";
pub const ENV_KEY_PREFIX: &str = "GCS_KEY_PREFIX";
pub const ENV_PROJECT_ID: &str = "GCS_PROJECT_ID";

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub drive: DriveSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub transfer: TransferSection,
}

#[derive(Debug, Deserialize)]
pub struct DriveSection {
    #[serde(default)]
    pub root_folder_id: String,
    #[serde(default)]
    pub min_date: String,
    #[serde(default = "default_client_secret")]
    pub client_secret: PathBuf,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default)]
    pub api_base: Option<String>,
}

impl Default for DriveSection {
    fn default() -> Self {
        Self {
            root_folder_id: String::new(),
            min_date: String::new(),
            client_secret: default_client_secret(),
            token_file: default_token_file(),
            api_base: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub key_prefix: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Environment variable holding a pre-issued storage access token.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key_prefix: String::new(),
            project_id: None,
            upload_timeout_secs: default_upload_timeout(),
            utc_offset_minutes: 0,
            api_base: None,
            access_token_env: default_access_token_env(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TransferSection {
    #[serde(default)]
    pub mode: TransferMode,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_client_secret() -> PathBuf {
    PathBuf::from("client_secret.json")
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_upload_timeout() -> u64 {
    600
}

fn default_access_token_env() -> String {
    "GCS_ACCESS_TOKEN".to_string()
}

impl CliConfig {
    /// Override file values with any non-empty environment variables.
    pub fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        if let Some(v) = var(ENV_ROOT_FOLDER_ID) {
            self.drive.root_folder_id = v;
        }
        if let Some(v) = var(ENV_MIN_DATE) {
            self.drive.min_date = v;
        }
        if let Some(v) = var(ENV_BUCKET) {
            self.storage.bucket = v;
        }
        if let Some(v) = var(ENV_KEY_PREFIX) {
            self.storage.key_prefix = v;
        }
        if let Some(v) = var(ENV_PROJECT_ID) {
            self.storage.project_id = Some(v);
        }
    }

    /// Fields every command needs.
    pub fn validate_listing(&self) -> Result<()> {
        if self.drive.root_folder_id.trim().is_empty() {
            bail!("drive.root_folder_id is not set (config file or {ENV_ROOT_FOLDER_ID})");
        }
        Ok(())
    }

    /// Fields a transfer needs on top of listing.
    pub fn validate_transfer(&self) -> Result<()> {
        self.validate_listing()?;
        if self.storage.bucket.trim().is_empty() {
            bail!("storage.bucket is not set (config file or {ENV_BUCKET})");
        }
        Ok(())
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            root_folder_id: self.drive.root_folder_id.clone(),
            min_date: self.drive.min_date.clone(),
            bucket: self.storage.bucket.clone(),
            key_prefix: self.storage.key_prefix.clone(),
            utc_offset_minutes: self.storage.utc_offset_minutes,
            mode: self.transfer.mode,
            failure_policy: self.transfer.failure_policy,
            staging_dir: self.transfer.staging_dir.clone(),
        }
    }
}

/// Loads the optional YAML config file and applies environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let mut config = match path {
        Some(path_ref) => {
            info!(config_path = ?path_ref, "Loading configuration from file");
            let content = fs::read_to_string(path_ref).map_err(|e| {
                error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
                anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
            })?;
            // An empty file is a valid, all-defaults config.
            if content.trim().is_empty() {
                CliConfig::default()
            } else {
                serde_yaml::from_str(&content).map_err(|e| {
                    error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                    anyhow::anyhow!("Failed to parse config YAML: {e}")
                })?
            }
        }
        None => {
            info!("No config file given, using defaults and environment");
            CliConfig::default()
        }
    };
    config.apply_env_overrides();
    Ok(config)
}
