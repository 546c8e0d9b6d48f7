use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// What to do when one folder fails to build or upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure in the report and carry on with the next folder.
    #[default]
    Continue,
    /// Stop the run at the first failed folder.
    Abort,
}

/// How folder contents are written to the bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// One zip per folder under a timestamped key.
    #[default]
    Archive,
    /// Every file uploaded as its own object under `<prefix><folder>/<file>`.
    Files,
}

/// Everything the orchestrator needs for one run, as plain values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Remote folder whose child folders are candidates.
    pub root_folder_id: String,
    /// Minimum folder name (inclusive); empty means no filter.
    #[serde(default)]
    pub min_date: String,
    pub bucket: String,
    #[serde(default)]
    pub key_prefix: String,
    /// Fixed offset, in minutes east of UTC, used for timestamped keys.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub mode: TransferMode,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Parent directory for staging trees; the OS temp dir when unset.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

impl TransferConfig {
    pub fn new(root_folder_id: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            root_folder_id: root_folder_id.into(),
            min_date: String::new(),
            bucket: bucket.into(),
            key_prefix: String::new(),
            utc_offset_minutes: 0,
            mode: TransferMode::default(),
            failure_policy: FailurePolicy::default(),
            staging_dir: None,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            root_folder_id = %self.root_folder_id,
            min_date = %self.min_date,
            bucket = %self.bucket,
            mode = ?self.mode,
            failure_policy = ?self.failure_policy,
            "Loaded TransferConfig"
        );
        debug!(?self, "TransferConfig loaded (full debug)");
    }
}
