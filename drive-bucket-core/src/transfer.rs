//! High-level pipeline: authorize → list folders → build → upload, one folder at a time.
//!
//! [`TransferOrchestrator`] is the only component that sequences work across folders.
//! A run moves through [`RunState`]:
//!
//! ```text
//! Start -> Authorized -> Listing -> { Building -> Uploaded }* -> Done
//!                  (any state) -> Failed
//! ```
//!
//! # Failure policy
//! Auth and listing failures always end the run. A folder whose download, archive or
//! upload fails is either recorded and skipped ([`FailurePolicy::Continue`], the default)
//! or ends the run with [`TransferError::Folder`] ([`FailurePolicy::Abort`]). Folders
//! uploaded earlier in the run stay uploaded either way.
//!
//! # Concurrency
//! Strictly sequential: one folder, and within it one file, at a time. Each folder build
//! owns its staging tree and drops it before the next folder starts.

use std::fs::File;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveBuilder, StagedFile};
use crate::config::{FailurePolicy, TransferConfig, TransferMode};
use crate::contract::{
    ArchiveUploader, NoopProgress, ProgressObserver, RemoteEntry, RemoteStore, Session,
    SessionProvider, UploadRequest, UploadedObject, ZIP_CONTENT_TYPE,
};
use crate::error::{ArchiveError, TransferError, TransferResult, UploadError};
use crate::listing::list_child_folders;
use crate::upload_key::UploadKeyGenerator;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Phases of one run, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Start,
    Authorized,
    Listing,
    Building,
    Uploaded,
    Done,
    Failed,
}

/// What happened to one candidate folder.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FolderOutcome {
    /// The folder's archive is in the bucket.
    Uploaded {
        key: String,
        entries: Vec<String>,
        bytes: u64,
    },
    /// File mode: each file stored as its own object.
    FilesUploaded { objects: Vec<UploadedObject> },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderReport {
    pub folder_id: String,
    pub folder_name: String,
    pub outcome: FolderOutcome,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferReport {
    pub folders: Vec<FolderReport>,
}

impl TransferReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FolderReport> {
        self.folders
            .iter()
            .filter(|f| !matches!(f.outcome, FolderOutcome::Failed { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &FolderReport> {
        self.folders
            .iter()
            .filter(|f| matches!(f.outcome, FolderOutcome::Failed { .. }))
    }

    /// True when no folder failed.
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Drives one transfer run over injected collaborators.
pub struct TransferOrchestrator<'a, A: ?Sized, R: ?Sized, U: ?Sized> {
    config: &'a TransferConfig,
    sessions: &'a A,
    store: &'a R,
    uploader: &'a U,
    observer: &'a dyn ProgressObserver,
    keys: UploadKeyGenerator,
}

impl<'a, A, R, U> TransferOrchestrator<'a, A, R, U>
where
    A: SessionProvider + ?Sized,
    R: RemoteStore + ?Sized,
    U: ArchiveUploader + ?Sized,
{
    pub fn new(config: &'a TransferConfig, sessions: &'a A, store: &'a R, uploader: &'a U) -> Self {
        Self {
            config,
            sessions,
            store,
            uploader,
            observer: &NoopProgress,
            keys: UploadKeyGenerator::new(config.key_prefix.clone(), config.utc_offset_minutes),
        }
    }

    pub fn with_progress(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_key_generator(mut self, keys: UploadKeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    fn enter(&self, state: RunState) {
        info!(state = ?state, "[TRANSFER] State transition");
    }

    fn builder(&self) -> ArchiveBuilder<'_, R, A> {
        ArchiveBuilder::new(self.store, self.sessions, self.observer)
            .staging_in(self.config.staging_dir.clone())
    }

    async fn authorize(&self) -> TransferResult<Session> {
        self.sessions.session().await.map_err(|e| {
            error!(error = %e, "[TRANSFER][ERROR] Could not obtain a session");
            self.enter(RunState::Failed);
            TransferError::from(e)
        })
    }

    /// Authorize and list the candidate folders without transferring anything.
    pub async fn select_folders(&self) -> TransferResult<Vec<RemoteEntry>> {
        let session = self.authorize().await?;
        self.enter(RunState::Authorized);
        self.list_candidates(&session).await
    }

    async fn list_candidates(&self, session: &Session) -> TransferResult<Vec<RemoteEntry>> {
        self.enter(RunState::Listing);
        list_child_folders(
            self.store,
            session,
            &self.config.root_folder_id,
            &self.config.min_date,
        )
        .await
        .map_err(|e| {
            error!(error = %e, root = %self.config.root_folder_id, "[TRANSFER][ERROR] Folder listing failed");
            self.enter(RunState::Failed);
            TransferError::from(e)
        })
    }

    /// Run the whole transfer and report per-folder outcomes.
    pub async fn run(&self) -> TransferResult<TransferReport> {
        self.enter(RunState::Start);
        self.config.trace_loaded();

        let session = self.authorize().await?;
        self.enter(RunState::Authorized);
        let folders = self.list_candidates(&session).await?;

        let mut report = TransferReport::default();
        for folder in folders {
            info!(folder = %folder.name, folder_id = %folder.id, "[TRANSFER] Processing folder");

            let outcome = match self.transfer_folder(&folder).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => {
                    error!(folder = %folder.name, error = %e, "[TRANSFER][ERROR] Fatal error, stopping run");
                    self.enter(RunState::Failed);
                    return Err(e);
                }
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::Abort => {
                        error!(folder = %folder.name, error = %e, "[TRANSFER][ERROR] Folder failed, aborting run");
                        self.enter(RunState::Failed);
                        return Err(TransferError::Folder {
                            folder: folder.name.clone(),
                            source: Box::new(e),
                        });
                    }
                    FailurePolicy::Continue => {
                        warn!(folder = %folder.name, error = %e, "[TRANSFER] Folder failed, continuing with next folder");
                        FolderOutcome::Failed {
                            error: error_chain(&e),
                        }
                    }
                },
            };
            report.folders.push(FolderReport {
                folder_id: folder.id,
                folder_name: folder.name,
                outcome,
            });
        }

        self.enter(RunState::Done);
        let failed = report.failed().count();
        info!(
            folders = report.folders.len(),
            succeeded = report.folders.len() - failed,
            failed,
            "[TRANSFER] Run complete"
        );
        match serde_json::to_string_pretty(&report) {
            Ok(json) => debug!(json = %json, "[TRANSFER][DEBUG] Report as JSON"),
            Err(e) => debug!(error = ?e, "[TRANSFER][DEBUG] Failed to serialize report"),
        }
        Ok(report)
    }

    /// The builder asks the session provider before every remote call, so long folders
    /// survive token expiry.
    async fn transfer_folder(&self, folder: &RemoteEntry) -> TransferResult<FolderOutcome> {
        match self.config.mode {
            TransferMode::Archive => self.transfer_archive(folder).await,
            TransferMode::Files => self.transfer_files(folder).await,
        }
    }

    async fn transfer_archive(&self, folder: &RemoteEntry) -> TransferResult<FolderOutcome> {
        self.enter(RunState::Building);
        let archive = self.builder().build(folder).await?;
        let entries = archive.entries().to_vec();
        let size = archive.size();

        let key = self.keys.next_key();
        info!(folder = %folder.name, key = %key, bytes = size, "[TRANSFER][UPLOAD] Uploading archive");
        let stored = self
            .uploader
            .upload(UploadRequest {
                bucket: self.config.bucket.clone(),
                key: key.to_string(),
                content_type: ZIP_CONTENT_TYPE.to_string(),
                body: archive.into_file(),
                size,
                overwrite: false,
            })
            .await
            .map_err(|e| {
                error!(folder = %folder.name, key = %key, error = %e, "[TRANSFER][ERROR][UPLOAD] Archive upload failed");
                e
            })?;
        self.enter(RunState::Uploaded);
        info!(folder = %folder.name, key = %stored.key, entries = entries.len(), "[TRANSFER][UPLOAD] Archive uploaded");

        Ok(FolderOutcome::Uploaded {
            key: stored.key,
            entries,
            bytes: size,
        })
    }

    async fn transfer_files(&self, folder: &RemoteEntry) -> TransferResult<FolderOutcome> {
        self.enter(RunState::Building);
        let builder = self.builder();
        let staging = builder.new_staging_tree()?;
        let staged = builder.stage_folder(&staging, folder).await?;

        let mut objects = Vec::with_capacity(staged.len());
        for file in &staged {
            objects.push(self.upload_staged_file(file).await?);
        }
        self.enter(RunState::Uploaded);
        info!(folder = %folder.name, objects = objects.len(), "[TRANSFER][UPLOAD] Folder files uploaded");
        Ok(FolderOutcome::FilesUploaded { objects })
    }

    async fn upload_staged_file(&self, file: &StagedFile) -> TransferResult<UploadedObject> {
        let key = format!("{}{}", self.config.key_prefix, file.relative_path);
        let body = File::open(&file.path).map_err(|source| ArchiveError::Io {
            operation: "reopen staged file",
            path: file.path.clone(),
            source,
        })?;
        let content_type = file
            .entry
            .export_mime_type
            .clone()
            .or_else(|| file.entry.mime_type.clone())
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        debug!(key = %key, content_type = %content_type, bytes = file.bytes, "[TRANSFER][UPLOAD] Uploading file");
        let stored = self
            .uploader
            .upload(UploadRequest {
                bucket: self.config.bucket.clone(),
                key,
                content_type,
                body,
                size: file.bytes,
                overwrite: true,
            })
            .await
            .map_err(|e: UploadError| {
                error!(file = %file.entry.name, error = %e, "[TRANSFER][ERROR][UPLOAD] File upload failed");
                e
            })?;
        Ok(stored)
    }
}

/// Render an error with all of its sources, outermost first.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
