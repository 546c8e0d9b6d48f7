//! Error taxonomy for the transfer pipeline.
//!
//! Each stage owns one error type. Transport failures coming from adapters are boxed,
//! local filesystem and archive failures keep their concrete source. [`TransferError`]
//! aggregates them for the orchestrator.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error used by adapters to wrap transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for orchestrator operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Remote listing failed (auth, quota, network, malformed response).
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("listing request failed")]
    Transport {
        #[source]
        source: BoxError,
    },
    #[error("listing rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("listing response could not be decoded")]
    Decode {
        #[source]
        source: BoxError,
    },
}

/// Downloading one remote file failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download of {file_id} failed")]
    Transport {
        file_id: String,
        #[source]
        source: BoxError,
    },
    #[error("download of {file_id} rejected with status {status}: {body}")]
    Status {
        file_id: String,
        status: u16,
        body: String,
    },
    #[error("download of {file_id} ended after {received} of {expected} bytes")]
    Truncated {
        file_id: String,
        received: u64,
        expected: u64,
    },
    #[error("writing download to {path} failed")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Staging or writing the compressed archive failed.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive io failure during {operation} at {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("staging tree walk failed at {path}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("zip write failed for entry {entry}")]
    Zip {
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive writer task failed: {0}")]
    Task(String),
}

/// Writing an object to the bucket failed.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload of {key} failed")]
    Transport {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error("upload of {key} rejected with status {status}: {body}")]
    Status {
        key: String,
        status: u16,
        body: String,
    },
    #[error("object {key} already exists in bucket {bucket}")]
    Conflict { bucket: String, key: String },
    #[error("authorization for upload of {key} failed")]
    Auth {
        key: String,
        #[source]
        source: AuthError,
    },
    #[error("reading upload body for {key} failed")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Obtaining or refreshing credentials failed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no cached token at {path}; run the consent flow to create it")]
    ConsentRequired { path: PathBuf },
    #[error("credential file {path} could not be read")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("credential file {path} is malformed")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("token refresh request failed")]
    Refresh {
        #[source]
        source: BoxError,
    },
    #[error("token refresh rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("cached token expired and carries no refresh token")]
    NoRefreshToken,
}

/// Any failure of a transfer run.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// A folder failed while the run was configured to abort on the first failure.
    #[error("transfer of folder {folder} failed")]
    Folder {
        folder: String,
        #[source]
        source: Box<TransferError>,
    },
}

impl TransferError {
    /// Errors that end the run regardless of failure policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::Auth(_)
                | TransferError::Listing(_)
                | TransferError::Upload(UploadError::Auth { .. })
                | TransferError::Folder { .. }
        )
    }
}
