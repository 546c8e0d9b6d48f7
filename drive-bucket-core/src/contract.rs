//! # contract: data model and collaborator traits
//!
//! The pipeline talks to the outside world only through the traits in this module:
//!
//! - [`SessionProvider`] hands out an authenticated [`Session`] for the remote store.
//! - [`RemoteStore`] lists entries by [`ListQuery`] and streams file media.
//! - [`ArchiveUploader`] writes a finished object to the bucket.
//! - [`ProgressObserver`] receives per-file download progress.
//!
//! The binary crate implements the first three against Drive, OAuth and GCS. Tests use
//! the `mockall` mocks generated here (exported behind the `test-export-mocks` feature)
//! or in-memory fakes.

use std::fmt;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, FetchError, ListingError, UploadError};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Content type of uploaded archives.
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// One node of the remote file tree. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Stable handle used for fetch calls.
    pub id: String,
    /// Display name; used for filtering and as the archive path component.
    pub name: String,
    pub is_folder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Set when the store converts the file on download (native documents); the
    /// downloaded bytes have this MIME type instead of `mime_type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_mime_type: Option<String>,
}

impl RemoteEntry {
    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder: true,
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            size: None,
            export_mime_type: None,
        }
    }

    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder: false,
            mime_type: None,
            size: None,
            export_mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn exported_as(mut self, mime_type: impl Into<String>) -> Self {
        self.export_mime_type = Some(mime_type.into());
        self
    }
}

/// Kind filter for listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    File,
}

/// A single listing predicate. A [`ListQuery`] is the conjunction of its predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    InParent(String),
    Kind(EntryKind),
    NameContains(String),
}

/// Parameterized listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub predicates: Vec<Predicate>,
    /// Include items living in shared/team drives, not only the personal drive.
    pub include_all_drives: bool,
}

impl ListQuery {
    /// Children of `parent_id` of the given kind, across all drives.
    pub fn children(parent_id: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            predicates: vec![Predicate::InParent(parent_id.into()), Predicate::Kind(kind)],
            include_all_drives: true,
        }
    }

    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.predicates.push(Predicate::NameContains(needle.into()));
        self
    }

    pub fn parent(&self) -> Option<&str> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::InParent(id) => Some(id.as_str()),
            _ => None,
        })
    }

    /// Evaluate every predicate except parent membership, which needs tree context
    /// the entry does not carry.
    pub fn matches(&self, entry: &RemoteEntry) -> bool {
        self.predicates.iter().all(|p| match p {
            Predicate::InParent(_) => true,
            Predicate::Kind(EntryKind::Folder) => entry.is_folder,
            Predicate::Kind(EntryKind::File) => !entry.is_folder,
            Predicate::NameContains(needle) => entry.name.contains(needle.as_str()),
        })
    }
}

/// An authenticated session for the remote store.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    access_token: String,
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Stream of downloaded chunks.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, FetchError>>;

/// An in-flight media download: bounded chunks plus the announced total size.
pub struct MediaDownload {
    pub total_size: Option<u64>,
    pub chunks: ChunkStream,
}

impl MediaDownload {
    pub fn new(total_size: Option<u64>, chunks: ChunkStream) -> Self {
        Self { total_size, chunks }
    }

    /// Build a download from pre-computed chunk results.
    pub fn from_chunks(total_size: Option<u64>, chunks: Vec<Result<Vec<u8>, FetchError>>) -> Self {
        Self::new(total_size, stream::iter(chunks).boxed())
    }
}

impl fmt::Debug for MediaDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaDownload")
            .field("total_size", &self.total_size)
            .finish_non_exhaustive()
    }
}

/// One object to write to the bucket. The body is a staged file positioned at its start.
#[derive(Debug)]
pub struct UploadRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub body: std::fs::File,
    pub size: u64,
    /// When false the uploader must refuse to replace an existing object.
    pub overwrite: bool,
}

/// The stored object as acknowledged by the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedObject {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    #[serde(default)]
    pub generation: Option<String>,
}

/// Provides a valid session, refreshing cached credentials as needed.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session(&self) -> Result<Session, AuthError>;
}

/// The remote file-storage service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List all entries matching `query`, following pagination to the end.
    async fn list(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> Result<Vec<RemoteEntry>, ListingError>;

    /// Start a streamed download of one file's bytes, converted to
    /// `entry.export_mime_type` when that is set.
    async fn open_media(
        &self,
        session: &Session,
        entry: &RemoteEntry,
    ) -> Result<MediaDownload, FetchError>;
}

/// The object-storage bucket.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArchiveUploader: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadedObject, UploadError>;
}

/// Receives download progress. Percentages are cumulative and never decrease for one file.
pub trait ProgressObserver: Send + Sync {
    fn file_started(&self, _entry: &RemoteEntry) {}

    fn progress(&self, entry: &RemoteEntry, percent: u8);

    fn file_finished(&self, _entry: &RemoteEntry, _bytes: u64) {}
}

/// Observer that ignores all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn progress(&self, _entry: &RemoteEntry, _percent: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_kind_and_name() {
        let query = ListQuery::children("root", EntryKind::File).name_contains("mp4");
        assert!(query.matches(&RemoteEntry::file("1", "clip.mp4")));
        assert!(!query.matches(&RemoteEntry::file("2", "notes.txt")));
        assert!(!query.matches(&RemoteEntry::folder("3", "mp4s")));
        assert_eq!(query.parent(), Some("root"));
    }

    #[test]
    fn session_debug_redacts_token() {
        let rendered = format!("{:?}", Session::new("ya29.secret"));
        assert!(!rendered.contains("secret"));
    }
}
