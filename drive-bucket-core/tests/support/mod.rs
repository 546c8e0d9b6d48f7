#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drive_bucket_core::contract::{
    ListQuery, MediaDownload, ProgressObserver, RemoteEntry, RemoteStore, Session,
    SessionProvider,
};
use drive_bucket_core::error::{AuthError, FetchError, ListingError};

/// In-memory remote tree. Files are served in chunks of `chunk_size` bytes.
#[derive(Default)]
pub struct FakeDrive {
    children: Vec<(String, RemoteEntry)>,
    contents: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    chunk_size: usize,
    single_use_tokens: bool,
    used_tokens: Mutex<HashSet<String>>,
    listed_parents: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self {
            chunk_size: 2,
            ..Default::default()
        }
    }

    pub fn folder(&mut self, parent: &str, id: &str, name: &str) -> &mut Self {
        self.children
            .push((parent.to_string(), RemoteEntry::folder(id, name)));
        self
    }

    pub fn file(&mut self, parent: &str, id: &str, name: &str, bytes: &[u8]) -> &mut Self {
        self.children.push((
            parent.to_string(),
            RemoteEntry::file(id, name).with_size(bytes.len() as u64),
        ));
        self.contents.insert(id.to_string(), bytes.to_vec());
        self
    }

    pub fn typed_file(
        &mut self,
        parent: &str,
        id: &str,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> &mut Self {
        self.children.push((
            parent.to_string(),
            RemoteEntry::file(id, name)
                .with_size(bytes.len() as u64)
                .with_mime_type(mime_type),
        ));
        self.contents.insert(id.to_string(), bytes.to_vec());
        self
    }

    /// The download of `id` delivers one chunk and then fails.
    pub fn fail_download(&mut self, id: &str) -> &mut Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Reject any access token that was already presented once, like an expired one.
    pub fn single_use_tokens(&mut self) -> &mut Self {
        self.single_use_tokens = true;
        self
    }

    fn check_token(&self, session: &Session, file_id: &str) -> Result<(), FetchError> {
        if !self.single_use_tokens {
            return Ok(());
        }
        let fresh = self
            .used_tokens
            .lock()
            .unwrap()
            .insert(session.access_token().to_string());
        if fresh {
            Ok(())
        } else {
            Err(FetchError::Status {
                file_id: file_id.to_string(),
                status: 401,
                body: "expired".to_string(),
            })
        }
    }

    pub fn listed_parents(&self) -> Vec<String> {
        self.listed_parents.lock().unwrap().clone()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStore for FakeDrive {
    async fn list(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> Result<Vec<RemoteEntry>, ListingError> {
        self.check_token(session, "")
            .map_err(|_| ListingError::Status {
                status: 401,
                body: "expired".to_string(),
            })?;
        let parent = query.parent().unwrap_or_default().to_string();
        self.listed_parents.lock().unwrap().push(parent.clone());
        Ok(self
            .children
            .iter()
            .filter(|(p, entry)| *p == parent && query.matches(entry))
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn open_media(
        &self,
        session: &Session,
        entry: &RemoteEntry,
    ) -> Result<MediaDownload, FetchError> {
        let file_id = entry.id.as_str();
        self.check_token(session, file_id)?;
        self.fetched.lock().unwrap().push(file_id.to_string());
        let bytes = self
            .contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                file_id: file_id.to_string(),
                status: 404,
                body: "not found".to_string(),
            })?;
        let mut chunks: Vec<Result<Vec<u8>, FetchError>> = bytes
            .chunks(self.chunk_size.max(1))
            .map(|c| Ok(c.to_vec()))
            .collect();
        if self.failing.contains(file_id) {
            chunks.truncate(1);
            chunks.push(Err(FetchError::Transport {
                file_id: file_id.to_string(),
                source: "connection reset".into(),
            }));
        }
        Ok(MediaDownload::from_chunks(Some(bytes.len() as u64), chunks))
    }
}

/// Always hands out the same session.
pub struct StaticSession;

#[async_trait]
impl SessionProvider for StaticSession {
    async fn session(&self) -> Result<Session, AuthError> {
        Ok(Session::new("test-token"))
    }
}

/// Hands out a new token on every call: `token-1`, `token-2`, ...
#[derive(Default)]
pub struct RotatingSession {
    issued: Mutex<u32>,
}

impl RotatingSession {
    pub fn issued(&self) -> u32 {
        *self.issued.lock().unwrap()
    }
}

#[async_trait]
impl SessionProvider for RotatingSession {
    async fn session(&self) -> Result<Session, AuthError> {
        let mut issued = self.issued.lock().unwrap();
        *issued += 1;
        Ok(Session::new(format!("token-{}", *issued)))
    }
}

/// Records every progress callback.
#[derive(Default, Clone)]
pub struct RecordingProgress {
    pub events: Arc<Mutex<Vec<(String, u8)>>>,
}

impl ProgressObserver for RecordingProgress {
    fn progress(&self, entry: &RemoteEntry, percent: u8) {
        self.events
            .lock()
            .unwrap()
            .push((entry.name.clone(), percent));
    }
}

/// Read every entry of a zip into a name -> bytes map.
pub fn read_zip<R: std::io::Read + std::io::Seek>(reader: R) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(reader).expect("valid zip");
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).expect("zip entry");
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).expect("read zip entry");
        entries.insert(file.name().to_string(), bytes);
    }
    entries
}

/// Every path below `root`, sorted.
pub fn snapshot(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();
    paths
}
