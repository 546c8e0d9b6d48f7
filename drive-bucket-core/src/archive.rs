//! Archive builder: stages one remote folder on disk and zips it.
//!
//! A build owns a [`StagingTree`] for its whole duration. The tree is a
//! [`tempfile::TempDir`], so it is removed recursively on every exit path, including
//! early returns through `?` when a download fails.
//!
//! Layout of a staging tree:
//!
//! ```text
//! <staging root>/
//!   <folder name>/
//!     <file name>
//!     <file name (2)>   same-named remote files are kept apart
//! ```

use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::contract::{ProgressObserver, RemoteEntry, RemoteStore, SessionProvider};
use crate::error::{ArchiveError, TransferResult};
use crate::fetch::fetch_file;
use crate::listing::list_child_files;

const STAGING_PREFIX: &str = "drive-bucket-";

/// Make a remote name safe to use as a single path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// First free path for `file_name` in `dir`: `name.ext`, then `name (2).ext`, ...
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()));
    (2u32..)
        .map(|n| dir.join(format!("{stem} ({n}){}", extension.as_deref().unwrap_or(""))))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Exclusively owned temporary directory for one folder build.
#[derive(Debug)]
pub struct StagingTree {
    dir: TempDir,
}

impl StagingTree {
    /// Create a fresh tree under `parent`, or under the OS temp dir.
    pub fn create(parent: Option<&Path>) -> Result<Self, ArchiveError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|source| ArchiveError::Io {
            operation: "create staging tree",
            path: parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;
        debug!(path = %dir.path().display(), "Created staging tree");
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Directory holding the staged files of `folder_name`, created on demand.
    pub fn folder_dir(&self, folder_name: &str) -> Result<PathBuf, ArchiveError> {
        let path = self.root().join(sanitize_component(folder_name));
        std::fs::create_dir_all(&path).map_err(|source| ArchiveError::Io {
            operation: "create folder dir",
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// One file materialised inside a staging tree.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub entry: RemoteEntry,
    pub path: PathBuf,
    /// Path relative to the staging root, `/`-separated.
    pub relative_path: String,
    pub bytes: u64,
}

/// A finished zip, staged in an anonymous temporary file positioned at its start.
#[derive(Debug)]
pub struct Archive {
    file: File,
    entries: Vec<String>,
    size: u64,
}

impl Archive {
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

fn relative_name(root: &Path, path: &Path) -> Result<String, ArchiveError> {
    let relative = path.strip_prefix(root).map_err(|e| ArchiveError::Io {
        operation: "relativise staged path",
        path: path.to_path_buf(),
        source: io::Error::other(e),
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Write every regular file under `root` into a deflate zip written to `out`.
///
/// Entries are named by their path relative to `root` and visited in file-name order.
pub fn write_zip(root: &Path, out: File) -> Result<Archive, ArchiveError> {
    let mut zip = ZipWriter::new(out);
    let mut entries = Vec::new();

    for item in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let item = item.map_err(|source| ArchiveError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !item.file_type().is_file() {
            continue;
        }
        let name = relative_name(root, item.path())?;
        let io_err = |operation, source| ArchiveError::Io {
            operation,
            path: item.path().to_path_buf(),
            source,
        };
        let mut source = File::open(item.path()).map_err(|e| io_err("open staged file", e))?;
        let len = source
            .metadata()
            .map_err(|e| io_err("stat staged file", e))?
            .len();
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(len >= u64::from(u32::MAX));
        zip.start_file(name.as_str(), options)
            .map_err(|source| ArchiveError::Zip {
                entry: name.clone(),
                source,
            })?;
        io::copy(&mut source, &mut zip).map_err(|e| io_err("compress staged file", e))?;
        debug!(entry = %name, bytes = len, "Added archive entry");
        entries.push(name);
    }

    let mut file = zip.finish().map_err(|source| ArchiveError::Zip {
        entry: "<central directory>".to_string(),
        source,
    })?;
    let seek_err = |source| ArchiveError::Io {
        operation: "rewind archive",
        path: root.to_path_buf(),
        source,
    };
    let size = file.seek(SeekFrom::End(0)).map_err(seek_err)?;
    file.seek(SeekFrom::Start(0)).map_err(seek_err)?;

    Ok(Archive {
        file,
        entries,
        size,
    })
}

/// Builds per-folder archives from a remote store.
///
/// A session is requested from the provider before every remote call, so a folder whose
/// downloads outlive one access token keeps working.
pub struct ArchiveBuilder<'a, S: ?Sized, A: ?Sized> {
    store: &'a S,
    sessions: &'a A,
    observer: &'a dyn ProgressObserver,
    staging_parent: Option<PathBuf>,
}

impl<'a, S, A> ArchiveBuilder<'a, S, A>
where
    S: RemoteStore + ?Sized,
    A: SessionProvider + ?Sized,
{
    pub fn new(store: &'a S, sessions: &'a A, observer: &'a dyn ProgressObserver) -> Self {
        Self {
            store,
            sessions,
            observer,
            staging_parent: None,
        }
    }

    /// Stage under `parent` instead of the OS temp dir.
    pub fn staging_in(mut self, parent: Option<PathBuf>) -> Self {
        self.staging_parent = parent;
        self
    }

    pub fn new_staging_tree(&self) -> Result<StagingTree, ArchiveError> {
        StagingTree::create(self.staging_parent.as_deref())
    }

    /// Download every file directly inside `folder` into `staging`, in listing order.
    pub async fn stage_folder(
        &self,
        staging: &StagingTree,
        folder: &RemoteEntry,
    ) -> TransferResult<Vec<StagedFile>> {
        let session = self.sessions.session().await?;
        let files = list_child_files(self.store, &session, &folder.id, None).await?;
        let dir = staging.folder_dir(&folder.name)?;
        info!(folder = %folder.name, files = files.len(), "Staging folder");

        let mut staged = Vec::with_capacity(files.len());
        for entry in files {
            let path = unique_path(&dir, &sanitize_component(&entry.name));
            let mut sink =
                tokio::fs::File::create(&path)
                    .await
                    .map_err(|source| ArchiveError::Io {
                        operation: "create staged file",
                        path: path.clone(),
                        source,
                    })?;
            let session = self.sessions.session().await?;
            let bytes = fetch_file(self.store, &session, &entry, &mut sink, &path, self.observer)
                .await?;
            let relative_path = relative_name(staging.root(), &path)?;
            staged.push(StagedFile {
                entry,
                path,
                relative_path,
                bytes,
            });
        }
        Ok(staged)
    }

    /// Produce the archive for one folder. The staging tree is gone when this returns.
    pub async fn build(&self, folder: &RemoteEntry) -> TransferResult<Archive> {
        let staging = self.new_staging_tree()?;
        let staged = self.stage_folder(&staging, folder).await?;

        let out = match self.staging_parent.as_deref() {
            Some(parent) => tempfile::tempfile_in(parent),
            None => tempfile::tempfile(),
        }
        .map_err(|source| ArchiveError::Io {
            operation: "create archive file",
            path: staging.root().to_path_buf(),
            source,
        })?;

        let root = staging.root().to_path_buf();
        let archive = tokio::task::spawn_blocking(move || write_zip(&root, out))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))??;

        info!(
            folder = %folder.name,
            staged = staged.len(),
            entries = archive.entries().len(),
            bytes = archive.size(),
            "Built folder archive"
        );
        Ok(archive)
    }
}
