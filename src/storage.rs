//! Local persistence for the audit document.
//!
//! Documents live under a root directory at their relative path:
//!
//! ```text
//! <root>/<path>        # The document itself
//! <root>/<path>.lock   # Advisory lock held during compare-and-swap
//! ```
//!
//! The revision of a document is the hex SHA-256 of its content, so any
//! change by any writer produces a new revision.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::store::{self, Document, DocumentStore, StoreError};

/// How long a writer waits for another writer's lock.
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// File-based document store.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve a document path under the root, refusing anything that escapes it.
    fn resolve(&self, path: &str) -> store::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StoreError::NotFound(format!("invalid document path: {path}")));
        }
        Ok(self.root.join(relative))
    }
}

/// Content revision: hex SHA-256.
pub fn revision_of(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn io_error(path: &Path, e: &io::Error) -> StoreError {
    StoreError::Transport(format!("{}: {e}", path.display()))
}

impl DocumentStore for FsDocumentStore {
    fn read(&self, path: &str) -> store::Result<Document> {
        let file = self.resolve(path)?;
        match fs::read_to_string(&file) {
            Ok(content) => Ok(Document {
                revision: revision_of(&content),
                content,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(io_error(&file, &e)),
        }
    }

    fn write(&self, path: &str, content: &str, expected: Option<&str>) -> store::Result<String> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
        }

        let lock_path = file.with_file_name(format!(
            "{}.lock",
            file.file_name().unwrap_or_default().to_string_lossy()
        ));
        let lock = acquire(&lock_path)?;

        let current = match fs::read_to_string(&file) {
            Ok(existing) => Some(revision_of(&existing)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_error(&file, &e)),
        };
        if current.as_deref() != expected {
            let _ = lock.unlock();
            return Err(StoreError::Conflict(format!(
                "{path}: expected revision {}, found {}",
                expected.unwrap_or("none"),
                current.as_deref().unwrap_or("none"),
            )));
        }

        // Write beside the target, then rename over it.
        let tmp = file.with_file_name(format!(".{}.tmp", Uuid::new_v4().simple()));
        let result = fs::write(&tmp, content)
            .and_then(|()| fs::rename(&tmp, &file))
            .map_err(|e| io_error(&file, &e));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        let _ = lock.unlock();
        result.map(|()| revision_of(content))
    }
}

/// Take the exclusive lock, polling until [`LOCK_TIMEOUT`].
fn acquire(path: &Path) -> store::Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| io_error(path, &e))?;

    let start = Instant::now();
    loop {
        if file.try_lock_exclusive().is_ok() {
            return Ok(file);
        }
        if start.elapsed() >= LOCK_TIMEOUT {
            return Err(StoreError::Transport(format!(
                "{}: lock timed out after {LOCK_TIMEOUT:?}",
                path.display()
            )));
        }
        thread::sleep(Duration::from_millis(10));
    }
}
