//! Directory-backed object store

use super::object::{ObjectPath, ObjectStore};
use crate::error::{Result, StageError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Object store rooted at a local directory
///
/// `bucket/key` maps to `<root>/bucket/key`. Objects are written to a
/// temporary file in the target directory and renamed into place, so a
/// failed write never leaves a partial object behind.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of an object
    pub fn file_path(&self, path: &ObjectPath) -> PathBuf {
        let mut file = self.root.join(path.bucket());
        for part in path.key().split('/') {
            file.push(part);
        }
        file
    }

    fn write_atomic(&self, path: &ObjectPath, bytes: &[u8]) -> std::io::Result<()> {
        let target = self.file_path(path);
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &ObjectPath, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        log::debug!(
            "Writing {} bytes ({}) to {}",
            bytes.len(),
            content_type,
            self.file_path(path).display()
        );
        self.write_atomic(path, &bytes)
            .map_err(|e| StageError::write_failure(path, e))
    }

    async fn get(&self, path: &ObjectPath) -> Result<Vec<u8>> {
        std::fs::read(self.file_path(path)).map_err(|e| StageError::source_unreadable(path, e))
    }
}
