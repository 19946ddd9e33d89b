/*!
Local filesystem storage adapter implementation.
*/

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::StorageAdapter;
use crate::{AutosaveError, Result};

/// Local filesystem storage adapter
///
/// Files live directly in one base directory. Atomic writes go through a
/// temporary file created in that same directory, so the final rename never
/// crosses a filesystem boundary.
///
/// # Example
/// ```rust
/// use autosave_core::storage::{LocalFileStorage, StorageAdapter};
///
/// let dir = tempfile::TempDir::new().unwrap();
/// let storage = LocalFileStorage::with_base_dir(dir.path());
/// storage.write_atomic(b"{}", "auto.softsav")?;
/// assert!(storage.exists("auto.softsav"));
/// # Ok::<(), autosave_core::AutosaveError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
}

impl LocalFileStorage {
    /// Create a storage adapter rooted at `base_dir`
    ///
    /// The directory is not created; the engine validates it at startup.
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve the full path for a given file name
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    /// Write `data` to a synced temporary file next to `path`
    ///
    /// The returned file is removed when dropped unless passed to
    /// [`commit`](Self::commit).
    pub fn stage(&self, data: &[u8], path: &str) -> Result<NamedTempFile> {
        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{path}."))
            .suffix(".tmp")
            .tempfile_in(&self.base_dir)
            .map_err(|e| {
                AutosaveError::storage(format!(
                    "Failed to create temporary file in {}: {}",
                    self.base_dir.display(),
                    e
                ))
            })?;

        staged
            .write_all(data)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| {
                AutosaveError::storage(format!(
                    "Failed to write temporary file {}: {}",
                    staged.path().display(),
                    e
                ))
            })?;
        Ok(staged)
    }

    /// Rename a staged file onto `path` in one step
    pub fn commit(&self, staged: NamedTempFile, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        staged.persist(&full_path).map_err(|e| {
            AutosaveError::storage(format!(
                "Failed to rename temporary file onto {}: {}",
                full_path.display(),
                e.error
            ))
        })?;
        self.sync_dir();
        Ok(())
    }

    /// Flush the directory entry so the rename survives a crash
    #[cfg(unix)]
    fn sync_dir(&self) {
        if let Err(e) = fs::File::open(&self.base_dir).and_then(|dir| dir.sync_all()) {
            tracing::debug!(dir = %self.base_dir.display(), error = %e, "directory sync failed");
        }
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) {}
}

impl StorageAdapter for LocalFileStorage {
    fn write_atomic(&self, data: &[u8], path: &str) -> Result<()> {
        let staged = self.stage(data, path)?;
        self.commit(staged, path)
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);

        fs::read(&full_path).map_err(|e| {
            AutosaveError::storage(format!(
                "Failed to read save file {}: {}",
                full_path.display(),
                e
            ))
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path(path).is_file()
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.resolve_path(from);
        let to_path = self.resolve_path(to);

        fs::copy(&from_path, &to_path).map_err(|e| {
            AutosaveError::storage(format!(
                "Failed to copy {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);

        if full_path.exists() {
            fs::remove_file(&full_path).map_err(|e| {
                AutosaveError::storage(format!(
                    "Failed to delete {}: {}",
                    full_path.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.base_dir).map_err(|e| {
            AutosaveError::storage(format!(
                "Failed to list {}: {}",
                self.base_dir.display(),
                e
            ))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
