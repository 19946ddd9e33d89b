/*!
Storage adapters for save files.

This module defines the storage abstraction (port) the persister and loader
work through, and the local filesystem implementation (adapter). Paths given
to an adapter are file names inside the adapter's base directory.
*/

pub mod local;

use crate::Result;

/// Storage abstraction for save files, backups and their listing
///
/// `write_atomic` is the only way the engine writes a canonical file: after
/// it returns, readers see either the complete previous content or the
/// complete new content, never a partial file.
pub trait StorageAdapter: Send + Sync {
    /// Atomically replace `path` with `data`
    ///
    /// # Arguments
    /// * `data` - The encoded snapshot
    /// * `path` - File name within the base directory
    fn write_atomic(&self, data: &[u8], path: &str) -> Result<()>;

    /// Load the content of `path`
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    /// Check whether `path` exists as a regular file
    fn exists(&self, path: &str) -> bool;

    /// Copy `from` to `to`, replacing `to` if it exists
    fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Delete `path`; deleting a missing file is not an error
    fn delete(&self, path: &str) -> Result<()>;

    /// File names in the base directory
    fn list(&self) -> Result<Vec<String>>;
}

pub use local::LocalFileStorage;
