/*!
Writing snapshots to disk.

The persister encodes a snapshot, takes a backup of the current canonical
file, and replaces the canonical file atomically. Only a successful write
updates the save-file's last-saved state.
*/

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tracing::{info, warn};

use crate::backup;
use crate::codec::SnapshotCodec;
use crate::registry::SaveFile;
use crate::storage::StorageAdapter;
use crate::{Result, Snapshot};

/// Atomic snapshot writer with backup rotation
pub struct Persister<S: StorageAdapter> {
    storage: Arc<S>,
    codec: Arc<dyn SnapshotCodec>,
}

impl<S: StorageAdapter> Persister<S> {
    pub fn new(storage: Arc<S>, codec: Arc<dyn SnapshotCodec>) -> Self {
        Self { storage, codec }
    }

    /// Persist `snapshot` as the new content of `file`
    ///
    /// This method:
    /// 1. Encodes the snapshot with the configured codec
    /// 2. Backs up the existing canonical file per the file's backup mode
    /// 3. Writes the encoded snapshot through the storage adapter's atomic write
    /// 4. Records the snapshot and `now` as the file's last save
    ///
    /// # Errors
    /// * `AutosaveError::Format` - If encoding fails
    /// * `AutosaveError::Storage` - If the atomic write fails
    ///
    /// On error the file's last-saved state is unchanged. A failed backup is
    /// logged and does not stop the save.
    pub fn save(&self, file: &mut SaveFile, snapshot: Snapshot, now: Instant) -> Result<()> {
        let data = self.codec.encode(&snapshot)?;

        match backup::backup_existing(
            self.storage.as_ref(),
            file.name(),
            file.backup_mode(),
            &Local::now(),
        ) {
            Ok(Some(backup)) => tracing::debug!(file = %file.name(), backup = %backup, "backed up save file"),
            Ok(None) => {}
            Err(err) => warn!(file = %file.name(), error = %err, "backup failed, saving anyway"),
        }

        let canonical = file.canonical_name();
        self.storage.write_atomic(&data, &canonical)?;

        #[cfg(feature = "metrics")]
        crate::observability::record(|m| m.record_snapshot_size(data.len()));

        info!(
            file = %file.name(),
            entries = snapshot.len(),
            bytes = data.len(),
            "saved snapshot"
        );
        file.mark_saved(snapshot, now);
        Ok(())
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}
