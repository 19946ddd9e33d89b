/*!
Backup rotation for save files.

Before a canonical file is overwritten by a save, or read by a load, a copy
is taken according to the file's [`BackupMode`]:

- `SingleRotating`: `<name>.softsavB`, overwritten each time
- `Timestamped`: `<name>.softsav_<YYMMDD-HHMMSS>` in local time; a `.N`
  counter is appended when a backup for the same second already exists
- `None`: nothing
*/

use chrono::{DateTime, Local, NaiveDateTime};

use crate::config::{BackupMode, BACKUP_SUFFIX, PRIMARY_SUFFIX};
use crate::storage::StorageAdapter;
use crate::Result;

/// Format of the timestamp appended to timestamped backups
pub const TIMESTAMP_FORMAT: &str = "%y%m%d-%H%M%S";

/// Canonical file name of a save-file
pub fn canonical_name(save_name: &str) -> String {
    format!("{save_name}.{PRIMARY_SUFFIX}")
}

/// Single rotating backup name of a save-file
pub fn rotating_backup_name(save_name: &str) -> String {
    format!("{save_name}.{BACKUP_SUFFIX}")
}

/// Timestamped backup name of a save-file, without collision counter
pub fn timestamped_backup_name(save_name: &str, stamp: &DateTime<Local>) -> String {
    format!(
        "{}_{}",
        canonical_name(save_name),
        stamp.format(TIMESTAMP_FORMAT)
    )
}

/// Copy the existing canonical file according to `mode`
///
/// Returns the name of the backup written, or `None` when there was nothing to
/// back up or the mode takes no backups.
pub fn backup_existing<S: StorageAdapter + ?Sized>(
    storage: &S,
    save_name: &str,
    mode: BackupMode,
    stamp: &DateTime<Local>,
) -> Result<Option<String>> {
    let canonical = canonical_name(save_name);
    if mode == BackupMode::None || !storage.exists(&canonical) {
        return Ok(None);
    }

    let target = match mode {
        BackupMode::None => return Ok(None),
        BackupMode::SingleRotating => rotating_backup_name(save_name),
        BackupMode::Timestamped => {
            let base = timestamped_backup_name(save_name, stamp);
            let mut candidate = base.clone();
            let mut counter = 1u32;
            while storage.exists(&candidate) {
                candidate = format!("{base}.{counter}");
                counter += 1;
            }
            candidate
        }
    };

    storage.copy(&canonical, &target)?;
    Ok(Some(target))
}

/// A backup file found in the save directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// File name within the save directory
    pub file_name: String,
    /// Time parsed from a timestamped backup name; `None` for the rotating backup
    pub taken_at: Option<NaiveDateTime>,
    /// Collision counter of a timestamped backup
    pub sequence: u32,
}

impl BackupEntry {
    pub fn is_timestamped(&self) -> bool {
        self.taken_at.is_some()
    }
}

/// Parse a timestamped backup name of `save_name`
fn parse_timestamped(save_name: &str, file_name: &str) -> Option<(NaiveDateTime, u32)> {
    let rest = file_name.strip_prefix(&format!("{}_", canonical_name(save_name)))?;
    let (stamp, sequence) = match rest.split_once('.') {
        Some((stamp, counter)) => (stamp, counter.parse().ok()?),
        None => (rest, 0),
    };
    let taken_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((taken_at, sequence))
}

/// List the backups of `save_name`, oldest first, rotating backup last
pub fn list_backups<S: StorageAdapter + ?Sized>(
    storage: &S,
    save_name: &str,
) -> Result<Vec<BackupEntry>> {
    let rotating = rotating_backup_name(save_name);
    let mut timestamped = Vec::new();
    let mut has_rotating = false;

    for file_name in storage.list()? {
        if file_name == rotating {
            has_rotating = true;
        } else if let Some((taken_at, sequence)) = parse_timestamped(save_name, &file_name) {
            timestamped.push(BackupEntry {
                file_name,
                taken_at: Some(taken_at),
                sequence,
            });
        }
    }

    timestamped.sort_by(|a, b| (a.taken_at, a.sequence).cmp(&(b.taken_at, b.sequence)));
    if has_rotating {
        timestamped.push(BackupEntry {
            file_name: rotating,
            taken_at: None,
            sequence: 0,
        });
    }
    Ok(timestamped)
}

/// Delete all but the newest `keep` timestamped backups of `save_name`
///
/// The rotating backup is never pruned. Returns the deleted file names.
pub fn prune_backups<S: StorageAdapter + ?Sized>(
    storage: &S,
    save_name: &str,
    keep: usize,
) -> Result<Vec<String>> {
    let timestamped: Vec<BackupEntry> = list_backups(storage, save_name)?
        .into_iter()
        .filter(BackupEntry::is_timestamped)
        .collect();

    let excess = timestamped.len().saturating_sub(keep);
    let mut deleted = Vec::with_capacity(excess);
    for entry in timestamped.into_iter().take(excess) {
        storage.delete(&entry.file_name)?;
        tracing::debug!(file = %entry.file_name, "pruned backup");
        deleted.push(entry.file_name);
    }
    Ok(deleted)
}
