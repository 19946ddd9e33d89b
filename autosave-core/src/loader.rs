/*!
Restoring saved values.

Loading backs up the canonical file, decodes it as a whole, and then applies
each entry through its accessor. Entries are isolated from each other: an
unknown key or a rejected value is reported and the remaining entries are
still applied.
*/

use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use crate::backup;
use crate::codec::SnapshotCodec;
use crate::error::AccessorError;
use crate::registry::SaveFile;
use crate::storage::StorageAdapter;
use crate::{AutosaveError, Result};

/// Per-key results of applying one save file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Keys whose values were applied
    pub applied: Vec<String>,
    /// Keys present on disk with no registered accessor
    pub unknown_keys: Vec<String>,
    /// Keys whose accessor rejected the value
    pub failed: Vec<(String, AccessorError)>,
    /// Backup taken before loading
    pub backup: Option<String>,
}

impl LoadReport {
    /// True when every entry on disk was applied
    pub fn is_clean(&self) -> bool {
        self.unknown_keys.is_empty() && self.failed.is_empty()
    }
}

/// Result of loading one save-file
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// No canonical file exists yet
    NothingToLoad,
    /// The file was decoded and applied
    Loaded(LoadReport),
}

/// Snapshot reader that applies values through accessors
pub struct Loader<S: StorageAdapter> {
    storage: Arc<S>,
    codec: Arc<dyn SnapshotCodec>,
}

impl<S: StorageAdapter> Loader<S> {
    pub fn new(storage: Arc<S>, codec: Arc<dyn SnapshotCodec>) -> Self {
        Self { storage, codec }
    }

    /// Restore `file` from its canonical save file
    ///
    /// # Errors
    /// * `AutosaveError::Storage` - If the file exists but cannot be read
    /// * `AutosaveError::Format` - If the file cannot be decoded; nothing is applied
    ///
    /// Unknown keys and accessor failures are not errors; they are logged
    /// and listed in the returned report. The file's last-saved state is
    /// not touched.
    pub fn load(&self, file: &SaveFile) -> Result<LoadOutcome> {
        let canonical = file.canonical_name();
        if !self.storage.exists(&canonical) {
            info!(file = %file.name(), path = %canonical, "no save file, nothing to load");
            return Ok(LoadOutcome::NothingToLoad);
        }

        let mut report = LoadReport::default();
        match backup::backup_existing(
            self.storage.as_ref(),
            file.name(),
            file.backup_mode(),
            &Local::now(),
        ) {
            Ok(taken) => report.backup = taken,
            Err(err) => warn!(file = %file.name(), error = %err, "backup before load failed"),
        }

        let data = self.storage.load(&canonical)?;
        let snapshot = self.codec.decode(&data)?;

        for (key, value) in snapshot.into_entries() {
            let Some(accessor) = file.accessor(&key) else {
                let err = AutosaveError::UnknownKey(key.clone());
                warn!(file = %file.name(), error = %err, "skipping entry");
                report.unknown_keys.push(key);
                continue;
            };
            match accessor.set(value) {
                Ok(()) => report.applied.push(key),
                Err(err) => {
                    let logged = AutosaveError::accessor(key.as_str(), err.clone());
                    warn!(file = %file.name(), error = %logged, "failed to restore value");
                    #[cfg(feature = "metrics")]
                    crate::observability::record(|m| m.record_load_key_failure());
                    report.failed.push((key, err));
                }
            }
        }

        info!(
            file = %file.name(),
            applied = report.applied.len(),
            unknown = report.unknown_keys.len(),
            failed = report.failed.len(),
            "loaded save file"
        );
        Ok(LoadOutcome::Loaded(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{MockAccessor, SharedValue};
    use crate::codec::JsonCodec;
    use crate::config::{BackupMode, SaveFileConfig};
    use crate::registry::Registry;
    use crate::storage::LocalFileStorage;
    use crate::{AutosaveConfig, Value};
    use mockall::predicate::eq;
    use tempfile::TempDir;

    fn loader(dir: &TempDir) -> Loader<LocalFileStorage> {
        Loader::new(
            Arc::new(LocalFileStorage::with_base_dir(dir.path())),
            Arc::new(JsonCodec::new()),
        )
    }

    fn registry(dir: &TempDir, mode: BackupMode) -> Registry {
        let config = AutosaveConfig::new(dir.path())
            .with_file(SaveFileConfig::new("auto").with_backup_mode(mode));
        Registry::new(config).unwrap()
    }

    #[test]
    fn test_missing_file_is_nothing_to_load() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, BackupMode::Timestamped);

        let outcome = loader(&dir).load(registry.file("auto").unwrap()).unwrap();
        assert_eq!(outcome, LoadOutcome::NothingToLoad);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unknown_key_is_isolated() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir, BackupMode::None);
        let a = SharedValue::new(0);
        let b = SharedValue::new(0);
        registry.add_accessor(None, "a", a.clone()).unwrap();
        registry.add_accessor(None, "b", b.clone()).unwrap();
        std::fs::write(
            dir.path().join("auto.softsav"),
            r#"{"a": 1, "b": 2, "ghost": 3}"#,
        )
        .unwrap();

        let outcome = loader(&dir).load(registry.file("auto").unwrap()).unwrap();
        let LoadOutcome::Loaded(report) = outcome else {
            panic!("expected a load");
        };

        assert_eq!(a.load().unwrap(), Value::Int(1));
        assert_eq!(b.load().unwrap(), Value::Int(2));
        assert_eq!(report.applied, vec!["a", "b"]);
        assert_eq!(report.unknown_keys, vec!["ghost"]);
        assert!(report.failed.is_empty());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_rejected_value_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir, BackupMode::None);

        let mut strict = MockAccessor::new();
        strict
            .expect_set()
            .with(eq(Value::from("fast")))
            .times(1)
            .returning(|_| Err(AccessorError::Rejected("read-only".to_string())));
        let mut speed = MockAccessor::new();
        speed
            .expect_set()
            .with(eq(Value::Float(1.5)))
            .times(1)
            .returning(|_| Ok(()));

        registry.add_accessor(None, "mode", strict).unwrap();
        registry.add_accessor(None, "speed", speed).unwrap();
        std::fs::write(
            dir.path().join("auto.softsav"),
            r#"{"mode": "fast", "speed": 1.5}"#,
        )
        .unwrap();

        let LoadOutcome::Loaded(report) = loader(&dir).load(registry.file("auto").unwrap()).unwrap()
        else {
            panic!("expected a load");
        };
        assert_eq!(report.applied, vec!["speed"]);
        assert_eq!(
            report.failed,
            vec![(
                "mode".to_string(),
                AccessorError::Rejected("read-only".to_string())
            )]
        );
    }

    #[test]
    fn test_format_error_applies_nothing() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir, BackupMode::None);

        let mut never = MockAccessor::new();
        never.expect_set().times(0);
        registry.add_accessor(None, "a", never).unwrap();
        std::fs::write(dir.path().join("auto.softsav"), r#"{"a": 1, "b": "#).unwrap();

        let result = loader(&dir).load(registry.file("auto").unwrap());
        assert!(matches!(result, Err(AutosaveError::Format(_))));
    }

    #[test]
    fn test_load_takes_backup_first() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, BackupMode::SingleRotating);
        std::fs::write(dir.path().join("auto.softsav"), r#"{"a": 1}"#).unwrap();

        let LoadOutcome::Loaded(report) = loader(&dir).load(registry.file("auto").unwrap()).unwrap()
        else {
            panic!("expected a load");
        };
        assert_eq!(report.backup.as_deref(), Some("auto.softsavB"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("auto.softsavB")).unwrap(),
            r#"{"a": 1}"#
        );
        assert_eq!(report.unknown_keys, vec!["a"]);
    }

    #[test]
    fn test_load_leaves_last_saved_state_alone() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir, BackupMode::None);
        registry.add_accessor(None, "a", SharedValue::new(0)).unwrap();
        std::fs::write(dir.path().join("auto.softsav"), r#"{"a": 7}"#).unwrap();

        let file = registry.file("auto").unwrap();
        loader(&dir).load(file).unwrap();
        assert!(file.last_saved_snapshot().is_none());
        assert!(file.last_saved_time().is_none());
    }
}
