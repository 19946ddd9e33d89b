/*!
Save-files and the registry that groups them.

The registry is an ordinary value owned by the application. It is filled in
during configuration (save-files first, then accessors) and then handed to
the engine; two registries never share state.
*/

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use crate::accessor::{accessor_for, Accessor, Variable, VALUE_FIELD};
use crate::backup;
use crate::config::{AutosaveConfig, BackupMode, SaveFileConfig, DEFAULT_FILENAME};
use crate::{AutosaveError, Result, Snapshot};

/// A named group of accessors saved together to one file.
pub struct SaveFile {
    config: SaveFileConfig,
    accessors: BTreeMap<String, Box<dyn Accessor>>,
    last_saved_snapshot: Option<Snapshot>,
    last_saved_time: Option<Instant>,
}

impl SaveFile {
    pub fn new(config: SaveFileConfig) -> Self {
        Self {
            config,
            accessors: BTreeMap::new(),
            last_saved_snapshot: None,
            last_saved_time: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SaveFileConfig {
        &self.config
    }

    pub fn backup_mode(&self) -> BackupMode {
        self.config.backup_mode
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// File name of the canonical save file
    pub fn canonical_name(&self) -> String {
        backup::canonical_name(&self.config.name)
    }

    pub fn accessor(&self, key: &str) -> Option<&dyn Accessor> {
        self.accessors.get(key).map(|a| a.as_ref())
    }

    pub fn accessor_names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    pub fn accessor_count(&self) -> usize {
        self.accessors.len()
    }

    /// Last snapshot durably written, `None` if never saved
    pub fn last_saved_snapshot(&self) -> Option<&Snapshot> {
        self.last_saved_snapshot.as_ref()
    }

    /// When the last successful save happened, `None` if never saved
    pub fn last_saved_time(&self) -> Option<Instant> {
        self.last_saved_time
    }

    /// Whether the save period has elapsed since the last save.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_saved_time {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.config.period(),
        }
    }

    /// Read every accessor into a fresh snapshot.
    ///
    /// Accessors whose `get` fails are logged and left out of the snapshot.
    pub fn read_snapshot(&self) -> Snapshot {
        self.accessors
            .iter()
            .filter_map(|(key, accessor)| match accessor.get() {
                Ok(value) => Some((key.as_str(), value)),
                Err(err) => {
                    let err = AutosaveError::accessor(key.as_str(), err);
                    warn!(file = %self.config.name, error = %err, "leaving value out of snapshot");
                    None
                }
            })
            .collect()
    }

    pub(crate) fn insert_accessor(&mut self, key: String, accessor: Box<dyn Accessor>) -> Result<()> {
        if self.accessors.contains_key(&key) {
            return Err(AutosaveError::config(format!(
                "accessor '{}' is already registered in save-file '{}'",
                key, self.config.name
            )));
        }
        self.accessors.insert(key, accessor);
        Ok(())
    }

    pub(crate) fn mark_saved(&mut self, snapshot: Snapshot, now: Instant) {
        self.last_saved_snapshot = Some(snapshot);
        self.last_saved_time = Some(now);
    }
}

impl std::fmt::Debug for SaveFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveFile")
            .field("config", &self.config)
            .field("accessors", &self.accessors.keys().collect::<Vec<_>>())
            .field("last_saved_snapshot", &self.last_saved_snapshot)
            .field("last_saved_time", &self.last_saved_time)
            .finish()
    }
}

/// Save-files by name plus the engine-wide configuration.
///
/// # Example
/// ```rust
/// use autosave_core::{AutosaveConfig, Registry, SaveFileConfig, SharedValue};
///
/// let dir = tempfile::TempDir::new().unwrap();
/// let config = AutosaveConfig::new(dir.path()).with_file(SaveFileConfig::new("auto"));
/// let mut registry = Registry::new(config)?;
///
/// let setpoint = SharedValue::new(5);
/// registry.add_accessor(None, "setpoint", setpoint.clone())?;
/// assert_eq!(registry.file("auto").unwrap().accessor_count(), 1);
/// # Ok::<(), autosave_core::AutosaveError>(())
/// ```
#[derive(Debug)]
pub struct Registry {
    config: AutosaveConfig,
    files: BTreeMap<String, SaveFile>,
}

impl Registry {
    /// Validate `config` and create a save-file for each configured entry.
    ///
    /// The stored configuration keeps the global settings; save-file
    /// settings move into the individual [`SaveFile`]s.
    pub fn new(mut config: AutosaveConfig) -> Result<Self> {
        config.validate()?;
        let files = std::mem::take(&mut config.files)
            .into_iter()
            .map(|file| (file.name.clone(), SaveFile::new(file)))
            .collect();
        Ok(Self { config, files })
    }

    pub fn config(&self) -> &AutosaveConfig {
        &self.config
    }

    /// Add a save-file after construction
    pub fn configure_file(&mut self, file: SaveFileConfig) -> Result<()> {
        file.validate()?;
        if self.files.contains_key(&file.name) {
            return Err(AutosaveError::config(format!(
                "duplicate save-file name '{}'",
                file.name
            )));
        }
        self.files.insert(file.name.clone(), SaveFile::new(file));
        Ok(())
    }

    /// Register an accessor under `key` in save-file `file` (default `auto`)
    pub fn add_accessor<A>(&mut self, file: Option<&str>, key: &str, accessor: A) -> Result<()>
    where
        A: Accessor + 'static,
    {
        self.file_for_registration(file)?
            .insert_accessor(key.to_string(), Box::new(accessor))
    }

    /// Register a variable's value and fields in save-file `file`
    ///
    /// With `save_value` the whole value is saved under `name`. Each entry of
    /// `fields` is saved under `name.FIELD`, except `VAL` which is the whole
    /// value. All keys are checked before any is added.
    pub fn add_variable(
        &mut self,
        file: Option<&str>,
        name: &str,
        variable: Arc<dyn Variable>,
        save_value: bool,
        fields: &[&str],
    ) -> Result<()> {
        let save_file = self.file_for_registration(file)?;

        let mut planned: Vec<(String, Option<&str>)> = Vec::new();
        if save_value {
            planned.push((name.to_string(), None));
        }
        for field in fields {
            let key = if *field == VALUE_FIELD {
                name.to_string()
            } else {
                format!("{name}.{field}")
            };
            planned.push((key, Some(*field)));
        }

        for (i, (key, _)) in planned.iter().enumerate() {
            let repeated = planned[..i].iter().any(|(k, _)| k == key);
            if repeated || save_file.accessors.contains_key(key) {
                return Err(AutosaveError::config(format!(
                    "accessor '{}' is already registered in save-file '{}'",
                    key,
                    save_file.name()
                )));
            }
        }

        for (key, field) in planned {
            let accessor = accessor_for(Arc::clone(&variable), field);
            save_file.insert_accessor(key, accessor)?;
        }
        Ok(())
    }

    fn file_for_registration(&mut self, file: Option<&str>) -> Result<&mut SaveFile> {
        let name = file.unwrap_or(DEFAULT_FILENAME);
        self.files.get_mut(name).ok_or_else(|| {
            AutosaveError::config(format!("save-file '{name}' has not been configured"))
        })
    }

    pub fn file(&self, name: &str) -> Option<&SaveFile> {
        self.files.get(name)
    }

    pub fn file_mut(&mut self, name: &str) -> Option<&mut SaveFile> {
        self.files.get_mut(name)
    }

    pub fn files(&self) -> impl Iterator<Item = &SaveFile> {
        self.files.values()
    }

    pub fn files_mut(&mut self) -> impl Iterator<Item = &mut SaveFile> {
        self.files.values_mut()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{MockAccessor, SharedValue};
    use crate::error::AccessorError;
    use crate::Value;
    use std::time::Duration;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> Registry {
        let config = AutosaveConfig::new(dir.path())
            .with_file(SaveFileConfig::new("auto"))
            .with_file(SaveFileConfig::new("tuning").with_period(Duration::from_secs(5)));
        Registry::new(config).unwrap()
    }

    #[test]
    fn test_registry_from_config() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        assert_eq!(registry.len(), 2);
        assert!(registry.config().files.is_empty());
        let names: Vec<&str> = registry.files().map(SaveFile::name).collect();
        assert_eq!(names, vec!["auto", "tuning"]);
        assert_eq!(registry.file("auto").unwrap().canonical_name(), "auto.softsav");
    }

    #[test]
    fn test_registry_rejects_invalid_directory() {
        let dir = TempDir::new().unwrap();
        let config = AutosaveConfig::new(dir.path().join("missing"));
        assert!(matches!(Registry::new(config), Err(AutosaveError::Config(_))));
    }

    #[test]
    fn test_configure_file_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        assert!(registry.configure_file(SaveFileConfig::new("extra")).is_ok());
        assert!(registry.configure_file(SaveFileConfig::new("auto")).is_err());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_add_accessor_default_file_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);

        registry.add_accessor(None, "x", SharedValue::new(5)).unwrap();
        registry.add_accessor(Some("tuning"), "x", SharedValue::new(1)).unwrap();
        let err = registry.add_accessor(None, "x", SharedValue::new(6)).unwrap_err();
        assert!(err.is_fatal());

        let err = registry
            .add_accessor(Some("nope"), "x", SharedValue::new(6))
            .unwrap_err();
        assert!(err.to_string().contains("has not been configured"));
    }

    #[test]
    fn test_add_variable_registers_value_and_fields() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        let motor: Arc<dyn Variable> = Arc::new(SharedValue::new(2.5));

        registry
            .add_variable(None, "motor", Arc::clone(&motor), true, &["HOPR", "LOPR"])
            .unwrap();

        let file = registry.file("auto").unwrap();
        let names: Vec<&str> = file.accessor_names().collect();
        assert_eq!(names, vec!["motor", "motor.HOPR", "motor.LOPR"]);
        assert_eq!(file.accessor("motor").unwrap().get().unwrap(), Value::Float(2.5));
    }

    #[test]
    fn test_add_variable_val_field_is_whole_value() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        let motor: Arc<dyn Variable> = Arc::new(SharedValue::new(1));

        registry
            .add_variable(Some("tuning"), "motor", Arc::clone(&motor), false, &["VAL"])
            .unwrap();
        let file = registry.file("tuning").unwrap();
        assert_eq!(file.accessor_names().collect::<Vec<_>>(), vec!["motor"]);

        // Value and VAL together name the same key; nothing is registered
        let err = registry
            .add_variable(None, "motor", motor, true, &["VAL", "EGU"])
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.file("auto").unwrap().accessor_count(), 0);
    }

    #[test]
    fn test_read_snapshot_omits_failed_reads() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);

        let mut broken = MockAccessor::new();
        broken
            .expect_get()
            .times(1)
            .returning(|| Err(AccessorError::Unavailable("disconnected".to_string())));
        registry.add_accessor(None, "broken", broken).unwrap();
        registry.add_accessor(None, "ok", SharedValue::new("on")).unwrap();

        let snapshot = registry.file("auto").unwrap().read_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("ok"), Some(&Value::from("on")));
        assert!(!snapshot.contains_key("broken"));
    }

    #[test]
    fn test_is_due() {
        let mut file = SaveFile::new(SaveFileConfig::new("auto").with_period(Duration::from_secs(30)));
        let start = Instant::now();
        assert!(file.is_due(start));

        file.mark_saved(Snapshot::new(), start);
        assert!(!file.is_due(start + Duration::from_secs(29)));
        assert!(file.is_due(start + Duration::from_secs(30)));
        assert_eq!(file.last_saved_time(), Some(start));
        assert_eq!(file.last_saved_snapshot(), Some(&Snapshot::new()));
    }
}
