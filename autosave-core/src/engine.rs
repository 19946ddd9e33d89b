/*!
The autosave engine: registry, persister and loader bound together.

[`Autosave`] offers synchronous operations (`load_all`, `tick`,
`flush_all`) and [`Autosave::start`] to hand itself to a background worker.
Loading requires the engine before it is started, so restored values can
never race with a periodic save.
*/

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::codec::{codec_for, SnapshotCodec};
use crate::differ;
use crate::loader::{LoadOutcome, Loader};
use crate::persister::Persister;
use crate::registry::{Registry, SaveFile};
use crate::storage::{LocalFileStorage, StorageAdapter};
use crate::worker::AutosaveHandle;
use crate::{AutosaveError, Result};

/// Autosave engine over a storage adapter
///
/// # Example
/// ```rust
/// use autosave_core::{Autosave, AutosaveConfig, Registry, SaveFileConfig, SharedValue};
///
/// let dir = tempfile::TempDir::new().unwrap();
/// let config = AutosaveConfig::new(dir.path()).with_file(SaveFileConfig::new("auto"));
/// let mut registry = Registry::new(config)?;
/// let setpoint = SharedValue::new(5);
/// registry.add_accessor(None, "setpoint", setpoint.clone())?;
///
/// let autosave = Autosave::new(registry)?;
/// autosave.load_all();
/// let handle = autosave.start()?;
/// setpoint.store(6).unwrap();
/// let autosave = handle.stop_and_wait()?;
/// assert!(autosave.registry().file("auto").unwrap().last_saved_time().is_some());
/// # Ok::<(), autosave_core::AutosaveError>(())
/// ```
pub struct Autosave<S: StorageAdapter = LocalFileStorage> {
    registry: Registry,
    persister: Persister<S>,
    loader: Loader<S>,
}

impl Autosave<LocalFileStorage> {
    /// Create an engine writing to the registry's configured directory
    pub fn new(registry: Registry) -> Result<Self> {
        let storage = LocalFileStorage::with_base_dir(&registry.config().directory);
        Self::with_storage(registry, storage)
    }
}

impl<S: StorageAdapter> Autosave<S> {
    /// Create an engine over a custom storage adapter
    pub fn with_storage(registry: Registry, storage: S) -> Result<Self> {
        registry.config().validate()?;
        let codec: Arc<dyn SnapshotCodec> = Arc::from(codec_for(registry.config().format));
        let storage = Arc::new(storage);
        Ok(Self {
            persister: Persister::new(Arc::clone(&storage), Arc::clone(&codec)),
            loader: Loader::new(storage, codec),
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable registry access for registrations made before `start`
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn storage(&self) -> &S {
        self.persister.storage()
    }

    pub fn is_enabled(&self) -> bool {
        self.registry.config().enabled
    }

    /// Load one save-file by name
    pub fn load(&self, name: &str) -> Result<LoadOutcome> {
        let file = self
            .registry
            .file(name)
            .ok_or_else(|| AutosaveError::config(format!("save-file '{name}' has not been configured")))?;
        self.loader.load(file)
    }

    /// Restore every enabled save-file
    ///
    /// Errors are logged per file and never abort the remaining files. The
    /// returned map holds the outcome for each file attempted.
    pub fn load_all(&self) -> BTreeMap<String, Result<LoadOutcome>> {
        let mut outcomes = BTreeMap::new();
        if !self.is_enabled() {
            debug!("autosave disabled, skipping load");
            return outcomes;
        }

        for file in self.registry.files().filter(|f| f.is_enabled()) {
            let outcome = self.loader.load(file);
            if let Err(err) = &outcome {
                error!(file = %file.name(), error = %err, "load abandoned");
            }
            outcomes.insert(file.name().to_string(), outcome);
        }
        outcomes
    }

    /// Run one periodic pass
    ///
    /// For every enabled file whose period has elapsed, read a fresh
    /// snapshot and save it if it differs from the last save. Returns the
    /// names of the files written.
    ///
    /// A file whose accessors panic is logged and skipped for this pass;
    /// the other files are still saved.
    pub fn tick(&mut self, now: Instant) -> Vec<String> {
        let mut saved = Vec::new();
        if !self.is_enabled() {
            return saved;
        }

        let persister = &self.persister;
        for file in self.registry.files_mut().filter(|f| f.is_enabled()) {
            if !file.is_due(now) {
                continue;
            }
            match save_pass(persister, file, now, true) {
                Pass::Saved => saved.push(file.name().to_string()),
                Pass::Unchanged => debug!(file = %file.name(), "unchanged, skipping save"),
                Pass::Failed(err) => {
                    warn!(file = %file.name(), error = %err, "save failed, will retry")
                }
            }
        }
        saved
    }

    /// Save every enabled file unconditionally
    ///
    /// Disabled files are included when `flush_disabled_on_shutdown` is set.
    /// Each file gets exactly one save attempt. Returns the names of the
    /// files written.
    pub fn flush_all(&mut self, now: Instant) -> Vec<String> {
        let mut saved = Vec::new();
        if !self.is_enabled() {
            return saved;
        }

        let include_disabled = self.registry.config().flush_disabled_on_shutdown;
        let persister = &self.persister;
        for file in self
            .registry
            .files_mut()
            .filter(|f| f.is_enabled() || include_disabled)
        {
            match save_pass(persister, file, now, false) {
                Pass::Saved => saved.push(file.name().to_string()),
                Pass::Unchanged => {}
                Pass::Failed(err) => error!(file = %file.name(), error = %err, "final save failed"),
            }
        }
        saved
    }
}

/// Result of one file's save pass
enum Pass {
    Saved,
    Unchanged,
    Failed(AutosaveError),
}

/// Read, compare and save one file
///
/// A panic raised while reading or saving is caught here and reported as a
/// failed pass, so it never reaches the worker loop.
fn save_pass<S: StorageAdapter>(
    persister: &Persister<S>,
    file: &mut SaveFile,
    now: Instant,
    only_if_changed: bool,
) -> Pass {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        let snapshot = file.read_snapshot();
        if only_if_changed && !differ::changed(&snapshot, file.last_saved_snapshot()) {
            return Ok(false);
        }
        persister.save(file, snapshot, now).map(|()| true)
    }));

    let pass = match attempt {
        Ok(Ok(true)) => Pass::Saved,
        Ok(Ok(false)) => Pass::Unchanged,
        Ok(Err(err)) => Pass::Failed(err),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(file = %file.name(), panic = %message, "save pass panicked");
            Pass::Failed(AutosaveError::Worker(format!("save pass panicked: {message}")))
        }
    };

    #[cfg(feature = "metrics")]
    crate::observability::record(|m| match &pass {
        Pass::Saved => m.record_save(),
        Pass::Unchanged => m.record_unchanged(),
        Pass::Failed(_) => m.record_save_failure(),
    });
    pass
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl<S: StorageAdapter + 'static> Autosave<S> {
    /// Move the engine onto its background worker
    ///
    /// The worker ticks every poll interval until stopped, then flushes all
    /// files and hands the engine back through
    /// [`AutosaveHandle::stop_and_wait`].
    pub fn start(self) -> Result<AutosaveHandle<S>> {
        AutosaveHandle::spawn(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{FnAccessor, SharedValue};
    use crate::backup::list_backups;
    use crate::config::{AutosaveConfig, BackupMode, SaveFileConfig};
    use crate::Value;
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine(dir: &TempDir, files: Vec<SaveFileConfig>) -> Autosave {
        let mut config = AutosaveConfig::new(dir.path());
        config.files = files;
        Autosave::new(Registry::new(config).unwrap()).unwrap()
    }

    fn read(dir: &TempDir, name: &str) -> serde_json::Value {
        let data = std::fs::read(dir.path().join(name)).unwrap();
        serde_yaml::from_slice(&data).unwrap()
    }

    #[test]
    fn test_tick_saves_then_skips_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut autosave = engine(&dir, vec![SaveFileConfig::new("auto")]);
        let x = SharedValue::new(5);
        autosave.registry_mut().add_accessor(None, "x", x.clone()).unwrap();

        let start = Instant::now();
        assert_eq!(autosave.tick(start), vec!["auto"]);

        // Not due yet
        x.store(6).unwrap();
        assert!(autosave.tick(start + Duration::from_secs(10)).is_empty());

        // Due and changed
        assert_eq!(autosave.tick(start + Duration::from_secs(30)), vec!["auto"]);
        assert_eq!(read(&dir, "auto.softsav"), serde_json::json!({"x": 6}));

        // Due but unchanged: no write
        let later = start + Duration::from_secs(120);
        assert!(autosave.tick(later).is_empty());
        let file = autosave.registry().file("auto").unwrap();
        assert_eq!(file.last_saved_time(), Some(start + Duration::from_secs(30)));
    }

    #[test]
    fn test_example_with_rotating_backup() {
        let dir = TempDir::new().unwrap();
        let mut autosave = engine(
            &dir,
            vec![SaveFileConfig::new("auto")
                .with_period(Duration::from_secs(30))
                .with_backup_mode(BackupMode::SingleRotating)],
        );
        let x = SharedValue::new(5);
        let y = SharedValue::new("on");
        autosave.registry_mut().add_accessor(None, "x", x.clone()).unwrap();
        autosave.registry_mut().add_accessor(None, "y", y).unwrap();

        let start = Instant::now();
        autosave.tick(start);
        assert_eq!(read(&dir, "auto.softsav"), serde_json::json!({"x": 5, "y": "on"}));

        x.store(6).unwrap();
        autosave.tick(start + Duration::from_secs(31));
        assert_eq!(read(&dir, "auto.softsav"), serde_json::json!({"x": 6, "y": "on"}));
        assert_eq!(read(&dir, "auto.softsavB"), serde_json::json!({"x": 5, "y": "on"}));
    }

    #[test]
    fn test_empty_file_is_written_once() {
        let dir = TempDir::new().unwrap();
        let mut autosave = engine(
            &dir,
            vec![SaveFileConfig::new("empty").with_period(Duration::from_secs(1))],
        );

        let start = Instant::now();
        assert_eq!(autosave.tick(start), vec!["empty"]);
        for i in 2..6 {
            assert!(autosave.tick(start + Duration::from_secs(i)).is_empty());
        }
        assert_eq!(read(&dir, "empty.softsav"), serde_json::json!({}));
    }

    #[test]
    fn test_disabled_files_skip_ticks_and_optionally_flush() {
        let dir = TempDir::new().unwrap();
        let config = AutosaveConfig::new(dir.path())
            .with_file(SaveFileConfig::new("on"))
            .with_file(SaveFileConfig::new("off").with_enabled(false));
        let mut autosave = Autosave::new(Registry::new(config.clone()).unwrap()).unwrap();
        assert_eq!(autosave.tick(Instant::now()), vec!["on"]);
        assert_eq!(autosave.flush_all(Instant::now()), vec!["on"]);
        assert!(!dir.path().join("off.softsav").exists());

        let config = config.with_flush_disabled_on_shutdown(true);
        let mut autosave = Autosave::new(Registry::new(config).unwrap()).unwrap();
        assert_eq!(autosave.flush_all(Instant::now()), vec!["off", "on"]);
        assert!(dir.path().join("off.softsav").exists());
    }

    #[test]
    fn test_flush_saves_unchanged_files() {
        let dir = TempDir::new().unwrap();
        let mut autosave = engine(&dir, vec![SaveFileConfig::new("auto")]);
        autosave
            .registry_mut()
            .add_accessor(None, "x", SharedValue::new(1))
            .unwrap();

        let start = Instant::now();
        autosave.tick(start);
        let flushed_at = start + Duration::from_secs(1);
        assert_eq!(autosave.flush_all(flushed_at), vec!["auto"]);
        assert_eq!(
            autosave.registry().file("auto").unwrap().last_saved_time(),
            Some(flushed_at)
        );
    }

    #[test]
    fn test_load_all_restores_enabled_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("auto.softsav"), r#"{"x": 9}"#).unwrap();
        std::fs::write(dir.path().join("broken.softsav"), "{").unwrap();

        let mut autosave = engine(
            &dir,
            vec![
                SaveFileConfig::new("auto").with_backup_mode(BackupMode::None),
                SaveFileConfig::new("broken").with_backup_mode(BackupMode::None),
                SaveFileConfig::new("fresh"),
            ],
        );
        let x = SharedValue::new(0);
        autosave.registry_mut().add_accessor(Some("auto"), "x", x.clone()).unwrap();

        let outcomes = autosave.load_all();
        assert_eq!(x.load().unwrap(), Value::Int(9));
        assert!(matches!(outcomes["auto"], Ok(LoadOutcome::Loaded(_))));
        assert!(matches!(outcomes["broken"], Err(AutosaveError::Format(_))));
        assert!(matches!(outcomes["fresh"], Ok(LoadOutcome::NothingToLoad)));
    }

    #[test]
    fn test_disabled_engine_does_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("auto.softsav"), r#"{"x": 9}"#).unwrap();
        let config = AutosaveConfig::new(dir.path())
            .with_enabled(false)
            .with_file(SaveFileConfig::new("auto"));
        let mut autosave = Autosave::new(Registry::new(config).unwrap()).unwrap();
        let x = SharedValue::new(0);
        autosave.registry_mut().add_accessor(None, "x", x.clone()).unwrap();

        assert!(autosave.load_all().is_empty());
        assert!(autosave.tick(Instant::now()).is_empty());
        assert!(autosave.flush_all(Instant::now()).is_empty());
        assert_eq!(x.load().unwrap(), Value::Int(0));
    }

    #[test]
    fn test_nan_is_saved_once_and_restored() {
        let dir = TempDir::new().unwrap();
        let mut autosave = engine(
            &dir,
            vec![SaveFileConfig::new("auto").with_period(Duration::from_secs(1))],
        );
        autosave
            .registry_mut()
            .add_accessor(None, "reading", SharedValue::new(f64::NAN))
            .unwrap();

        let start = Instant::now();
        assert_eq!(autosave.tick(start), vec!["auto"]);
        for i in 2..12 {
            assert!(autosave.tick(start + Duration::from_secs(i)).is_empty());
        }
        assert!(list_backups(autosave.storage(), "auto").unwrap().is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("auto.softsav")).unwrap(),
            "reading: .nan\n"
        );

        let mut restored = engine(
            &dir,
            vec![SaveFileConfig::new("auto").with_backup_mode(BackupMode::None)],
        );
        let reading = SharedValue::new(0.0);
        restored
            .registry_mut()
            .add_accessor(None, "reading", reading.clone())
            .unwrap();
        assert!(matches!(restored.load_all()["auto"], Ok(LoadOutcome::Loaded(_))));
        assert!(matches!(reading.load().unwrap(), Value::Float(v) if v.is_nan()));
    }

    #[test]
    fn test_loads_flow_sequences_from_default_format() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("auto.softsav"), "x: 5\nwave: [1.0, 2.0]\n").unwrap();

        let mut autosave = engine(
            &dir,
            vec![SaveFileConfig::new("auto").with_backup_mode(BackupMode::None)],
        );
        let x = SharedValue::new(0);
        let wave = SharedValue::new(vec![0.0]);
        autosave.registry_mut().add_accessor(None, "x", x.clone()).unwrap();
        autosave.registry_mut().add_accessor(None, "wave", wave.clone()).unwrap();

        assert!(matches!(autosave.load("auto"), Ok(LoadOutcome::Loaded(_))));
        assert_eq!(x.load().unwrap(), Value::Int(5));
        assert_eq!(wave.load().unwrap(), Value::FloatArray(vec![1.0, 2.0]));
    }

    #[test]
    fn test_panicking_file_does_not_stop_other_files() {
        let dir = TempDir::new().unwrap();
        let mut autosave = engine(
            &dir,
            vec![
                SaveFileConfig::new("bad").with_period(Duration::from_secs(1)),
                SaveFileConfig::new("good")
                    .with_period(Duration::from_secs(1))
                    .with_backup_mode(BackupMode::None),
            ],
        );
        autosave
            .registry_mut()
            .add_accessor(
                Some("bad"),
                "boom",
                FnAccessor::new(|| panic!("accessor exploded"), |_| Ok(())),
            )
            .unwrap();
        let x = SharedValue::new(1);
        autosave.registry_mut().add_accessor(Some("good"), "x", x.clone()).unwrap();

        let start = Instant::now();
        assert_eq!(autosave.tick(start), vec!["good"]);

        x.store(2).unwrap();
        assert_eq!(autosave.tick(start + Duration::from_secs(2)), vec!["good"]);
        assert_eq!(read(&dir, "good.softsav"), serde_json::json!({"x": 2}));

        x.store(3).unwrap();
        assert_eq!(autosave.flush_all(start + Duration::from_secs(3)), vec!["good"]);
        assert_eq!(read(&dir, "good.softsav"), serde_json::json!({"x": 3}));
        assert!(!dir.path().join("bad.softsav").exists());
        assert!(autosave.registry().file("bad").unwrap().last_saved_time().is_none());
    }

    #[test]
    fn test_load_unknown_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let autosave = engine(&dir, vec![]);
        assert!(matches!(autosave.load("nope"), Err(AutosaveError::Config(_))));
    }
}
