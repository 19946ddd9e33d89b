//! Configuration for the autosave engine
//!
//! This module provides the configuration structures for the save directory,
//! the worker loop and the individual save-files. Configuration can be built
//! in code or parsed from a TOML file.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{AutosaveError, Result};

/// Suffix of canonical save files
pub const PRIMARY_SUFFIX: &str = "softsav";
/// Suffix of the single rotating backup
pub const BACKUP_SUFFIX: &str = "softsavB";
/// Save-file used when a registration names no file
pub const DEFAULT_FILENAME: &str = "auto";
/// Default period between saves of one file, in seconds
pub const DEFAULT_SAVE_PERIOD_SECS: f64 = 30.0;
/// Default worker polling interval, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Backup policy applied before a canonical file is overwritten or loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupMode {
    /// No backup is taken
    None,
    /// One backup file, overwritten each time
    SingleRotating,
    /// A new backup file per save, suffixed with the local time
    #[default]
    Timestamped,
}

/// On-disk text format of save files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Json,
    #[default]
    Yaml,
}

/// Settings for one save-file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFileConfig {
    /// Save-file name; the canonical file is `<name>.softsav`
    pub name: String,
    /// Minimum time between periodic saves, in seconds
    #[serde(default = "SaveFileConfig::default_period")]
    pub period_secs: f64,
    /// Backup policy
    #[serde(default)]
    pub backup_mode: BackupMode,
    /// Disabled files are neither loaded nor periodically saved
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SaveFileConfig {
    /// Create a save-file configuration with default period and backup policy
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            period_secs: DEFAULT_SAVE_PERIOD_SECS,
            backup_mode: BackupMode::default(),
            enabled: true,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period_secs = period.as_secs_f64();
        self
    }

    pub fn with_backup_mode(mut self, backup_mode: BackupMode) -> Self {
        self.backup_mode = backup_mode;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(self.period_secs).unwrap_or(Duration::MAX)
    }

    const fn default_period() -> f64 {
        DEFAULT_SAVE_PERIOD_SECS
    }

    /// Validate the save-file settings
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AutosaveError::config("save-file name cannot be empty"));
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(AutosaveError::config(format!(
                "save-file name '{}' must not contain path separators",
                self.name
            )));
        }
        if !(self.period_secs.is_finite() && self.period_secs > 0.0) {
            return Err(AutosaveError::config(format!(
                "save-file '{}' needs a positive, finite save period",
                self.name
            )));
        }
        Ok(())
    }
}

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutosaveConfig {
    /// Directory holding canonical files, backups and temporaries
    pub directory: PathBuf,
    /// Master switch; a disabled engine never loads or saves
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Worker polling interval in milliseconds
    #[serde(default = "AutosaveConfig::default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Whether the final flush also writes disabled save-files
    #[serde(default)]
    pub flush_disabled_on_shutdown: bool,
    /// On-disk format
    #[serde(default)]
    pub format: Format,
    /// Save-files to configure up front
    #[serde(default)]
    pub files: Vec<SaveFileConfig>,
}

impl AutosaveConfig {
    /// Create a configuration for the given directory with defaults elsewhere
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            enabled: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            flush_disabled_on_shutdown: false,
            format: Format::default(),
            files: Vec::new(),
        }
    }

    /// Parse configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AutosaveError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AutosaveError::config(format!("invalid config: {e}")))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_flush_disabled_on_shutdown(mut self, flush: bool) -> Self {
        self.flush_disabled_on_shutdown = flush;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, file: SaveFileConfig) -> Self {
        self.files.push(file);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    const fn default_poll_interval() -> u64 {
        DEFAULT_POLL_INTERVAL_MS
    }

    /// Validate the configuration
    ///
    /// The directory is only checked when autosave is enabled; it is checked
    /// once here and not again per write.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(AutosaveError::config("poll interval must be non-zero"));
        }

        let mut seen = HashSet::new();
        for file in &self.files {
            file.validate()?;
            if !seen.insert(file.name.as_str()) {
                return Err(AutosaveError::config(format!(
                    "duplicate save-file name '{}'",
                    file.name
                )));
            }
        }

        if self.enabled {
            if self.directory.as_os_str().is_empty() {
                return Err(AutosaveError::config("autosave directory is not set"));
            }
            if !self.directory.is_dir() {
                return Err(AutosaveError::config(format!(
                    "{} is not a valid autosave directory",
                    self.directory.display()
                )));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
