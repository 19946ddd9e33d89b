/*!
# Autosave Core Engine

Periodic, crash-safe persistence of named runtime variables.

Variables are registered into named save-files through accessors. A
background worker snapshots each save-file on its own period, writes it only
when something changed, and replaces the file on disk atomically after
taking a backup. On startup the saved values are restored through the same
accessors.

## Architecture

- [`Registry`] holds the save-files and their accessors
- [`persister::Persister`] and [`loader::Loader`] move snapshots between
  memory and a [`StorageAdapter`] through a [`codec::SnapshotCodec`]
- [`Autosave`] ties them together and [`Autosave::start`] moves the engine
  onto a background worker, returning an [`AutosaveHandle`]

## Usage

```rust
use autosave_core::{Autosave, AutosaveConfig, BackupMode, Registry, SaveFileConfig, SharedValue};
use std::time::Duration;

let dir = tempfile::TempDir::new().unwrap();
let config = AutosaveConfig::new(dir.path()).with_file(
    SaveFileConfig::new("auto")
        .with_period(Duration::from_secs(30))
        .with_backup_mode(BackupMode::SingleRotating),
);

let mut registry = Registry::new(config)?;
let speed = SharedValue::new(1.5);
registry.add_accessor(None, "speed", speed.clone())?;

let autosave = Autosave::new(registry)?;
autosave.load_all();
let handle = autosave.start()?;
// ... the application runs and changes `speed` ...
handle.stop_and_wait()?;
# Ok::<(), autosave_core::AutosaveError>(())
```
*/

pub mod accessor;
pub mod backup;
pub mod codec;
pub mod config;
pub mod differ;
pub mod engine;
pub mod error;
pub mod loader;
pub mod observability;
pub mod persister;
pub mod registry;
pub mod storage;
pub mod value;
pub mod worker;

pub use accessor::{Accessor, FnAccessor, SharedValue, Variable};
pub use config::{AutosaveConfig, BackupMode, Format, SaveFileConfig};
pub use engine::Autosave;
pub use error::{AccessorError, AutosaveError, Result};
pub use loader::{LoadOutcome, LoadReport};
pub use registry::{Registry, SaveFile};
pub use storage::{LocalFileStorage, StorageAdapter};
pub use value::{Snapshot, Value};
pub use worker::{AutosaveHandle, WorkerState};
