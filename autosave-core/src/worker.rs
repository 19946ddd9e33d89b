/*!
Background worker driving periodic saves.

The worker owns the [`Autosave`] engine for its lifetime. It ticks once per
poll interval and waits on a stop channel between ticks, so a stop request
interrupts the wait instead of sleeping it out. On stop it flushes every file
once and hands the engine back to whoever joins it.
*/

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{error, info};

use crate::engine::Autosave;
use crate::storage::StorageAdapter;
use crate::{AutosaveError, Result};

/// Lifecycle of the background worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    /// Stop was requested; the final flush may still be in progress
    StopRequested,
    Stopped,
}

impl WorkerState {
    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Running => 0,
            WorkerState::StopRequested => 1,
            WorkerState::Stopped => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Running,
            1 => WorkerState::StopRequested,
            _ => WorkerState::Stopped,
        }
    }
}

/// Handle to a running autosave worker
///
/// Dropping the handle stops the worker and waits for the final flush.
pub struct AutosaveHandle<S: StorageAdapter + 'static> {
    stop_tx: Sender<()>,
    state: Arc<AtomicU8>,
    join: Option<JoinHandle<Autosave<S>>>,
}

impl<S: StorageAdapter + 'static> AutosaveHandle<S> {
    pub(crate) fn spawn(autosave: Autosave<S>) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let state = Arc::new(AtomicU8::new(WorkerState::Running.as_u8()));
        let worker_state = Arc::clone(&state);

        let join = thread::Builder::new()
            .name("autosave".to_string())
            .spawn(move || run(autosave, stop_rx, worker_state))?;

        Ok(Self {
            stop_tx,
            state,
            join: Some(join),
        })
    }

    /// Current worker state
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Ask the worker to stop without waiting for it
    ///
    /// Calling this more than once has no further effect.
    pub fn stop(&self) {
        let requested = self
            .state
            .compare_exchange(
                WorkerState::Running.as_u8(),
                WorkerState::StopRequested.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if requested {
            // The worker may already have exited; nothing to signal then
            let _ = self.stop_tx.send(());
        }
    }

    /// Stop the worker, wait for its final flush, and take the engine back
    ///
    /// # Errors
    /// * `AutosaveError::Worker` - If the worker thread panicked
    pub fn stop_and_wait(mut self) -> Result<Autosave<S>> {
        self.stop();
        let join = self
            .join
            .take()
            .ok_or_else(|| AutosaveError::Worker("worker already joined".to_string()))?;
        join.join()
            .map_err(|_| AutosaveError::Worker("autosave worker panicked".to_string()))
    }
}

impl<S: StorageAdapter + 'static> Drop for AutosaveHandle<S> {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.stop();
            if join.join().is_err() {
                error!("autosave worker panicked during shutdown");
            }
        }
    }
}

/// Publishes `Stopped` when the worker thread exits, including by unwinding
struct StoppedOnExit(Arc<AtomicU8>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.store(WorkerState::Stopped.as_u8(), Ordering::SeqCst);
    }
}

fn run<S: StorageAdapter>(
    mut autosave: Autosave<S>,
    stop_rx: mpsc::Receiver<()>,
    state: Arc<AtomicU8>,
) -> Autosave<S> {
    let _stopped = StoppedOnExit(Arc::clone(&state));
    if !autosave.is_enabled() {
        info!("autosave disabled, worker exiting");
        return autosave;
    }

    let interval = autosave.registry().config().poll_interval();
    info!(
        files = autosave.registry().len(),
        poll_ms = interval.as_millis() as u64,
        "autosave worker started"
    );

    loop {
        autosave.tick(Instant::now());
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    state.store(WorkerState::StopRequested.as_u8(), Ordering::SeqCst);
    let flushed = autosave.flush_all(Instant::now());
    info!(flushed = flushed.len(), "autosave worker stopped");
    autosave
}
