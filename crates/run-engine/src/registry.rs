//! Run-state arena.
//!
//! Explicit context keyed by run id, passed to every operation; no ambient
//! shared map. Handles stay in the arena after a run reaches a terminal
//! state so late `status` queries still resolve.

use std::sync::Arc;

use calibra_core_types::RunId;
use calibra_progress::ProgressTracker;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Notify};
use tracing::debug;

use crate::errors::EngineError;
use crate::model::{JobRunState, RunResult, RunStatus, StatusReport};

/// Cooperative control signal, checked at every checkpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlSignal {
    Run,
    Pause,
    Cancel,
}

/// Shared handle to one run.
pub struct RunHandle {
    pub state: RwLock<JobRunState>,
    pub tracker: Mutex<ProgressTracker>,
    control: watch::Sender<ControlSignal>,
    result: Mutex<Option<RunResult>>,
    done: Notify,
}

impl RunHandle {
    pub fn new(state: JobRunState, tracker: ProgressTracker) -> (Arc<Self>, watch::Receiver<ControlSignal>) {
        let (control, control_rx) = watch::channel(ControlSignal::Run);
        let handle = Arc::new(Self {
            state: RwLock::new(state),
            tracker: Mutex::new(tracker),
            control,
            result: Mutex::new(None),
            done: Notify::new(),
        });
        (handle, control_rx)
    }

    pub fn run_id(&self) -> RunId {
        self.state.read().run_id.clone()
    }

    pub fn status(&self) -> RunStatus {
        self.state.read().status
    }

    pub fn signal(&self, signal: ControlSignal) {
        let _ = self.control.send(signal);
    }

    /// Record the terminal result and wake every waiter.
    pub fn finish(&self, result: RunResult) {
        *self.result.lock() = Some(result);
        self.done.notify_waiters();
    }

    pub fn result(&self) -> Option<RunResult> {
        self.result.lock().clone()
    }

    /// Await the terminal result.
    pub async fn wait(&self) -> RunResult {
        loop {
            if let Some(result) = self.result() {
                return result;
            }
            self.done.notified().await;
        }
    }

    pub fn status_report(&self) -> StatusReport {
        let state = self.state.read();
        StatusReport {
            run_id: state.run_id.clone(),
            status: state.status,
            phase: state.phase,
            progress: self.tracker.lock().snapshot(),
        }
    }
}

/// Arena of run states keyed by id.
#[derive(Default)]
pub struct RunRegistry {
    runs: DashMap<RunId, Arc<RunHandle>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: Arc<RunHandle>) {
        self.runs.insert(handle.run_id(), handle);
    }

    pub fn get(&self, run_id: &RunId) -> Result<Arc<RunHandle>, EngineError> {
        self.runs
            .get(run_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::UnknownRun(run_id.clone()))
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Request a pause; honored before the next fuel-grade iteration.
    pub fn pause(&self, run_id: &RunId) -> Result<(), EngineError> {
        let handle = self.get(run_id)?;
        match handle.status() {
            RunStatus::Running | RunStatus::Pending => {
                debug!(run = %run_id, "pause requested");
                handle.signal(ControlSignal::Pause);
                Ok(())
            }
            status => Err(EngineError::InvalidControl {
                run: run_id.clone(),
                status: status.name().to_string(),
                request: "pause".to_string(),
            }),
        }
    }

    /// Resume a paused run at exactly the fuel grade it suspended on.
    pub fn resume(&self, run_id: &RunId) -> Result<(), EngineError> {
        let handle = self.get(run_id)?;
        match handle.status() {
            RunStatus::Paused => {
                debug!(run = %run_id, "resume requested");
                handle.signal(ControlSignal::Run);
                Ok(())
            }
            status => Err(EngineError::InvalidControl {
                run: run_id.clone(),
                status: status.name().to_string(),
                request: "resume".to_string(),
            }),
        }
    }

    /// Request cancellation; honored at the next checkpoint, never
    /// pre-emptively mid-fill.
    pub fn cancel(&self, run_id: &RunId) -> Result<(), EngineError> {
        let handle = self.get(run_id)?;
        if handle.status().is_terminal() {
            return Err(EngineError::InvalidControl {
                run: run_id.clone(),
                status: handle.status().name().to_string(),
                request: "cancel".to_string(),
            });
        }
        debug!(run = %run_id, "cancel requested");
        handle.signal(ControlSignal::Cancel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calibra_progress::ProgressBus;
    use calibra_rules::FormType;

    fn handle() -> (Arc<RunHandle>, watch::Receiver<ControlSignal>) {
        let run_id = RunId::new();
        let state = JobRunState::new(run_id.clone(), "WO-1".to_string(), FormType::Calibration);
        let tracker = ProgressTracker::new(run_id, Vec::new(), ProgressBus::new(8));
        RunHandle::new(state, tracker)
    }

    #[test]
    fn unknown_run_is_an_error() {
        let registry = RunRegistry::new();
        let missing = RunId::new();
        assert!(matches!(
            registry.get(&missing),
            Err(EngineError::UnknownRun(_))
        ));
    }

    #[test]
    fn pause_requires_active_run() {
        let registry = RunRegistry::new();
        let (handle, _rx) = handle();
        handle.state.write().status = RunStatus::Completed;
        let run_id = handle.run_id();
        registry.insert(handle);
        assert!(matches!(
            registry.pause(&run_id),
            Err(EngineError::InvalidControl { .. })
        ));
    }

    #[test]
    fn control_signals_reach_the_receiver() {
        let registry = RunRegistry::new();
        let (handle, rx) = handle();
        handle.state.write().status = RunStatus::Running;
        let run_id = handle.run_id();
        registry.insert(handle);

        registry.pause(&run_id).unwrap();
        assert_eq!(*rx.borrow(), ControlSignal::Pause);

        registry.get(&run_id).unwrap().state.write().status = RunStatus::Paused;
        registry.resume(&run_id).unwrap();
        assert_eq!(*rx.borrow(), ControlSignal::Run);

        registry.get(&run_id).unwrap().state.write().status = RunStatus::Running;
        registry.cancel(&run_id).unwrap();
        assert_eq!(*rx.borrow(), ControlSignal::Cancel);
    }

    #[tokio::test]
    async fn wait_returns_the_recorded_result() {
        let (handle, _rx) = handle();
        let run_id = handle.run_id();
        let waiter = Arc::clone(&handle);
        let task = tokio::spawn(async move { waiter.wait().await });
        handle.finish(RunResult {
            run_id,
            success: true,
            status: RunStatus::Completed,
            completed_dispensers: 1,
            duration_ms: 10,
            errors: Vec::new(),
        });
        let result = task.await.unwrap();
        assert!(result.success);
    }
}
