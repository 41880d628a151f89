//! Automation orchestrator for calibration form runs.
//!
//! Drives one portal session end-to-end per run: authenticate, open the
//! visit, then per dispenser and per fuel grade classify, resolve
//! equipment, locate and fill controls, save, and finally submit. Owns
//! failure and retry policy, cooperative pause/cancel, the run-state
//! arena, and batch mode.

pub mod api;
pub mod batch;
pub mod errors;
pub mod model;
pub mod pool;
pub mod registry;
pub mod runner;

pub use api::AutomationEngine;
pub use batch::{BatchOutcome, BatchRunner, WorkItem};
pub use errors::EngineError;
pub use model::{
    EngineConfig, JobRunState, Phase, RunErrorReport, RunOptions, RunResult, RunStatus,
    StatusReport,
};
pub use registry::{ControlSignal, RunHandle, RunRegistry};
