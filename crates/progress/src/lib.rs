//! Hierarchical progress model for automation runs.
//!
//! Job → dispenser → fuel grade, with every transition published as an
//! append-only event. Consumers de-duplicate by `(run_id, seq)` and must
//! tolerate delayed or out-of-order delivery.

pub mod bus;
pub mod events;
pub mod tracker;

pub use bus::{to_mpsc, ProgressBus};
pub use events::{ProgressCounters, ProgressEvent, ProgressEventKind};
pub use tracker::{
    DispenserProgress, FuelGradeProgress, ProgressSnapshot, ProgressTracker, StepStatus,
};
