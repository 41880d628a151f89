//! Progress event shapes delivered to the reporting boundary.

use calibra_core_types::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressEventKind {
    RunStarted,
    DispenserStarted,
    DispenserCompleted,
    DispenserFailed,
    GradeStarted,
    GradeCompleted,
    GradeFailed,
    RunPaused,
    RunResumed,
    RunCompleted,
    RunFailed,
    RunCancelled,
}

impl ProgressEventKind {
    /// Terminal events close the stream for a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEventKind::RunCompleted
                | ProgressEventKind::RunFailed
                | ProgressEventKind::RunCancelled
        )
    }
}

/// Current/total counters at both hierarchy levels.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub completed_dispensers: u32,
    pub total_dispensers: u32,
    pub completed_grades: u32,
    pub total_grades: u32,
}

/// One append-only progress event. Never retracted, only superseded by a
/// later event with a higher `seq`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: RunId,
    /// Strictly increasing per run; consumers de-duplicate on
    /// `(run_id, seq)`.
    pub seq: u64,
    pub kind: ProgressEventKind,
    pub counters: ProgressCounters,
    /// Weighted completion percentage, 0.0-100.0.
    pub percent: f64,
    /// Estimated remaining time in milliseconds, once computable.
    pub eta_ms: Option<u64>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Dispenser title, when the event carries dispenser context.
    pub dispenser: Option<String>,
    /// Fuel-grade label, when the event carries grade context.
    pub grade: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_kinds() {
        assert!(ProgressEventKind::RunCompleted.is_terminal());
        assert!(ProgressEventKind::RunCancelled.is_terminal());
        assert!(!ProgressEventKind::GradeCompleted.is_terminal());
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = ProgressEvent {
            run_id: RunId("run-1".to_string()),
            seq: 7,
            kind: ProgressEventKind::GradeCompleted,
            counters: ProgressCounters {
                completed_dispensers: 0,
                total_dispensers: 2,
                completed_grades: 3,
                total_grades: 8,
            },
            percent: 32.5,
            eta_ms: Some(90_000),
            message: "Premium saved".to_string(),
            timestamp: Utc::now(),
            dispenser: Some("Dispenser 1/2".to_string()),
            grade: Some("Premium".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, 7);
        assert_eq!(back.kind, ProgressEventKind::GradeCompleted);
        assert_eq!(back.grade.as_deref(), Some("Premium"));
    }
}
