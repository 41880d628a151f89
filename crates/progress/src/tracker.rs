//! Hierarchical progress state machine.
//!
//! Dispenser and fuel-grade steps each walk
//! `pending → processing → completed|error`. Fuel grades dominate the
//! weighted percentage since there are many more of them than dispensers.

use std::sync::Arc;
use std::time::Instant;

use calibra_core_types::RunId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::ProgressBus;
use crate::events::{ProgressCounters, ProgressEvent, ProgressEventKind};

const DISPENSER_WEIGHT: f64 = 0.2;
const GRADE_WEIGHT: f64 = 0.8;

/// Step state at both hierarchy levels.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
}

/// Progress of one fuel grade within a dispenser.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FuelGradeProgress {
    pub grade: String,
    pub status: StepStatus,
    pub assigned_equipment: Option<String>,
    pub message: Option<String>,
}

impl FuelGradeProgress {
    pub fn new(grade: impl Into<String>) -> Self {
        Self {
            grade: grade.into(),
            status: StepStatus::Pending,
            assigned_equipment: None,
            message: None,
        }
    }
}

/// Progress of one dispenser form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispenserProgress {
    pub title: String,
    pub form_index: u32,
    pub total_forms: u32,
    pub status: StepStatus,
    pub fuel_grades: Vec<FuelGradeProgress>,
}

impl DispenserProgress {
    pub fn new(
        title: impl Into<String>,
        form_index: u32,
        total_forms: u32,
        grades: Vec<String>,
    ) -> Self {
        Self {
            title: title.into(),
            form_index,
            total_forms,
            status: StepStatus::Pending,
            fuel_grades: grades.into_iter().map(FuelGradeProgress::new).collect(),
        }
    }
}

/// Point-in-time view exposed through the status endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub percent: f64,
    pub eta_ms: Option<u64>,
    pub counters: ProgressCounters,
    pub dispensers: Vec<DispenserProgress>,
}

/// Owns the per-run progress hierarchy and publishes every transition.
pub struct ProgressTracker {
    run_id: RunId,
    dispensers: Vec<DispenserProgress>,
    bus: Arc<ProgressBus>,
    seq: u64,
    started_at: Instant,
    reported_percent: f64,
}

impl ProgressTracker {
    pub fn new(run_id: RunId, dispensers: Vec<DispenserProgress>, bus: Arc<ProgressBus>) -> Self {
        Self {
            run_id,
            dispensers,
            bus,
            seq: 0,
            started_at: Instant::now(),
            reported_percent: 0.0,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn dispensers(&self) -> &[DispenserProgress] {
        &self.dispensers
    }

    pub fn counters(&self) -> ProgressCounters {
        let mut counters = ProgressCounters {
            total_dispensers: self.dispensers.len() as u32,
            ..Default::default()
        };
        for dispenser in &self.dispensers {
            if dispenser.status == StepStatus::Completed {
                counters.completed_dispensers += 1;
            }
            for grade in &dispenser.fuel_grades {
                counters.total_grades += 1;
                if grade.status == StepStatus::Completed {
                    counters.completed_grades += 1;
                }
            }
        }
        counters
    }

    /// Weighted completion percentage, monotonically non-decreasing within
    /// a run.
    pub fn percent(&mut self) -> f64 {
        let counters = self.counters();
        let dispenser_frac = fraction(counters.completed_dispensers, counters.total_dispensers);
        let grade_frac = fraction(counters.completed_grades, counters.total_grades);
        let percent = (DISPENSER_WEIGHT * dispenser_frac + GRADE_WEIGHT * grade_frac) * 100.0;
        self.reported_percent = self.reported_percent.max(percent);
        self.reported_percent
    }

    /// Estimated remaining milliseconds, recomputed after each completed
    /// grade; `None` until the first grade completes.
    pub fn eta_ms(&self) -> Option<u64> {
        let counters = self.counters();
        if counters.completed_grades == 0 {
            return None;
        }
        let failed = self
            .dispensers
            .iter()
            .flat_map(|d| &d.fuel_grades)
            .filter(|g| g.status == StepStatus::Error)
            .count() as u32;
        let remaining = counters
            .total_grades
            .saturating_sub(counters.completed_grades)
            .saturating_sub(failed);
        let elapsed = self.started_at.elapsed().as_millis() as u64;
        Some(elapsed / u64::from(counters.completed_grades) * u64::from(remaining))
    }

    pub fn snapshot(&mut self) -> ProgressSnapshot {
        ProgressSnapshot {
            percent: self.percent(),
            eta_ms: self.eta_ms(),
            counters: self.counters(),
            dispensers: self.dispensers.clone(),
        }
    }

    pub fn run_started(&mut self, message: impl Into<String>) {
        self.emit(ProgressEventKind::RunStarted, message.into(), None, None);
    }

    pub fn dispenser_started(&mut self, index: usize) {
        if let Some(dispenser) = self.dispensers.get_mut(index) {
            dispenser.status = StepStatus::Processing;
            let message = format!("Processing {}", dispenser.title);
            self.emit(ProgressEventKind::DispenserStarted, message, Some(index), None);
        }
    }

    pub fn dispenser_completed(&mut self, index: usize) {
        if let Some(dispenser) = self.dispensers.get_mut(index) {
            dispenser.status = StepStatus::Completed;
            let message = format!("Completed {}", dispenser.title);
            self.emit(
                ProgressEventKind::DispenserCompleted,
                message,
                Some(index),
                None,
            );
        }
    }

    pub fn dispenser_failed(&mut self, index: usize, message: impl Into<String>) {
        if let Some(dispenser) = self.dispensers.get_mut(index) {
            dispenser.status = StepStatus::Error;
            self.emit(
                ProgressEventKind::DispenserFailed,
                message.into(),
                Some(index),
                None,
            );
        }
    }

    pub fn grade_started(
        &mut self,
        dispenser: usize,
        grade: usize,
        equipment: Option<String>,
    ) {
        if let Some(entry) = self.grade_mut(dispenser, grade) {
            entry.status = StepStatus::Processing;
            entry.assigned_equipment = equipment;
            let message = format!("Calibrating {}", entry.grade);
            self.emit(
                ProgressEventKind::GradeStarted,
                message,
                Some(dispenser),
                Some(grade),
            );
        }
    }

    pub fn grade_completed(&mut self, dispenser: usize, grade: usize, message: impl Into<String>) {
        if let Some(entry) = self.grade_mut(dispenser, grade) {
            entry.status = StepStatus::Completed;
            let message = message.into();
            entry.message = Some(message.clone());
            self.emit(
                ProgressEventKind::GradeCompleted,
                message,
                Some(dispenser),
                Some(grade),
            );
        }
    }

    pub fn grade_failed(&mut self, dispenser: usize, grade: usize, message: impl Into<String>) {
        if let Some(entry) = self.grade_mut(dispenser, grade) {
            entry.status = StepStatus::Error;
            let message = message.into();
            entry.message = Some(message.clone());
            self.emit(
                ProgressEventKind::GradeFailed,
                message,
                Some(dispenser),
                Some(grade),
            );
        }
    }

    pub fn run_paused(&mut self) {
        self.emit(
            ProgressEventKind::RunPaused,
            "Run paused".to_string(),
            None,
            None,
        );
    }

    pub fn run_resumed(&mut self) {
        self.emit(
            ProgressEventKind::RunResumed,
            "Run resumed".to_string(),
            None,
            None,
        );
    }

    pub fn run_completed(&mut self, message: impl Into<String>) {
        self.emit(ProgressEventKind::RunCompleted, message.into(), None, None);
    }

    pub fn run_failed(&mut self, message: impl Into<String>) {
        self.emit(ProgressEventKind::RunFailed, message.into(), None, None);
    }

    pub fn run_cancelled(&mut self, message: impl Into<String>) {
        self.emit(ProgressEventKind::RunCancelled, message.into(), None, None);
    }

    fn grade_mut(&mut self, dispenser: usize, grade: usize) -> Option<&mut FuelGradeProgress> {
        self.dispensers
            .get_mut(dispenser)?
            .fuel_grades
            .get_mut(grade)
    }

    fn emit(
        &mut self,
        kind: ProgressEventKind,
        message: String,
        dispenser: Option<usize>,
        grade: Option<usize>,
    ) {
        self.seq += 1;
        let dispenser_title = dispenser
            .and_then(|i| self.dispensers.get(i))
            .map(|d| d.title.clone());
        let grade_label = dispenser
            .and_then(|i| self.dispensers.get(i))
            .and_then(|d| grade.and_then(|g| d.fuel_grades.get(g)))
            .map(|g| g.grade.clone());
        let event = ProgressEvent {
            run_id: self.run_id.clone(),
            seq: self.seq,
            kind,
            counters: self.counters(),
            percent: self.percent(),
            eta_ms: self.eta_ms(),
            message,
            timestamp: Utc::now(),
            dispenser: dispenser_title,
            grade: grade_label,
        };
        debug!(run = %self.run_id, seq = self.seq, kind = ?kind, percent = event.percent, "progress");
        self.bus.publish(event);
    }
}

fn fraction(completed: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(completed) / f64::from(total)
    }
}
