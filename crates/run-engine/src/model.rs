//! Run-state model and engine configuration.

use std::collections::HashMap;

use calibra_core_types::RunId;
use calibra_progress::ProgressSnapshot;
use calibra_rules::{EquipmentPreferenceTable, FormType, GradeTables};
use portal_session::{Credentials, RetryPolicy, SessionOptions};
use serde::{Deserialize, Serialize};

/// Run lifecycle status.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Error | RunStatus::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// The run's phase sequence; every boundary is a checkpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Authenticate,
    OpenVisit,
    EnumerateDispensers,
    ProcessDispenser,
    AdvanceSection,
    Submit,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Authenticate => "authenticate",
            Phase::OpenVisit => "open-visit",
            Phase::EnumerateDispensers => "enumerate-dispensers",
            Phase::ProcessDispenser => "process-dispenser",
            Phase::AdvanceSection => "advance-section",
            Phase::Submit => "submit",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutable state of one run, owned by the orchestrator for its lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRunState {
    pub run_id: RunId,
    pub work_order_id: String,
    pub form_type: FormType,
    pub status: RunStatus,
    pub phase: Phase,
    pub current_dispenser_index: usize,
    pub current_fuel_grade_index: usize,
    /// Retry counts keyed by phase name.
    pub retry_counts: HashMap<String, u32>,
}

impl JobRunState {
    pub fn new(run_id: RunId, work_order_id: String, form_type: FormType) -> Self {
        Self {
            run_id,
            work_order_id,
            form_type,
            status: RunStatus::Pending,
            phase: Phase::Authenticate,
            current_dispenser_index: 0,
            current_fuel_grade_index: 0,
            retry_counts: HashMap::new(),
        }
    }
}

/// Per-run options from the control surface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunOptions {
    pub headless: Option<bool>,
    /// Force (or suppress) specific-dispenser routing regardless of the
    /// service code.
    pub specific_dispensers: Option<bool>,
    /// Override the configured equipment preference table for this run.
    pub equipment_table: Option<EquipmentPreferenceTable>,
}

/// One surfaced failure with the context a human needs to resume manually.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunErrorReport {
    pub phase: String,
    pub dispenser: Option<String>,
    pub grade: Option<String>,
    pub message: String,
}

/// Terminal result for the reporting boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub success: bool,
    pub status: RunStatus,
    pub completed_dispensers: u32,
    pub duration_ms: u64,
    pub errors: Vec<RunErrorReport>,
}

/// Live status view for `status(run_id)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub phase: Phase,
    pub progress: ProgressSnapshot,
}

/// Engine-wide configuration, read-only within a run.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub credentials: Credentials,
    pub session: SessionOptions,
    /// Max concurrent sessions; each is expensive on the host.
    pub pool_size: usize,
    pub retry: RetryPolicy,
    pub grade_tables: GradeTables,
    pub equipment: EquipmentPreferenceTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials {
                username: String::new(),
                password: String::new(),
            },
            session: SessionOptions::default(),
            pool_size: 2,
            retry: RetryPolicy::default(),
            grade_tables: GradeTables::default(),
            equipment: EquipmentPreferenceTable::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn fresh_state_is_pending_at_authenticate() {
        let state = JobRunState::new(
            RunId::new(),
            "WO-1".to_string(),
            FormType::Calibration,
        );
        assert_eq!(state.status, RunStatus::Pending);
        assert_eq!(state.phase, Phase::Authenticate);
        assert_eq!(state.current_dispenser_index, 0);
    }
}
