//! Public engine surface: start runs, control them, observe them.

use std::sync::Arc;

use calibra_core_types::{DispenserRecord, RunId, WorkOrder};
use calibra_progress::{DispenserProgress, ProgressBus, ProgressEvent, ProgressTracker};
use calibra_rules::{route, FormType};
use portal_session::SessionFactory;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::errors::EngineError;
use crate::model::{EngineConfig, JobRunState, RunOptions, RunResult, StatusReport};
use crate::pool::SessionPool;
use crate::registry::{RunHandle, RunRegistry};
use crate::runner::{execute_run, RunInputs};

const PROGRESS_BUS_CAPACITY: usize = 256;

/// Front door for the orchestrator. Owns the session pool, the run
/// registry, and the progress bus; each `start` spawns an independent
/// run task.
pub struct AutomationEngine {
    config: Arc<EngineConfig>,
    factory: Arc<dyn SessionFactory>,
    pool: Arc<SessionPool>,
    registry: RunRegistry,
    bus: Arc<ProgressBus>,
}

impl AutomationEngine {
    pub fn new(config: EngineConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let pool = Arc::new(SessionPool::new(config.pool_size));
        Self {
            config: Arc::new(config),
            factory,
            pool,
            registry: RunRegistry::new(),
            bus: ProgressBus::new(PROGRESS_BUS_CAPACITY),
        }
    }

    /// Subscribe to progress events across all runs on this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> Arc<ProgressBus> {
        self.bus.clone()
    }

    /// Register a run and spawn its task. Returns immediately with the
    /// run id; actual session work starts once a pool slot frees.
    pub fn start(
        &self,
        work_order: WorkOrder,
        dispensers: Vec<DispenserRecord>,
        options: RunOptions,
    ) -> RunId {
        let plan = route(&work_order);
        let specific = options.specific_dispensers.unwrap_or(plan.specific_dispensers);

        let scoped = if plan.form_type == FormType::TankGauge {
            Vec::new()
        } else if specific && !plan.dispenser_numbers.is_empty() {
            let matched: Vec<DispenserRecord> = dispensers
                .iter()
                .filter(|d| d.number.map_or(false, |n| plan.dispenser_numbers.contains(&n)))
                .cloned()
                .collect();
            if matched.is_empty() {
                // The instructions named dispensers we cannot identify;
                // falling back to the full set beats silently doing nothing.
                warn!(
                    order = %work_order.id,
                    numbers = ?plan.dispenser_numbers,
                    "no dispenser records matched the listed numbers, using all"
                );
                dispensers
            } else {
                matched
            }
        } else {
            dispensers
        };

        let run_id = RunId::new();
        let total_forms = scoped.len() as u32;
        let progress: Vec<DispenserProgress> = scoped
            .iter()
            .enumerate()
            .map(|(i, d)| {
                DispenserProgress::new(d.title.clone(), i as u32 + 1, total_forms, d.grades())
            })
            .collect();

        let state = JobRunState::new(run_id.clone(), work_order.id.clone(), plan.form_type);
        let tracker = ProgressTracker::new(run_id.clone(), progress, self.bus.clone());
        let (handle, control) = RunHandle::new(state, tracker);
        self.registry.insert(handle.clone());

        info!(
            run = %run_id,
            order = %work_order.id,
            form = ?plan.form_type,
            dispensers = scoped.len(),
            "run registered"
        );

        let inputs = RunInputs {
            work_order,
            dispensers: scoped,
            equipment: options
                .equipment_table
                .unwrap_or_else(|| self.config.equipment.clone()),
            headless: options.headless.unwrap_or(self.config.session.headless),
            plan,
        };
        let config = self.config.clone();
        let factory = self.factory.clone();
        let pool = self.pool.clone();
        let task_handle = handle.clone();
        tokio::spawn(async move {
            let result = execute_run(config, factory, pool, task_handle.clone(), control, inputs)
                .await;
            task_handle.finish(result);
        });

        run_id
    }

    pub fn pause(&self, run_id: &RunId) -> Result<(), EngineError> {
        self.registry.pause(run_id)
    }

    pub fn resume(&self, run_id: &RunId) -> Result<(), EngineError> {
        self.registry.resume(run_id)
    }

    pub fn cancel(&self, run_id: &RunId) -> Result<(), EngineError> {
        self.registry.cancel(run_id)
    }

    /// Live status with a progress snapshot.
    pub fn status(&self, run_id: &RunId) -> Result<StatusReport, EngineError> {
        Ok(self.registry.get(run_id)?.status_report())
    }

    /// Block until the run reaches a terminal state.
    pub async fn wait(&self, run_id: &RunId) -> Result<RunResult, EngineError> {
        let handle = self.registry.get(run_id)?;
        Ok(handle.wait().await)
    }

    /// Terminal result, if the run has finished.
    pub fn result(&self, run_id: &RunId) -> Result<Option<RunResult>, EngineError> {
        Ok(self.registry.get(run_id)?.result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunStatus;
    use calibra_core_types::{Nozzle, Service, Visit};
    use portal_session::fake::FakePortalBuilder;
    use portal_session::{Credentials, RetryPolicy};
    use std::time::Duration;

    fn work_order(code: &str) -> WorkOrder {
        WorkOrder {
            id: "WO-100".to_string(),
            customer: "Coastal Fuels".to_string(),
            site_address: "12 Harbor Rd".to_string(),
            services: vec![Service {
                code: code.to_string(),
                quantity: 1,
                description: "Calibration".to_string(),
            }],
            instructions: None,
            description: None,
            visits: vec![Visit {
                label: "Visit 1".to_string(),
                url: "https://portal.example/visits/100".to_string(),
            }],
        }
    }

    fn dispenser(title: &str, number: u32, grades: &[&str]) -> DispenserRecord {
        DispenserRecord {
            title: title.to_string(),
            number: Some(number),
            nozzles: grades
                .iter()
                .map(|g| Nozzle {
                    position: 1,
                    fuel_type: g.to_string(),
                })
                .collect(),
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            credentials: Credentials {
                username: "tech".to_string(),
                password: "secret".to_string(),
            },
            retry: RetryPolicy::new(2, Duration::from_millis(1)),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn full_run_completes_and_fills_every_grade() {
        let factory = FakePortalBuilder::new()
            .dispenser("Dispenser 1/2", &["Regular", "Diesel"])
            .dispenser("Dispenser 3/4", &["Regular", "Plus"])
            .into_factory();
        let engine = AutomationEngine::new(fast_config(), factory.clone());

        let run_id = engine.start(
            work_order("3146"),
            vec![
                dispenser("Dispenser 1/2", 1, &["Regular", "Diesel"]),
                dispenser("Dispenser 3/4", 3, &["Regular", "Plus"]),
            ],
            RunOptions::default(),
        );
        let result = engine.wait(&run_id).await.unwrap();

        assert!(result.success);
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.completed_dispensers, 2);

        let portal = factory.last().unwrap();
        assert!(portal.authenticated());
        assert!(portal.submitted());
        // Metered grades get 5 iterations, non-metered 3.
        let filled = portal.filled();
        assert!(filled
            .iter()
            .any(|a| a.control.contains("testIterations") && a.value == "5"));
        assert!(filled
            .iter()
            .any(|a| a.control.contains("testIterations") && a.value == "3"));
    }

    #[tokio::test]
    async fn listed_dispensers_scope_the_run() {
        let factory = FakePortalBuilder::new()
            .dispenser("Dispenser 3/4", &["Regular"])
            .into_factory();
        let engine = AutomationEngine::new(fast_config(), factory);

        let mut order = work_order("3148");
        order.instructions = Some("Calibrate dispensers 3 and 7 only".to_string());
        let run_id = engine.start(
            order,
            vec![
                dispenser("Dispenser 1/2", 1, &["Regular"]),
                dispenser("Dispenser 3/4", 3, &["Regular"]),
                dispenser("Dispenser 5/6", 5, &["Regular"]),
            ],
            RunOptions::default(),
        );
        let result = engine.wait(&run_id).await.unwrap();

        assert!(result.success);
        // The snapshot only ever tracked the scoped dispensers.
        assert_eq!(result.completed_dispensers, 1);
    }

    #[tokio::test]
    async fn tank_gauge_submits_without_dispenser_iteration() {
        let factory = FakePortalBuilder::new().into_factory();
        let engine = AutomationEngine::new(fast_config(), factory.clone());

        let run_id = engine.start(work_order("3050"), Vec::new(), RunOptions::default());
        let result = engine.wait(&run_id).await.unwrap();

        assert!(result.success);
        assert_eq!(result.completed_dispensers, 0);
        let portal = factory.last().unwrap();
        assert!(portal.submitted());
        assert!(portal.filled().is_empty());
    }

    #[tokio::test]
    async fn status_is_queryable_while_running() {
        let factory = FakePortalBuilder::new()
            .dispenser("Dispenser 1/2", &["Regular"])
            .into_factory();
        let engine = AutomationEngine::new(fast_config(), factory);

        let run_id = engine.start(
            work_order("3146"),
            vec![dispenser("Dispenser 1/2", 1, &["Regular"])],
            RunOptions::default(),
        );
        let report = engine.status(&run_id).unwrap();
        assert_eq!(report.run_id, run_id);
        assert!(report.progress.percent <= 100.0);

        engine.wait(&run_id).await.unwrap();
        let report = engine.status(&run_id).unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.progress.percent, 100.0);
    }

    #[tokio::test]
    async fn navigation_timeout_is_retried_within_the_phase() {
        let factory = FakePortalBuilder::new()
            .dispenser("Dispenser 1/2", &["Regular"])
            .fail_advance_times(1)
            .into_factory();
        let engine = AutomationEngine::new(fast_config(), factory.clone());

        let run_id = engine.start(
            work_order("3146"),
            vec![dispenser("Dispenser 1/2", 1, &["Regular"])],
            RunOptions::default(),
        );
        let result = engine.wait(&run_id).await.unwrap();

        // One timeout, one retry slot left: the second attempt advances.
        assert!(result.success);
        assert!(factory.last().unwrap().submitted());
    }

    #[tokio::test]
    async fn navigation_timeout_exhausting_retries_fails_the_run() {
        let factory = FakePortalBuilder::new()
            .dispenser("Dispenser 1/2", &["Regular"])
            .fail_advance_times(5)
            .into_factory();
        let engine = AutomationEngine::new(fast_config(), factory.clone());

        let run_id = engine.start(
            work_order("3146"),
            vec![dispenser("Dispenser 1/2", 1, &["Regular"])],
            RunOptions::default(),
        );
        let result = engine.wait(&run_id).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.status, RunStatus::Error);
        assert_eq!(result.errors[0].phase, "advance-section");
        assert!(result.errors[0].message.contains("navigation timed out"));
        assert!(!factory.last().unwrap().submitted());
    }

    #[tokio::test]
    async fn unknown_run_is_reported() {
        let factory = FakePortalBuilder::new().into_factory();
        let engine = AutomationEngine::new(fast_config(), factory);
        let missing = RunId::new();
        assert!(matches!(
            engine.status(&missing),
            Err(EngineError::UnknownRun(_))
        ));
    }
}
