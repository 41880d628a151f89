//! End-to-end run execution.
//!
//! One finite sequence of phases per run; every phase boundary and every
//! fuel-grade iteration is a checkpoint where pause and cancel requests are
//! honored. Transient failures retry the current phase up to the bounded
//! policy; exhaustion finalizes the run as `Error` with the failing
//! phase/dispenser/grade context preserved in the terminal event.

use std::sync::Arc;
use std::time::Instant;

use calibra_core_types::{DispenserRecord, WorkOrder};
use calibra_rules::{classify, resolve_equipment, EquipmentPreferenceTable, FormType, RoutePlan};
use form_locator::{ControlLocator, ControlRef, LocatorError};
use portal_session::{PortalSession, SessionFactory};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::errors::EngineError;
use crate::model::{EngineConfig, Phase, RunErrorReport, RunResult, RunStatus};
use crate::pool::SessionPool;
use crate::registry::{ControlSignal, RunHandle};

/// Inputs fixed at `start` time.
pub struct RunInputs {
    pub work_order: WorkOrder,
    pub dispensers: Vec<DispenserRecord>,
    pub plan: RoutePlan,
    pub equipment: EquipmentPreferenceTable,
    pub headless: bool,
}

enum Checkpoint {
    Continue,
    Cancelled,
}

struct FailureContext {
    phase: Phase,
    dispenser: Option<String>,
    grade: Option<String>,
    error: EngineError,
}

enum Outcome {
    Completed,
    Cancelled(Phase),
}

/// Drive one run to a terminal state and return the terminal result.
/// The caller records the result on the handle.
#[instrument(skip_all, fields(run = %handle.run_id(), order = %inputs.work_order.id))]
pub async fn execute_run(
    config: Arc<EngineConfig>,
    factory: Arc<dyn SessionFactory>,
    pool: Arc<SessionPool>,
    handle: Arc<RunHandle>,
    mut control: watch::Receiver<ControlSignal>,
    inputs: RunInputs,
) -> RunResult {
    let started = Instant::now();

    // One session per run; acquisition blocks until a slot frees.
    let _permit = pool.acquire().await;

    handle.state.write().status = RunStatus::Running;
    handle
        .tracker
        .lock()
        .run_started(format!("Starting work order {}", inputs.work_order.id));

    let mut session_options = config.session.clone();
    session_options.headless = inputs.headless;
    let session = match factory.create(&session_options).await {
        Ok(session) => session,
        Err(err) => {
            let context = FailureContext {
                phase: Phase::Authenticate,
                dispenser: None,
                grade: None,
                error: err.into(),
            };
            return finalize_error(&handle, started, context);
        }
    };

    let outcome = drive(&config, session.as_ref(), &handle, &mut control, &inputs).await;
    let _ = session.close().await;

    match outcome {
        Ok(Outcome::Completed) => {
            handle.state.write().status = RunStatus::Completed;
            let completed = completed_dispensers(&handle);
            handle
                .tracker
                .lock()
                .run_completed(format!("Work order {} submitted", inputs.work_order.id));
            info!("run completed");
            RunResult {
                run_id: handle.run_id(),
                success: true,
                status: RunStatus::Completed,
                completed_dispensers: completed,
                duration_ms: started.elapsed().as_millis() as u64,
                errors: Vec::new(),
            }
        }
        Ok(Outcome::Cancelled(phase)) => {
            handle.state.write().status = RunStatus::Cancelled;
            handle
                .tracker
                .lock()
                .run_cancelled(format!("Cancelled at {phase}"));
            info!(phase = %phase, "run cancelled");
            RunResult {
                run_id: handle.run_id(),
                success: false,
                status: RunStatus::Cancelled,
                completed_dispensers: completed_dispensers(&handle),
                duration_ms: started.elapsed().as_millis() as u64,
                errors: Vec::new(),
            }
        }
        Err(context) => finalize_error(&handle, started, context),
    }
}

async fn drive(
    config: &EngineConfig,
    session: &dyn PortalSession,
    handle: &Arc<RunHandle>,
    control: &mut watch::Receiver<ControlSignal>,
    inputs: &RunInputs,
) -> Result<Outcome, FailureContext> {
    let locator = ControlLocator::new(config.retry);

    // Phase: authenticate.
    enter_phase(handle, Phase::Authenticate);
    if let Checkpoint::Cancelled = checkpoint(handle, control).await {
        return Ok(Outcome::Cancelled(Phase::Authenticate));
    }
    run_phase(config, handle, Phase::Authenticate, None, None, || async {
        session
            .authenticate(&config.credentials)
            .await
            .map_err(EngineError::from)
    })
    .await?;

    // Phase: open the visit.
    enter_phase(handle, Phase::OpenVisit);
    if let Checkpoint::Cancelled = checkpoint(handle, control).await {
        return Ok(Outcome::Cancelled(Phase::OpenVisit));
    }
    let visit_url = inputs
        .work_order
        .visits
        .first()
        .map(|v| v.url.clone())
        .ok_or_else(|| FailureContext {
            phase: Phase::OpenVisit,
            dispenser: None,
            grade: None,
            error: EngineError::MissingVisit(inputs.work_order.id.clone()),
        })?;
    run_phase(config, handle, Phase::OpenVisit, None, None, || {
        let url = visit_url.clone();
        async move { session.open_url(&url).await.map_err(EngineError::from) }
    })
    .await?;

    // Tank gauge reports have no dispenser iteration; submit and finish.
    if inputs.plan.form_type == FormType::TankGauge {
        enter_phase(handle, Phase::Submit);
        if let Checkpoint::Cancelled = checkpoint(handle, control).await {
            return Ok(Outcome::Cancelled(Phase::Submit));
        }
        run_phase(config, handle, Phase::Submit, None, None, || async {
            session.submit().await.map_err(EngineError::from)
        })
        .await?;
        return Ok(Outcome::Completed);
    }

    // Phase: enumerate dispensers (provided by the scraping collaborator;
    // the portal renders one form section per dispenser in the same order).
    enter_phase(handle, Phase::EnumerateDispensers);
    if let Checkpoint::Cancelled = checkpoint(handle, control).await {
        return Ok(Outcome::Cancelled(Phase::EnumerateDispensers));
    }
    info!(
        dispensers = inputs.dispensers.len(),
        form = ?inputs.plan.form_type,
        "enumerated dispensers"
    );

    for (dispenser_index, dispenser) in inputs.dispensers.iter().enumerate() {
        enter_phase(handle, Phase::ProcessDispenser);
        if let Checkpoint::Cancelled = checkpoint(handle, control).await {
            return Ok(Outcome::Cancelled(Phase::ProcessDispenser));
        }
        handle.state.write().current_dispenser_index = dispenser_index;
        handle.tracker.lock().dispenser_started(dispenser_index);

        let grades = dispenser.grades();
        for (grade_index, grade) in grades.iter().enumerate() {
            // Pause/cancel are honored before each fuel-grade iteration.
            if let Checkpoint::Cancelled = checkpoint(handle, control).await {
                return Ok(Outcome::Cancelled(Phase::ProcessDispenser));
            }
            handle.state.write().current_fuel_grade_index = grade_index;

            let classification = classify(grade, &grades, &config.grade_tables);
            let equipment =
                resolve_equipment(grade, &grades, &inputs.equipment).map(|e| e.equipment_id.clone());
            handle
                .tracker
                .lock()
                .grade_started(dispenser_index, grade_index, equipment.clone());

            let fill = run_phase(
                config,
                handle,
                Phase::ProcessDispenser,
                Some(dispenser.title.clone()),
                Some(grade.clone()),
                || {
                    fill_one_grade(
                        session,
                        &locator,
                        grade,
                        classification.iterations,
                        equipment.as_deref(),
                    )
                },
            )
            .await;

            match fill {
                Ok(()) => {
                    let message = match &equipment {
                        Some(equipment) => format!(
                            "{grade}: {} iterations on {equipment}",
                            classification.iterations
                        ),
                        None => format!(
                            "{grade}: {} iterations, no equipment configured",
                            classification.iterations
                        ),
                    };
                    handle
                        .tracker
                        .lock()
                        .grade_completed(dispenser_index, grade_index, message);
                }
                Err(context) => {
                    handle.tracker.lock().grade_failed(
                        dispenser_index,
                        grade_index,
                        context.error.to_string(),
                    );
                    handle
                        .tracker
                        .lock()
                        .dispenser_failed(dispenser_index, context.error.to_string());
                    return Err(context);
                }
            }
        }

        // Phase: advance to the next form section.
        enter_phase(handle, Phase::AdvanceSection);
        if let Checkpoint::Cancelled = checkpoint(handle, control).await {
            return Ok(Outcome::Cancelled(Phase::AdvanceSection));
        }
        run_phase(
            config,
            handle,
            Phase::AdvanceSection,
            Some(dispenser.title.clone()),
            None,
            || async { session.advance_section().await.map(|_| ()).map_err(EngineError::from) },
        )
        .await?;
        handle.tracker.lock().dispenser_completed(dispenser_index);
    }

    // Phase: submit the completed form.
    enter_phase(handle, Phase::Submit);
    if let Checkpoint::Cancelled = checkpoint(handle, control).await {
        return Ok(Outcome::Cancelled(Phase::Submit));
    }
    run_phase(config, handle, Phase::Submit, None, None, || async {
        session.submit().await.map_err(EngineError::from)
    })
    .await?;

    Ok(Outcome::Completed)
}

/// Enter the values for one fuel grade and save. Each attempt re-runs the
/// whole sequence; nothing is carried over from a failed attempt.
async fn fill_one_grade(
    session: &dyn PortalSession,
    locator: &ControlLocator,
    grade: &str,
    iterations: u32,
    equipment: Option<&str>,
) -> Result<(), EngineError> {
    if let Some(equipment) = equipment {
        locator
            .select_option(session, ControlRef::EquipmentSelect, equipment)
            .await?;
    }
    locator
        .select_option(session, ControlRef::FuelGradeSelect, grade)
        .await?;
    locator
        .fill(session, ControlRef::IterationsField, &iterations.to_string())
        .await?;
    locator.click(session, ControlRef::SaveButton).await?;
    Ok(())
}

fn enter_phase(handle: &RunHandle, phase: Phase) {
    handle.state.write().phase = phase;
}

/// Run one phase under the bounded retry policy, mapping the final error
/// into a failure context. A locator exhaustion is retryable at the phase
/// level even though the locator itself gave up; a session crash never is.
async fn run_phase<T, F, Fut>(
    config: &EngineConfig,
    handle: &RunHandle,
    phase: Phase,
    dispenser: Option<String>,
    grade: Option<String>,
    mut op: F,
) -> Result<T, FailureContext>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let result = config
        .retry
        .run_if(phase.name(), phase_retryable, |attempt| {
            if attempt > 1 {
                *handle
                    .state
                    .write()
                    .retry_counts
                    .entry(phase.name().to_string())
                    .or_insert(0) += 1;
            }
            op()
        })
        .await;

    result.map_err(|error| {
        warn!(phase = %phase, error = %error, "phase failed");
        FailureContext {
            phase,
            dispenser,
            grade,
            error,
        }
    })
}

fn phase_retryable(error: &EngineError) -> bool {
    if error.is_fatal_session() {
        return false;
    }
    error.is_retryable()
        || matches!(
            error,
            EngineError::Locator(LocatorError::Exhausted { .. })
                | EngineError::Locator(LocatorError::NoMatchingOption { .. })
        )
}

/// Cooperative checkpoint: honors a pending pause (suspending right here
/// until resumed) or cancel request.
async fn checkpoint(
    handle: &Arc<RunHandle>,
    control: &mut watch::Receiver<ControlSignal>,
) -> Checkpoint {
    let signal = *control.borrow();
    match signal {
        ControlSignal::Run => Checkpoint::Continue,
        ControlSignal::Cancel => Checkpoint::Cancelled,
        ControlSignal::Pause => {
            handle.state.write().status = RunStatus::Paused;
            handle.tracker.lock().run_paused();
            loop {
                if control.changed().await.is_err() {
                    // Control sender gone; treat as cancellation.
                    return Checkpoint::Cancelled;
                }
                let signal = *control.borrow();
                match signal {
                    ControlSignal::Pause => continue,
                    ControlSignal::Cancel => return Checkpoint::Cancelled,
                    ControlSignal::Run => {
                        handle.state.write().status = RunStatus::Running;
                        handle.tracker.lock().run_resumed();
                        return Checkpoint::Continue;
                    }
                }
            }
        }
    }
}

fn completed_dispensers(handle: &RunHandle) -> u32 {
    handle.tracker.lock().counters().completed_dispensers
}

fn finalize_error(handle: &RunHandle, started: Instant, context: FailureContext) -> RunResult {
    handle.state.write().status = RunStatus::Error;
    let report = RunErrorReport {
        phase: context.phase.name().to_string(),
        dispenser: context.dispenser.clone(),
        grade: context.grade.clone(),
        message: context.error.to_string(),
    };
    let mut message = format!("Run failed at {}: {}", context.phase, context.error);
    if let Some(dispenser) = &context.dispenser {
        message.push_str(&format!(" ({dispenser}"));
        if let Some(grade) = &context.grade {
            message.push_str(&format!(", {grade}"));
        }
        message.push(')');
    }
    handle.tracker.lock().run_failed(message);
    RunResult {
        run_id: handle.run_id(),
        success: false,
        status: RunStatus::Error,
        completed_dispensers: completed_dispensers(handle),
        duration_ms: started.elapsed().as_millis() as u64,
        errors: vec![report],
    }
}
