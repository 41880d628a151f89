//! Scripted portal sessions for the CLI.
//!
//! Driving a live portal UI is a separate adapter concern; the CLI runs the
//! engine against a scripted in-memory portal rendered from the input's own
//! dispenser records, so every rule, locator, and progress path is exercised
//! end to end offline.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use calibra_core_types::DispenserRecord;
use calibra_rules::EquipmentPreferenceTable;
use parking_lot::Mutex;
use portal_session::fake::FakePortalBuilder;
use portal_session::{PortalSession, SessionError, SessionFactory, SessionOptions};
use run_engine::WorkItem;

/// Build one portal script from a dispenser list and the configured
/// equipment table.
pub fn script_for(
    dispensers: &[DispenserRecord],
    equipment: &EquipmentPreferenceTable,
) -> FakePortalBuilder {
    let options: Vec<&str> = equipment
        .entries()
        .iter()
        .map(|e| e.equipment_id.as_str())
        .collect();
    let mut builder = FakePortalBuilder::new().equipment_options(&options);
    for dispenser in dispensers {
        let grades = dispenser.grades();
        let grades: Vec<&str> = grades.iter().map(String::as_str).collect();
        builder = builder.dispenser(&dispenser.title, &grades);
    }
    builder
}

/// Factory that hands out one queued script per created session, in order.
/// Batch runs queue one script per work item; once the queue drains, new
/// sessions see an empty portal.
pub struct ScriptQueueFactory {
    scripts: Mutex<VecDeque<FakePortalBuilder>>,
}

impl ScriptQueueFactory {
    pub fn single(script: FakePortalBuilder) -> Arc<Self> {
        Self::queued(vec![script])
    }

    pub fn queued(scripts: Vec<FakePortalBuilder>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
        })
    }

    pub fn for_batch(items: &[WorkItem], equipment: &EquipmentPreferenceTable) -> Arc<Self> {
        Self::queued(
            items
                .iter()
                .map(|item| script_for(&item.dispensers, equipment))
                .collect(),
        )
    }
}

#[async_trait]
impl SessionFactory for ScriptQueueFactory {
    async fn create(
        &self,
        _options: &SessionOptions,
    ) -> Result<Arc<dyn PortalSession>, SessionError> {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(FakePortalBuilder::new);
        Ok(Arc::new(script.build()))
    }
}
