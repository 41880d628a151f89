//! JSON input files produced by the scraping collaborator.

use std::path::Path;

use anyhow::{Context, Result};
use calibra_core_types::{DispenserRecord, WorkOrder};
use run_engine::WorkItem;
use serde::Deserialize;

/// Single-run input: one work order plus the dispenser records observed at
/// the site.
#[derive(Clone, Debug, Deserialize)]
pub struct RunInput {
    pub work_order: WorkOrder,
    #[serde(default)]
    pub dispensers: Vec<DispenserRecord>,
}

pub fn load_run_input(path: &Path) -> Result<RunInput> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading run input {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing run input {}", path.display()))
}

/// Batch input: an ordered list of work items.
pub fn load_batch_input(path: &Path) -> Result<Vec<WorkItem>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading batch input {}", path.display()))?;
    let items: Vec<WorkItem> =
        serde_json::from_str(&raw).with_context(|| format!("parsing batch input {}", path.display()))?;
    Ok(items)
}
