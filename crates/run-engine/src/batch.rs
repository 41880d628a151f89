//! Sequential batch mode with a resumable checkpoint.
//!
//! Items run one at a time in order. After every completed item the
//! checkpoint file on disk is rewritten to point at the next item, so a
//! crashed or aborted batch restarts exactly where it stopped. The first
//! unsuccessful run stops the batch with the checkpoint pointing at the
//! failed item; a fully completed batch removes the checkpoint file.

use std::path::PathBuf;
use std::sync::Arc;

use calibra_core_types::{BatchId, DispenserRecord, WorkOrder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::AutomationEngine;
use crate::errors::EngineError;
use crate::model::{RunOptions, RunResult};

/// One unit of batch work.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkItem {
    pub work_order: WorkOrder,
    #[serde(default)]
    pub dispensers: Vec<DispenserRecord>,
    #[serde(default)]
    pub options: RunOptions,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct BatchCheckpoint {
    batch_id: BatchId,
    next_index: usize,
}

/// Terminal report for one batch invocation.
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    pub batch_id: BatchId,
    pub completed: Vec<RunResult>,
    /// The run that stopped the batch, if one did.
    pub failed: Option<RunResult>,
    /// Index of the first item not yet completed.
    pub next_index: usize,
    pub finished: bool,
}

/// Runs work items sequentially against one engine.
pub struct BatchRunner {
    engine: Arc<AutomationEngine>,
    checkpoint_path: PathBuf,
}

impl BatchRunner {
    pub fn new(engine: Arc<AutomationEngine>, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            checkpoint_path: checkpoint_path.into(),
        }
    }

    /// Run the batch from wherever the checkpoint left off.
    ///
    /// The caller must pass the same item list the interrupted invocation
    /// used; the checkpoint stores only the resume position.
    pub async fn run(&self, items: &[WorkItem]) -> Result<BatchOutcome, EngineError> {
        let checkpoint = self.load_checkpoint().await?;
        let (batch_id, start) = match checkpoint {
            Some(cp) if cp.next_index <= items.len() => {
                info!(batch = %cp.batch_id, resume_at = cp.next_index, "resuming batch");
                (cp.batch_id, cp.next_index)
            }
            Some(cp) => {
                // Stale checkpoint from a different item list; start over.
                warn!(
                    batch = %cp.batch_id,
                    resume_at = cp.next_index,
                    items = items.len(),
                    "checkpoint beyond item list, restarting batch"
                );
                (BatchId::new(), 0)
            }
            None => (BatchId::new(), 0),
        };

        let mut completed = Vec::new();
        for (index, item) in items.iter().enumerate().skip(start) {
            info!(
                batch = %batch_id,
                item = index,
                order = %item.work_order.id,
                "batch item starting"
            );
            let run_id = self.engine.start(
                item.work_order.clone(),
                item.dispensers.clone(),
                item.options.clone(),
            );
            let result = self.engine.wait(&run_id).await?;

            if !result.success {
                warn!(batch = %batch_id, item = index, run = %run_id, "batch stopped");
                self.save_checkpoint(&BatchCheckpoint {
                    batch_id: batch_id.clone(),
                    next_index: index,
                })
                .await?;
                return Ok(BatchOutcome {
                    batch_id,
                    completed,
                    failed: Some(result),
                    next_index: index,
                    finished: false,
                });
            }

            completed.push(result);
            self.save_checkpoint(&BatchCheckpoint {
                batch_id: batch_id.clone(),
                next_index: index + 1,
            })
            .await?;
        }

        self.remove_checkpoint().await?;
        info!(batch = %batch_id, completed = completed.len(), "batch finished");
        Ok(BatchOutcome {
            batch_id,
            completed,
            failed: None,
            next_index: items.len(),
            finished: true,
        })
    }

    async fn load_checkpoint(&self) -> Result<Option<BatchCheckpoint>, EngineError> {
        match tokio::fs::read(&self.checkpoint_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|err| EngineError::Checkpoint(format!("unreadable checkpoint: {err}"))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(EngineError::Checkpoint(err.to_string())),
        }
    }

    async fn save_checkpoint(&self, checkpoint: &BatchCheckpoint) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec_pretty(checkpoint)
            .map_err(|err| EngineError::Checkpoint(err.to_string()))?;
        tokio::fs::write(&self.checkpoint_path, bytes)
            .await
            .map_err(|err| EngineError::Checkpoint(err.to_string()))
    }

    async fn remove_checkpoint(&self) -> Result<(), EngineError> {
        match tokio::fs::remove_file(&self.checkpoint_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(EngineError::Checkpoint(err.to_string())),
        }
    }
}
