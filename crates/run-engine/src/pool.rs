//! Bounded session pool.
//!
//! Each run owns exactly one portal session for its lifetime and sessions
//! are expensive, so concurrent runs are capped by a small fixed pool;
//! acquisition blocks the next run until a slot frees.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

pub struct SessionPool {
    slots: Arc<Semaphore>,
    size: usize,
}

impl SessionPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Block until a session slot frees. The permit releases the slot on
    /// drop.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        debug!(available = self.available(), "acquiring session slot");
        // The semaphore is never closed while the pool is alive.
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .expect("session pool semaphore closed")
    }
}
