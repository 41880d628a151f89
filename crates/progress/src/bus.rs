//! In-process progress event bus.
//!
//! Broadcast-backed so the engine has no compile-time dependency on any
//! presentation layer; whoever wants progress subscribes. Delivery is
//! at-most-once per transition and may lag; slow consumers lose the oldest
//! events, never the ordering of `seq`.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::events::ProgressEvent;

pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    /// Publish one event. Having no subscriber is not an error.
    pub fn publish(&self, event: ProgressEvent) {
        trace!(run = %event.run_id, seq = event.seq, kind = ?event.kind, "progress event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

/// Materialise an mpsc receiver from a bus subscription so callers can
/// await events without handling broadcast semantics directly.
pub fn to_mpsc(bus: Arc<ProgressBus>, capacity: usize) -> mpsc::Receiver<ProgressEvent> {
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });
    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ProgressCounters, ProgressEventKind};
    use calibra_core_types::RunId;
    use chrono::Utc;

    fn event(seq: u64) -> ProgressEvent {
        ProgressEvent {
            run_id: RunId("run-1".to_string()),
            seq,
            kind: ProgressEventKind::GradeCompleted,
            counters: ProgressCounters::default(),
            percent: 0.0,
            eta_ms: None,
            message: String::new(),
            timestamp: Utc::now(),
            dispenser: None,
            grade: None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = ProgressBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(event(1));
        bus.publish(event(2));
        assert_eq!(rx.recv().await.unwrap().seq, 1);
        assert_eq!(rx.recv().await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let bus = ProgressBus::new(4);
        bus.publish(event(1));
    }

    #[tokio::test]
    async fn mpsc_bridge_forwards_events() {
        let bus = ProgressBus::new(16);
        let mut rx = to_mpsc(Arc::clone(&bus), 16);
        tokio::task::yield_now().await;
        bus.publish(event(9));
        assert_eq!(rx.recv().await.unwrap().seq, 9);
    }
}
