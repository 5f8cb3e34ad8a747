// ============================================================================
// Status Event Bus
// ============================================================================
//
// Fan-out of lifecycle transitions to external observers.
//
// - Per-submission order is preserved (one publisher per submission)
// - Publishing never blocks and never fails the submission: with no
//   subscribers the event is dropped, a slow subscriber sees a gap (Lagged)
// - Operational alerts use a separate channel so they are never crowded out
//   by per-message traffic
//
// ============================================================================

use blocketch_types::{StatusEvent, SystemAlert};
use tokio::sync::broadcast;

const ALERT_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub struct StatusEventBus {
    status_tx: broadcast::Sender<StatusEvent>,
    alert_tx: broadcast::Sender<SystemAlert>,
}

impl StatusEventBus {
    /// # Arguments
    /// * `capacity` - Events buffered per subscriber before it starts lagging
    pub fn new(capacity: usize) -> Self {
        let (status_tx, _) = broadcast::channel(capacity.max(1));
        let (alert_tx, _) = broadcast::channel(ALERT_CAPACITY);
        Self {
            status_tx,
            alert_tx,
        }
    }

    pub fn publish(&self, event: StatusEvent) {
        // Err only means nobody is listening
        let _ = self.status_tx.send(event);
    }

    pub fn alert(&self, alert: SystemAlert) {
        let _ = self.alert_tx.send(alert);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<SystemAlert> {
        self.alert_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.status_tx.receiver_count()
    }
}

impl Default for StatusEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
