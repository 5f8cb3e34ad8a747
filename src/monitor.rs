// ============================================================================
// Processing Monitor
// ============================================================================
//
// Consumer of the status event bus. Suspends on the channel until an event
// arrives and keeps:
// - the latest status of the most recent submissions (bounded, oldest evicted)
// - processed / failed counts, derived from terminal events
// - the most recent operational alerts
//
// Events are advisory: duplicates are ignored, gaps (Lagged) are counted and
// skipped. Nothing here feeds back into submission processing.
//
// ============================================================================

use crate::events::StatusEventBus;
use crate::utils::LogIdentity;
use blocketch_metrics::{
    OPERATIONAL_ALERTS_TOTAL, STATUS_TRANSITIONS_TOTAL, SUBMISSION_FAILURES_TOTAL,
};
use blocketch_types::{
    FailureReason, StatusEvent, SubmissionId, SubmissionStatus, SystemAlert,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_HISTORY_LIMIT: usize = 500;
const ALERT_HISTORY_LIMIT: usize = 32;
/// Evicted terminal ids remembered per history slot
const FINALIZED_PER_HISTORY: usize = 4;

/// Latest known state of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRow {
    pub submission_id: SubmissionId,
    /// Sender as allowed in logs (hashed unless identifiers are enabled)
    pub sender: String,
    pub status: SubmissionStatus,
    pub attempt: u32,
    pub failure: Option<FailureReason>,
    pub detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub in_progress: usize,
    /// Events skipped because the monitor fell behind
    pub lagged_events: u64,
    /// Most recently seen first
    pub recent: Vec<SubmissionRow>,
    pub alerts: Vec<SystemAlert>,
}

struct MonitorState {
    rows: HashMap<SubmissionId, SubmissionRow>,
    order: VecDeque<SubmissionId>,
    /// Terminal submissions evicted from `rows`; later events for them are
    /// duplicates and must not be counted again
    finalized: HashSet<SubmissionId>,
    finalized_order: VecDeque<SubmissionId>,
    processed: u64,
    failed: u64,
    lagged_events: u64,
    alerts: VecDeque<SystemAlert>,
    history_limit: usize,
}

impl MonitorState {
    fn new(history_limit: usize) -> Self {
        Self {
            rows: HashMap::new(),
            order: VecDeque::new(),
            finalized: HashSet::new(),
            finalized_order: VecDeque::new(),
            processed: 0,
            failed: 0,
            lagged_events: 0,
            alerts: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Returns false when the event was a duplicate or stale
    fn apply(&mut self, event: &StatusEvent, sender: String) -> bool {
        match self.rows.get_mut(&event.submission_id) {
            Some(row) => {
                if !advances(row, event) {
                    return false;
                }
                row.status = event.status;
                row.attempt = event.attempt;
                row.failure = event.failure;
                row.detail = event.detail.clone();
                row.updated_at = event.at;
            }
            None if self.finalized.contains(&event.submission_id) => return false,
            None => {
                self.rows.insert(
                    event.submission_id,
                    SubmissionRow {
                        submission_id: event.submission_id,
                        sender,
                        status: event.status,
                        attempt: event.attempt,
                        failure: event.failure,
                        detail: event.detail.clone(),
                        updated_at: event.at,
                    },
                );
                self.order.push_back(event.submission_id);
                while self.order.len() > self.history_limit {
                    if let Some(oldest) = self.order.pop_front() {
                        self.evict(oldest);
                    }
                }
            }
        }

        match event.status {
            SubmissionStatus::Confirmed => self.processed += 1,
            SubmissionStatus::Failed => self.failed += 1,
            _ => {}
        }
        true
    }

    fn evict(&mut self, id: SubmissionId) {
        let Some(row) = self.rows.remove(&id) else {
            return;
        };
        if !row.status.is_terminal() {
            return;
        }
        self.finalized.insert(id);
        self.finalized_order.push_back(id);
        while self.finalized_order.len() > self.history_limit * FINALIZED_PER_HISTORY {
            if let Some(oldest) = self.finalized_order.pop_front() {
                self.finalized.remove(&oldest);
            }
        }
    }

    fn push_alert(&mut self, alert: SystemAlert) {
        self.alerts.push_front(alert);
        self.alerts.truncate(ALERT_HISTORY_LIMIT);
    }

    fn snapshot(&self) -> MonitorSnapshot {
        let recent: Vec<SubmissionRow> = self
            .order
            .iter()
            .rev()
            .filter_map(|id| self.rows.get(id).cloned())
            .collect();

        MonitorSnapshot {
            processed: self.processed,
            failed: self.failed,
            in_progress: recent.iter().filter(|r| !r.status.is_terminal()).count(),
            lagged_events: self.lagged_events,
            recent,
            alerts: self.alerts.iter().cloned().collect(),
        }
    }
}

/// Position in the lifecycle; gaps left by lagging are allowed, moving
/// backwards is not
fn stage(status: SubmissionStatus) -> u8 {
    match status {
        SubmissionStatus::Received => 0,
        SubmissionStatus::Fingerprinted => 1,
        SubmissionStatus::ProofRequested => 2,
        SubmissionStatus::ProofObtained => 3,
        SubmissionStatus::Persisted => 4,
        SubmissionStatus::Confirmed | SubmissionStatus::Failed => 5,
    }
}

fn advances(row: &SubmissionRow, event: &StatusEvent) -> bool {
    if row.status.is_terminal() {
        return false;
    }
    if row.status == event.status {
        // Retry of a proof request
        return event.status == SubmissionStatus::ProofRequested && event.attempt > row.attempt;
    }
    stage(event.status) > stage(row.status)
}

#[derive(Clone)]
pub struct ProcessingMonitor {
    state: Arc<RwLock<MonitorState>>,
}

impl ProcessingMonitor {
    /// Subscribe to `bus` and start the consuming task.
    ///
    /// The task ends when the bus is dropped.
    pub fn spawn(
        bus: &StatusEventBus,
        history_limit: usize,
        identity: LogIdentity,
    ) -> (Self, JoinHandle<()>) {
        let monitor = Self {
            state: Arc::new(RwLock::new(MonitorState::new(history_limit))),
        };
        let handle = tokio::spawn(monitor.clone().run(
            bus.subscribe(),
            bus.subscribe_alerts(),
            identity,
        ));
        (monitor, handle)
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        self.state.read().await.snapshot()
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<StatusEvent>,
        mut alerts: broadcast::Receiver<SystemAlert>,
        identity: LogIdentity,
    ) {
        let mut events_open = true;
        let mut alerts_open = true;

        while events_open || alerts_open {
            tokio::select! {
                received = events.recv(), if events_open => match received {
                    Ok(event) => self.record_event(&event, &identity).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Monitor fell behind the status event stream");
                        self.state.write().await.lagged_events += skipped;
                    }
                    Err(RecvError::Closed) => events_open = false,
                },
                received = alerts.recv(), if alerts_open => match received {
                    Ok(alert) => self.record_alert(alert).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Monitor missed operational alerts");
                    }
                    Err(RecvError::Closed) => alerts_open = false,
                },
            }
        }

        info!("Status event bus closed, monitor stopped");
    }

    async fn record_event(&self, event: &StatusEvent, identity: &LogIdentity) {
        let applied = self
            .state
            .write()
            .await
            .apply(event, identity.address(&event.sender));
        if !applied {
            return;
        }

        STATUS_TRANSITIONS_TOTAL
            .with_label_values(&[event.status.as_str()])
            .inc();
        if let Some(reason) = event.failure {
            SUBMISSION_FAILURES_TOTAL
                .with_label_values(&[reason.as_str()])
                .inc();
        }
    }

    async fn record_alert(&self, alert: SystemAlert) {
        OPERATIONAL_ALERTS_TOTAL.inc();
        error!(
            code = %alert.code,
            message = %alert.message,
            "OPERATIONAL ALERT"
        );
        self.state.write().await.push_alert(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(id: SubmissionId, status: SubmissionStatus, attempt: u32) -> StatusEvent {
        StatusEvent::new(id, "alice@example.com", status, attempt)
    }

    #[test]
    fn test_counts_are_derived_from_terminal_events() {
        let mut state = MonitorState::new(10);
        let a = SubmissionId::new();
        let b = SubmissionId::new();

        for status in [
            SubmissionStatus::Received,
            SubmissionStatus::Fingerprinted,
            SubmissionStatus::Persisted,
            SubmissionStatus::Confirmed,
        ] {
            state.apply(&event(a, status, 0), "a".into());
        }
        state.apply(&event(b, SubmissionStatus::Received, 0), "b".into());
        state.apply(
            &event(b, SubmissionStatus::Failed, 0)
                .with_failure(FailureReason::EncodingError, "bad utf-8"),
            "b".into(),
        );

        let snapshot = state.snapshot();
        assert_eq!(snapshot.processed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.in_progress, 0);
        assert_eq!(snapshot.recent[0].submission_id, b);
        assert_eq!(snapshot.recent[0].failure, Some(FailureReason::EncodingError));
    }

    #[test]
    fn test_duplicates_and_stale_events_are_ignored() {
        let mut state = MonitorState::new(10);
        let id = SubmissionId::new();

        assert!(state.apply(&event(id, SubmissionStatus::Received, 0), "x".into()));
        assert!(state.apply(&event(id, SubmissionStatus::Fingerprinted, 0), "x".into()));
        assert!(state.apply(&event(id, SubmissionStatus::ProofRequested, 1), "x".into()));
        assert!(state.apply(&event(id, SubmissionStatus::ProofRequested, 2), "x".into()));
        assert!(!state.apply(&event(id, SubmissionStatus::ProofRequested, 2), "x".into()));
        assert!(!state.apply(&event(id, SubmissionStatus::Fingerprinted, 0), "x".into()));
        assert!(state.apply(&event(id, SubmissionStatus::Failed, 2), "x".into()));
        assert!(!state.apply(&event(id, SubmissionStatus::Failed, 2), "x".into()));

        assert_eq!(state.snapshot().failed, 1);
    }

    #[test]
    fn test_gaps_are_tolerated() {
        let mut state = MonitorState::new(10);
        let id = SubmissionId::new();

        state.apply(&event(id, SubmissionStatus::Fingerprinted, 0), "x".into());
        assert!(state.apply(&event(id, SubmissionStatus::Confirmed, 1), "x".into()));
        assert_eq!(state.snapshot().processed, 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = MonitorState::new(3);
        let ids: Vec<_> = (0..5).map(|_| SubmissionId::new()).collect();
        for id in &ids {
            state.apply(&event(*id, SubmissionStatus::Received, 0), "x".into());
        }

        let snapshot = state.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert_eq!(snapshot.recent[0].submission_id, ids[4]);
        assert!(!snapshot.recent.iter().any(|r| r.submission_id == ids[0]));
        assert_eq!(snapshot.in_progress, 3);
    }

    #[test]
    fn test_duplicate_terminal_after_eviction_is_not_recounted() {
        let mut state = MonitorState::new(1);
        let done = SubmissionId::new();
        let running = SubmissionId::new();

        state.apply(&event(done, SubmissionStatus::Received, 0), "x".into());
        assert!(state.apply(&event(done, SubmissionStatus::Confirmed, 1), "x".into()));
        // Evicts `done`
        state.apply(&event(running, SubmissionStatus::Received, 0), "y".into());
        assert_eq!(state.snapshot().recent.len(), 1);

        assert!(!state.apply(&event(done, SubmissionStatus::Confirmed, 1), "x".into()));
        assert_eq!(state.snapshot().processed, 1);

        // A submission evicted while still running is counted when it ends
        let late = SubmissionId::new();
        state.apply(&event(late, SubmissionStatus::Received, 0), "z".into());
        assert!(state.apply(&event(running, SubmissionStatus::Failed, 1), "y".into()));
        assert_eq!(state.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_monitor_consumes_bus() {
        let bus = StatusEventBus::new(16);
        let (monitor, handle) = ProcessingMonitor::spawn(&bus, 10, LogIdentity::hashed("salt"));

        let id = SubmissionId::new();
        bus.publish(event(id, SubmissionStatus::Received, 0));
        bus.publish(
            event(id, SubmissionStatus::Failed, 0)
                .with_failure(FailureReason::EncodingError, "bad"),
        );
        bus.alert(SystemAlert::new("STORAGE_EXHAUSTED", "disk full"));

        let mut snapshot = monitor.snapshot().await;
        for _ in 0..100 {
            if snapshot.failed == 1 && snapshot.alerts.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            snapshot = monitor.snapshot().await;
        }
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.alerts[0].code, "STORAGE_EXHAUSTED");
        assert!(!snapshot.recent[0].sender.contains('@'));

        drop(bus);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
