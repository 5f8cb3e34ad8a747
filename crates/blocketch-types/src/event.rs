// ============================================================================
// Status Events & Operational Alerts
// ============================================================================
//
// Status events are advisory telemetry for external observers (the monitor).
// They are never persisted; losing one must not affect any submission.
//
// ============================================================================

use crate::submission::{FailureReason, SubmissionId, SubmissionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One lifecycle transition of one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub submission_id: SubmissionId,
    pub sender: String,
    pub status: SubmissionStatus,
    /// Proof request attempt number (0 before the first request)
    pub attempt: u32,
    /// Set only when status is Failed
    pub failure: Option<FailureReason>,
    /// Human-readable detail (error message on failure)
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(
        submission_id: SubmissionId,
        sender: impl Into<String>,
        status: SubmissionStatus,
        attempt: u32,
    ) -> Self {
        Self {
            submission_id,
            sender: sender.into(),
            status,
            attempt,
            failure: None,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn with_failure(mut self, reason: FailureReason, detail: impl Into<String>) -> Self {
        self.failure = Some(reason);
        self.detail = Some(detail.into());
        self
    }
}

/// System-level condition distinct from per-message status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAlert {
    /// Stable error code (e.g. "STORAGE_EXHAUSTED")
    pub code: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl SystemAlert {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}
