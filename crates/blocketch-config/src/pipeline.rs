// ============================================================================
// Submission Pipeline Configuration
// ============================================================================

use crate::constants::*;
use std::time::Duration;

/// Concurrency, retry and deadline policy of the submission pipeline
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Maximum submissions simultaneously in ProofRequested
    pub max_concurrent_proof_requests: usize,
    /// Total proof request attempts per submission (1 = no retry)
    pub max_retry_attempts: u32,
    /// Backoff before the second attempt; doubles per attempt
    pub initial_backoff: Duration,
    /// Cap for the exponential backoff
    pub max_backoff: Duration,
    /// Durable write attempts before raising an operational alert
    pub storage_max_attempts: u32,
    /// Confirmation send attempts before failing the submission
    pub delivery_max_attempts: u32,
    /// Wall-clock budget from Received to a terminal state
    pub submission_deadline: Duration,
    /// Status event buffer per subscriber; slow subscribers see gaps
    pub event_bus_capacity: usize,
}

impl PipelineConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            max_concurrent_proof_requests: std::env::var("MAX_CONCURRENT_PROOF_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENT_PROOF_REQUESTS),
            max_retry_attempts: std::env::var("MAX_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS),
            initial_backoff: Duration::from_millis(
                std::env::var("RETRY_INITIAL_BACKOFF_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_INITIAL_BACKOFF_MS),
            ),
            max_backoff: Duration::from_millis(
                std::env::var("RETRY_MAX_BACKOFF_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_MAX_BACKOFF_MS),
            ),
            storage_max_attempts: std::env::var("STORAGE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_STORAGE_MAX_ATTEMPTS),
            delivery_max_attempts: std::env::var("DELIVERY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DELIVERY_MAX_ATTEMPTS),
            submission_deadline: Duration::from_secs(
                std::env::var("SUBMISSION_DEADLINE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SUBMISSION_DEADLINE_SECS),
            ),
            event_bus_capacity: std::env::var("EVENT_BUS_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_EVENT_BUS_CAPACITY),
        }
    }
}
