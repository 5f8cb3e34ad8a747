//! Prometheus metrics for the Blocketch timestamping service
//!
//! Provides centralized metrics collection for monitoring:
//! - Submission lifecycle (derived from the status event stream)
//! - Timestamp authority requests
//! - Proof store writes
//! - Confirmation delivery
//! - Operational alerts

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder, opts,
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
};

// ============================================================================
// Submission Metrics
// ============================================================================

/// Total number of inbound messages accepted for processing
pub static SUBMISSIONS_RECEIVED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "blocketch_submissions_received_total",
        "Total number of inbound messages accepted for processing"
    ))
    .expect("Failed to register SUBMISSIONS_RECEIVED_TOTAL metric")
});

/// Status transitions observed on the event stream (by status)
pub static STATUS_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "blocketch_status_transitions_total",
            "Submission status transitions observed on the event stream"
        ),
        &["status"]
    )
    .expect("Failed to register STATUS_TRANSITIONS_TOTAL metric")
});

/// Failed submissions (by failure reason)
pub static SUBMISSION_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "blocketch_submission_failures_total",
            "Submissions that reached Failed, by failure reason"
        ),
        &["reason"]
    )
    .expect("Failed to register SUBMISSION_FAILURES_TOTAL metric")
});

// ============================================================================
// Timestamp Authority Metrics
// ============================================================================

/// Proof requests (by result: success, unreachable, rejected, timeout)
pub static PROOF_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "blocketch_proof_requests_total",
            "Proof requests sent to timestamp authorities, by result"
        ),
        &["result"]
    )
    .expect("Failed to register PROOF_REQUESTS_TOTAL metric")
});

/// Histogram of proof request latency
pub static PROOF_REQUEST_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "blocketch_proof_request_duration_seconds",
        "Histogram of proof request latency"
    )
    .expect("Failed to register PROOF_REQUEST_DURATION_SECONDS metric")
});

/// Submissions currently holding an admission permit
pub static PROOF_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "blocketch_proof_requests_in_flight",
        "Submissions currently in ProofRequested"
    ))
    .expect("Failed to register PROOF_REQUESTS_IN_FLIGHT metric")
});

// ============================================================================
// Storage & Delivery Metrics
// ============================================================================

/// Proof store writes (by result: created, existing)
pub static PROOF_STORE_WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "blocketch_proof_store_writes_total",
            "putIfAbsent calls, by whether a new record was created"
        ),
        &["result"]
    )
    .expect("Failed to register PROOF_STORE_WRITES_TOTAL metric")
});

/// Confirmation mails handed to the outbound transport
pub static CONFIRMATIONS_SENT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "blocketch_confirmations_sent_total",
        "Confirmation mails accepted by the outbound transport"
    ))
    .expect("Failed to register CONFIRMATIONS_SENT_TOTAL metric")
});

/// System-level alerts (storage retry budget exhausted)
pub static OPERATIONAL_ALERTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "blocketch_operational_alerts_total",
        "System-level operational alerts raised"
    ))
    .expect("Failed to register OPERATIONAL_ALERTS_TOTAL metric")
});

/// Encode all registered metrics in the Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
