// ============================================================================
// Submission Pipeline
// ============================================================================
//
// Drives one inbound message through its lifecycle:
//
//   Received -> Fingerprinted -> ProofRequested (xN) -> ProofObtained
//            -> Persisted -> Confirmed
//
// Any stage may end in Failed with a classified reason.
//
// Flow:
// 1. Fingerprint the content (EncodingError ends the submission at once)
// 2. Take the per-fingerprint lock, then look for a stored proof
//    - hit:  jump to Persisted with the stored record, no authority request
//    - miss: wait for an admission permit, request the proof with bounded
//            exponential-backoff retries, persist via putIfAbsent
// 3. Release the lock, send the confirmation (retrying transient failures)
//
// Guarantees:
// - at most `max_concurrent_proof_requests` submissions in ProofRequested
// - a stored proof is never rolled back, whatever happens afterwards
// - the whole lifecycle is bounded by `submission_deadline`
// - one submission's failure never affects another
//
// ============================================================================

pub mod admission;
pub mod coalesce;
mod tracker;

pub use admission::{AdmissionControl, AdmissionPermit};
pub use coalesce::FingerprintLocks;

use crate::confirmation::ConfirmationDispatcher;
use crate::events::StatusEventBus;
use crate::fingerprint::Fingerprinter;
use crate::proof_store::ProofStore;
use crate::retry::{RetryPolicy, execute_with_retry};
use crate::timestamp::TimestampClient;
use crate::utils::LogIdentity;
use blocketch_config::Config;
use blocketch_error::{ProofFailure, StampError, StampResult};
use blocketch_metrics::{
    PROOF_REQUEST_DURATION_SECONDS, PROOF_REQUESTS_TOTAL, PROOF_STORE_WRITES_TOTAL,
    SUBMISSIONS_RECEIVED_TOTAL,
};
use blocketch_types::{
    Envelope, FailureReason, Fingerprint, ProofRecord, SmtpReply, SubmissionId,
    SubmissionStatus, SystemAlert,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info, info_span, warn};
use tracker::SubmissionTracker;

/// Reply for a confirmed submission
pub const ACCEPTED_REPLY_CODE: u16 = 250;
pub const ACCEPTED_REPLY_TEXT: &str = "2.0.0 Timestamp proof sent";

/// Pipeline policy
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_concurrent_proof_requests: usize,
    pub proof_retry: RetryPolicy,
    pub storage_retry: RetryPolicy,
    /// Bound for a single proof request attempt
    pub request_timeout: Duration,
    /// Bound from Received to a terminal state
    pub submission_deadline: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_proof_requests: config.pipeline.max_concurrent_proof_requests,
            proof_retry: RetryPolicy::for_proof_requests(&config.pipeline),
            storage_retry: RetryPolicy::for_storage(&config.pipeline),
            request_timeout: config.calendar.request_timeout,
            submission_deadline: config.pipeline.submission_deadline,
        }
    }
}

/// Terminal view of one submission
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub submission_id: SubmissionId,
    pub received_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub failure_reason: Option<FailureReason>,
    pub fingerprint: Option<Fingerprint>,
    /// Stored proof, when the submission got as far as Persisted
    pub record: Option<ProofRecord>,
    /// Proof request attempts made by this submission
    pub attempts: u32,
    /// Error message for Failed submissions
    pub error: Option<String>,
    /// Reply for the sending mail server
    pub reply: SmtpReply,
}

impl SubmissionOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.status == SubmissionStatus::Confirmed
    }
}

pub struct SubmissionPipeline {
    fingerprinter: Arc<dyn Fingerprinter>,
    timestamp: Arc<dyn TimestampClient>,
    store: Arc<dyn ProofStore>,
    dispatcher: ConfirmationDispatcher,
    bus: StatusEventBus,
    admission: AdmissionControl,
    locks: FingerprintLocks,
    settings: PipelineSettings,
    identity: LogIdentity,
}

impl SubmissionPipeline {
    pub fn new(
        fingerprinter: Arc<dyn Fingerprinter>,
        timestamp: Arc<dyn TimestampClient>,
        store: Arc<dyn ProofStore>,
        dispatcher: ConfirmationDispatcher,
        bus: StatusEventBus,
        settings: PipelineSettings,
        identity: LogIdentity,
    ) -> Self {
        Self {
            fingerprinter,
            timestamp,
            store,
            dispatcher,
            bus,
            admission: AdmissionControl::new(settings.max_concurrent_proof_requests),
            locks: FingerprintLocks::new(),
            settings,
            identity,
        }
    }

    pub fn bus(&self) -> &StatusEventBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn ProofStore> {
        &self.store
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Mail intake: run the submission to completion and answer the
    /// sending server
    pub async fn handle_envelope(&self, envelope: Envelope) -> SmtpReply {
        self.submit(envelope).await.reply
    }

    /// Run one submission to a terminal state
    pub async fn submit(&self, envelope: Envelope) -> SubmissionOutcome {
        SUBMISSIONS_RECEIVED_TOTAL.inc();
        let sender_log = self.identity.address(&envelope.sender);
        let mut tracker = SubmissionTracker::start(envelope, self.bus.clone(), sender_log.clone());
        let span = info_span!(
            "submission",
            submission_id = %tracker.submission().id(),
            sender = %sender_log,
            recipient = %tracker.submission().recipient()
        );

        async move {
            let started = Instant::now();
            let deadline = self.settings.submission_deadline;

            let result = match tokio::time::timeout(deadline, self.run(&mut tracker)).await {
                Ok(result) => result,
                Err(_) => Err(StampError::DeadlineExceeded(deadline)),
            };

            let (reply, record, error) = match result {
                Ok(record) => {
                    info!(
                        fingerprint = %record.fingerprint.short(),
                        attempts = tracker.submission().attempts(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Submission confirmed"
                    );
                    (
                        SmtpReply::new(ACCEPTED_REPLY_CODE, ACCEPTED_REPLY_TEXT),
                        Some(record),
                        None,
                    )
                }
                Err(e) => {
                    e.log();
                    if e.is_operational_alert() {
                        self.bus.alert(SystemAlert::new(e.error_code(), e.to_string()));
                    }
                    let reason = tracker.fail(&e);
                    warn!(
                        reason = %reason,
                        error_code = e.error_code(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Submission failed"
                    );
                    (e.smtp_reply(), None, Some(e.to_string()))
                }
            };

            let submission = tracker.submission();
            SubmissionOutcome {
                submission_id: submission.id(),
                received_at: submission.received_at(),
                status: submission.status(),
                failure_reason: submission.failure_reason(),
                fingerprint: submission.fingerprint(),
                record,
                attempts: submission.attempts(),
                error,
                reply,
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, tracker: &mut SubmissionTracker) -> StampResult<ProofRecord> {
        let fingerprint = self.fingerprinter.fingerprint(tracker.content()?)?;
        tracker.fingerprinted(fingerprint)?;
        debug!(fingerprint = %fingerprint.short(), "Fingerprinted");

        let flight = self.locks.lock(fingerprint).await;
        let record = match self.stored_record(&fingerprint).await? {
            Some(existing) => {
                info!(
                    fingerprint = %fingerprint.short(),
                    "Reusing stored proof, no authority request"
                );
                tracker.advance(SubmissionStatus::Persisted)?;
                existing
            }
            None => {
                let proof = self.obtain_proof(tracker, &fingerprint).await?;
                let record = self.persist(&fingerprint, proof).await?;
                tracker.advance(SubmissionStatus::Persisted)?;
                record
            }
        };
        drop(flight);

        self.dispatcher
            .dispatch(tracker.submission().sender(), &record)
            .await?;
        tracker.advance(SubmissionStatus::Confirmed)?;
        Ok(record)
    }

    async fn stored_record(&self, fingerprint: &Fingerprint) -> StampResult<Option<ProofRecord>> {
        let store = &self.store;
        execute_with_retry(&self.settings.storage_retry, "proof_store.get", |_| async move {
            store.get(fingerprint).await
        })
        .await
    }

    /// ProofRequested stage, holding an admission permit throughout
    /// (backoff delays included)
    async fn obtain_proof(
        &self,
        tracker: &mut SubmissionTracker,
        fingerprint: &Fingerprint,
    ) -> StampResult<Vec<u8>> {
        let _permit = self.admission.acquire().await?;
        let policy = &self.settings.proof_retry;

        loop {
            let attempt = tracker.proof_requested()?;
            let started = Instant::now();

            let result = match tokio::time::timeout(
                self.settings.request_timeout,
                self.timestamp.request_proof(fingerprint),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProofFailure::Timeout(self.settings.request_timeout)),
            };
            PROOF_REQUEST_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

            let failure = match result {
                Ok(proof) => {
                    PROOF_REQUESTS_TOTAL.with_label_values(&["success"]).inc();
                    tracker.advance(SubmissionStatus::ProofObtained)?;
                    debug!(attempt, proof_len = proof.len(), "Proof obtained");
                    return Ok(proof);
                }
                Err(failure) => failure,
            };

            PROOF_REQUESTS_TOTAL
                .with_label_values(&[failure_label(&failure)])
                .inc();
            let error = StampError::from(failure);

            if !error.is_transient() {
                return Err(error);
            }
            if !policy.allows_retry(attempt) {
                return Err(error.exhausted(attempt));
            }

            let backoff = policy.backoff(attempt);
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Proof request failed, will retry"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// putIfAbsent with storage retries; the returned record is the one that
    /// won, which may not carry `proof`
    async fn persist(&self, fingerprint: &Fingerprint, proof: Vec<u8>) -> StampResult<ProofRecord> {
        let store = &self.store;
        let proof = &proof;
        let outcome = execute_with_retry(
            &self.settings.storage_retry,
            "proof_store.put_if_absent",
            |_| async move { store.put_if_absent(fingerprint, proof.clone()).await },
        )
        .await?;

        PROOF_STORE_WRITES_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();
        if !outcome.was_created() {
            info!(
                fingerprint = %fingerprint.short(),
                "Proof already stored by another writer, adopting it"
            );
        }
        Ok(outcome.into_record())
    }
}

fn failure_label(failure: &ProofFailure) -> &'static str {
    match failure {
        ProofFailure::Unreachable(_) => "unreachable",
        ProofFailure::Rejected(_) => "rejected",
        ProofFailure::Timeout(_) => "timeout",
    }
}
