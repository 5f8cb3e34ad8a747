// ============================================================================
// Submission Lifecycle
// ============================================================================
//
// One Submission per inbound message. Status only moves forward:
//
//   Received -> Fingerprinted -> ProofRequested -> ProofObtained
//            -> Persisted -> Confirmed
//
// with Failed reachable from every non-terminal state, ProofRequested
// allowed to repeat (retry of a transient authority failure), and
// Fingerprinted allowed to jump straight to Persisted when a proof for the
// same content is already stored.
//
// ============================================================================

use crate::envelope::Envelope;
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Process-unique submission identifier, assigned at intake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle stage of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Received,
    Fingerprinted,
    ProofRequested,
    ProofObtained,
    Persisted,
    Confirmed,
    Failed,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Confirmed | SubmissionStatus::Failed)
    }

    /// Whether `next` is a legal transition from `self`
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Failed) => true,
            (Received, Fingerprinted) => true,
            (Fingerprinted, ProofRequested) => true,
            (Fingerprinted, Persisted) => true,
            (ProofRequested, ProofRequested) => true,
            (ProofRequested, ProofObtained) => true,
            (ProofObtained, Persisted) => true,
            (Persisted, Confirmed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Received => "received",
            SubmissionStatus::Fingerprinted => "fingerprinted",
            SubmissionStatus::ProofRequested => "proof_requested",
            SubmissionStatus::ProofObtained => "proof_obtained",
            SubmissionStatus::Persisted => "persisted",
            SubmissionStatus::Confirmed => "confirmed",
            SubmissionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified reason attached to a Failed submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// Content could not be decoded as message text
    EncodingError,
    /// Timestamp authorities unreachable or timing out after all retries
    ProofServiceError,
    /// Timestamp authority refused the request
    ProofServiceRejected,
    /// Durable write kept failing
    StorageError,
    /// Outbound confirmation could not be delivered (proof is still stored)
    DeliveryError,
    /// Global wall-clock deadline elapsed
    DeadlineExceeded,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::EncodingError => "encoding_error",
            FailureReason::ProofServiceError => "proof_service_error",
            FailureReason::ProofServiceRejected => "proof_service_rejected",
            FailureReason::StorageError => "storage_error",
            FailureReason::DeliveryError => "delivery_error",
            FailureReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound message's journey through the pipeline
#[derive(Debug, Clone)]
pub struct Submission {
    id: SubmissionId,
    sender: String,
    recipient: String,
    raw_content: Option<Vec<u8>>,
    fingerprint: Option<Fingerprint>,
    status: SubmissionStatus,
    failure_reason: Option<FailureReason>,
    attempts: u32,
    received_at: DateTime<Utc>,
}

impl Submission {
    /// Create a submission in the Received state from a parsed envelope
    pub fn receive(envelope: Envelope) -> Self {
        Self {
            id: SubmissionId::new(),
            sender: envelope.sender,
            recipient: envelope.recipient,
            raw_content: Some(envelope.content),
            fingerprint: None,
            status: SubmissionStatus::Received,
            failure_reason: None,
            attempts: 0,
            received_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn raw_content(&self) -> Option<&[u8]> {
        self.raw_content.as_deref()
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.failure_reason
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Record the fingerprint and drop the raw content.
    ///
    /// Moves Received -> Fingerprinted. The fingerprint is set exactly once.
    pub fn fingerprinted(&mut self, fingerprint: Fingerprint) -> Result<(), TransitionError> {
        if self.fingerprint.is_some() {
            return Err(TransitionError::FingerprintAlreadySet);
        }
        self.advance(SubmissionStatus::Fingerprinted)?;
        self.fingerprint = Some(fingerprint);
        self.raw_content = None;
        Ok(())
    }

    /// Enter (or re-enter on retry) ProofRequested, counting the attempt
    pub fn proof_requested(&mut self) -> Result<u32, TransitionError> {
        self.advance(SubmissionStatus::ProofRequested)?;
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Move to Failed with a classified reason
    pub fn fail(&mut self, reason: FailureReason) -> Result<(), TransitionError> {
        self.advance(SubmissionStatus::Failed)?;
        self.failure_reason = Some(reason);
        self.raw_content = None;
        Ok(())
    }

    /// Generic forward transition, enforcing monotonicity
    pub fn advance(&mut self, next: SubmissionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Rejected state-machine transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    Illegal {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },
    FingerprintAlreadySet,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::Illegal { from, to } => {
                write!(f, "Illegal submission transition {} -> {}", from, to)
            }
            TransitionError::FingerprintAlreadySet => write!(f, "Fingerprint is already set"),
        }
    }
}

impl std::error::Error for TransitionError {}
