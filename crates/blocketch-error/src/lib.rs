use blocketch_types::{FailureReason, SmtpReply};
use std::time::Duration;
use thiserror::Error;

pub type StampResult<T> = Result<T, StampError>;

/// Classified failure returned by a timestamp authority client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofFailure {
    #[error("timestamp authority unreachable: {0}")]
    Unreachable(String),

    #[error("timestamp authority rejected request: {0}")]
    Rejected(String),

    #[error("timestamp authority timed out after {0:?}")]
    Timeout(Duration),
}

impl ProofFailure {
    /// Unreachable and Timeout are retried by the pipeline, Rejected is not
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProofFailure::Rejected(_))
    }
}

/// Classified failure returned by the outbound mail transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transient transport failure: {0}")]
    Transient(String),

    #[error("transport rejected message: {0}")]
    Permanent(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

/// Service error type
///
/// Covers every failure a submission can hit, plus the process-level
/// configuration and I/O errors. Per-submission errors are classified into a
/// `FailureReason` and an SMTP reply; nothing here panics or aborts other
/// submissions.
#[derive(Error, Debug)]
pub enum StampError {
    // ===== Content Errors =====
    #[error("Content is not valid message text: {0}")]
    Encoding(String),

    // ===== Timestamp Authority Errors =====
    #[error("Proof service unreachable: {0}")]
    ProofServiceUnreachable(String),

    #[error("Proof service timed out after {0:?}")]
    ProofServiceTimeout(Duration),

    #[error("Proof service rejected request: {0}")]
    ProofServiceRejected(String),

    #[error("Proof service failed after {attempts} attempts: {last_error}")]
    ProofServiceExhausted { attempts: u32, last_error: String },

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage failed after {attempts} attempts: {last_error}")]
    StorageExhausted { attempts: u32, last_error: String },

    // ===== Delivery Errors =====
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Delivery rejected: {0}")]
    DeliveryRejected(String),

    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    DeliveryExhausted { attempts: u32, last_error: String },

    // ===== Lifecycle Errors =====
    #[error("Submission deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl StampError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StampError::ProofServiceUnreachable(_)
                | StampError::ProofServiceTimeout(_)
                | StampError::Storage(_)
                | StampError::Io(_)
                | StampError::Delivery(_)
        )
    }

    /// Terminal failure reason recorded on the submission
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            StampError::Encoding(_) => FailureReason::EncodingError,
            StampError::ProofServiceRejected(_) => FailureReason::ProofServiceRejected,
            StampError::ProofServiceUnreachable(_)
            | StampError::ProofServiceTimeout(_)
            | StampError::ProofServiceExhausted { .. } => FailureReason::ProofServiceError,
            StampError::Storage(_) | StampError::Io(_) | StampError::StorageExhausted { .. } => {
                FailureReason::StorageError
            }
            StampError::Delivery(_)
            | StampError::DeliveryRejected(_)
            | StampError::DeliveryExhausted { .. } => FailureReason::DeliveryError,
            StampError::DeadlineExceeded(_) => FailureReason::DeadlineExceeded,
            // Anything unclassified is a local fault the sender can retry past
            _ => FailureReason::StorageError,
        }
    }

    /// Reply written back to the sending mail server.
    ///
    /// Permanent failures map to 5xx so the sender's MTA bounces instead of
    /// retrying; everything else is 4xx.
    pub fn smtp_reply(&self) -> SmtpReply {
        match self {
            StampError::Encoding(_) => {
                SmtpReply::new(554, "5.6.0 Message content could not be decoded")
            }
            StampError::ProofServiceRejected(_) => {
                SmtpReply::new(554, "5.7.0 Timestamp authority rejected the submission")
            }
            StampError::DeliveryRejected(_) => {
                SmtpReply::new(550, "5.1.1 Confirmation could not be delivered to sender")
            }
            StampError::ProofServiceUnreachable(_)
            | StampError::ProofServiceTimeout(_)
            | StampError::ProofServiceExhausted { .. } => {
                SmtpReply::new(451, "4.4.1 Timestamp service unavailable, try again later")
            }
            StampError::Delivery(_) | StampError::DeliveryExhausted { .. } => {
                SmtpReply::new(451, "4.4.2 Proof stored but confirmation delivery failed")
            }
            StampError::DeadlineExceeded(_) => {
                SmtpReply::new(451, "4.4.7 Processing deadline exceeded, try again later")
            }
            _ => SmtpReply::new(451, "4.3.0 Local error in processing"),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            StampError::Encoding(_) => "ENCODING_ERROR",
            StampError::ProofServiceUnreachable(_) => "PROOF_SERVICE_UNREACHABLE",
            StampError::ProofServiceTimeout(_) => "PROOF_SERVICE_TIMEOUT",
            StampError::ProofServiceRejected(_) => "PROOF_SERVICE_REJECTED",
            StampError::ProofServiceExhausted { .. } => "PROOF_SERVICE_EXHAUSTED",
            StampError::Storage(_) => "STORAGE_ERROR",
            StampError::Io(_) => "IO_ERROR",
            StampError::StorageExhausted { .. } => "STORAGE_EXHAUSTED",
            StampError::Delivery(_) => "DELIVERY_ERROR",
            StampError::DeliveryRejected(_) => "DELIVERY_REJECTED",
            StampError::DeliveryExhausted { .. } => "DELIVERY_EXHAUSTED",
            StampError::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            StampError::Config(_) => "CONFIG_ERROR",
            StampError::Json(_) => "JSON_ERROR",
            StampError::Internal(_) => "INTERNAL_ERROR",
            StampError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Storage that keeps failing threatens durability for every submission,
    /// so it is reported as a system-level alert, not only per message.
    pub fn is_operational_alert(&self) -> bool {
        matches!(self, StampError::StorageExhausted { .. })
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let code = self.error_code();

        if self.is_operational_alert() {
            tracing::error!(
                error = %self,
                error_code = %code,
                "Operational alert: durable storage is failing"
            );
        } else if self.is_transient() {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Transient error occurred"
            );
        } else if matches!(self, StampError::Encoding(_)) {
            tracing::info!(
                error = %self,
                error_code = %code,
                "Submission content rejected"
            );
        } else {
            tracing::warn!(
                error = %self,
                error_code = %code,
                "Submission failed"
            );
        }
    }
}

// ============================================================================
// Conversion from classified sub-errors
// ============================================================================

impl From<ProofFailure> for StampError {
    fn from(failure: ProofFailure) -> Self {
        match failure {
            ProofFailure::Unreachable(msg) => StampError::ProofServiceUnreachable(msg),
            ProofFailure::Rejected(msg) => StampError::ProofServiceRejected(msg),
            ProofFailure::Timeout(after) => StampError::ProofServiceTimeout(after),
        }
    }
}

impl From<TransportError> for StampError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Transient(msg) => StampError::Delivery(msg),
            TransportError::Permanent(msg) => StampError::DeliveryRejected(msg),
        }
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl StampError {
    /// Create an encoding error
    pub fn encoding(msg: impl Into<String>) -> Self {
        StampError::Encoding(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        StampError::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        StampError::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        StampError::Internal(msg.into())
    }

    /// Wrap the last transient error of an exhausted retry loop.
    ///
    /// The exhausted variant is picked from the error's own family, so the
    /// failure reason is preserved.
    pub fn exhausted(self, attempts: u32) -> Self {
        let last_error = self.to_string();
        match self.failure_reason() {
            FailureReason::ProofServiceError => StampError::ProofServiceExhausted {
                attempts,
                last_error,
            },
            FailureReason::StorageError => StampError::StorageExhausted {
                attempts,
                last_error,
            },
            FailureReason::DeliveryError => StampError::DeliveryExhausted {
                attempts,
                last_error,
            },
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_failure_classification() {
        assert!(ProofFailure::Unreachable("down".into()).is_transient());
        assert!(ProofFailure::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ProofFailure::Rejected("bad digest".into()).is_transient());
    }

    #[test]
    fn test_failure_reasons() {
        let rejected: StampError = ProofFailure::Rejected("no".into()).into();
        assert_eq!(rejected.failure_reason(), FailureReason::ProofServiceRejected);
        assert!(!rejected.is_transient());

        let exhausted = StampError::from(ProofFailure::Timeout(Duration::from_secs(2))).exhausted(3);
        assert!(matches!(
            exhausted,
            StampError::ProofServiceExhausted { attempts: 3, .. }
        ));
        assert_eq!(exhausted.failure_reason(), FailureReason::ProofServiceError);
        assert!(!exhausted.is_transient());
    }

    #[test]
    fn test_storage_exhaustion_is_an_alert() {
        let err = StampError::storage("disk full").exhausted(5);
        assert!(err.is_operational_alert());
        assert_eq!(err.error_code(), "STORAGE_EXHAUSTED");
        assert_eq!(err.failure_reason(), FailureReason::StorageError);

        assert!(!StampError::storage("disk full").is_operational_alert());
    }

    #[test]
    fn test_smtp_reply_mapping() {
        assert_eq!(StampError::encoding("bad utf-8").smtp_reply().code, 554);
        assert_eq!(
            StampError::ProofServiceRejected("no".into()).smtp_reply().code,
            554
        );
        assert_eq!(
            StampError::DeliveryRejected("no such user".into()).smtp_reply().code,
            550
        );

        let transient = [
            StampError::ProofServiceUnreachable("down".into()),
            StampError::storage("disk").exhausted(5),
            StampError::Delivery("conn reset".into()).exhausted(3),
            StampError::DeadlineExceeded(Duration::from_secs(600)),
        ];
        for err in transient {
            assert!(err.smtp_reply().is_transient(), "{} should be 4xx", err);
        }
    }

    #[test]
    fn test_transport_error_conversion() {
        let transient: StampError = TransportError::Transient("421".into()).into();
        assert!(transient.is_transient());

        let permanent: StampError = TransportError::Permanent("550".into()).into();
        assert!(matches!(permanent, StampError::DeliveryRejected(_)));
        assert_eq!(permanent.failure_reason(), FailureReason::DeliveryError);
    }
}
