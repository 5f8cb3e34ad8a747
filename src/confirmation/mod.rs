// ============================================================================
// Confirmation Dispatcher
// ============================================================================
//
// Builds the reply carrying the stored proof and hands it to the outbound
// mail transport. Transient transport failures are retried; a permanent
// rejection ends the submission. Neither touches the stored proof.
//
// ============================================================================

pub mod mime;

use crate::retry::{RetryPolicy, execute_with_retry};
use async_trait::async_trait;
use blocketch_error::{StampError, StampResult, TransportError};
use blocketch_metrics::CONFIRMATIONS_SENT_TOTAL;
use blocketch_types::ProofRecord;
use std::sync::Arc;

pub const CONFIRMATION_SUBJECT: &str = "Your Timestamp Proof";
pub const PROOF_ATTACHMENT_NAME: &str = "proof.ots";
pub const PROOF_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Outbound mail as handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Plain text part
    pub body: String,
    pub attachment: Attachment,
}

/// Outbound mail transport
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Submit one message. `Transient` errors may be retried, `Permanent`
    /// ones must not be.
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

pub struct ConfirmationDispatcher {
    transport: Arc<dyn MailTransport>,
    from: String,
    retry: RetryPolicy,
}

impl ConfirmationDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, from: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            from: from.into(),
            retry,
        }
    }

    /// Confirmation for `to` carrying `record`'s proof unchanged
    pub fn build_message(&self, to: &str, record: &ProofRecord) -> OutboundMessage {
        let body = format!(
            "Your message has been timestamped.\r\n\
             \r\n\
             Fingerprint: {}\r\n\
             Recorded at: {}\r\n\
             \r\n\
             The attached {} is an OpenTimestamps proof for this fingerprint.\r\n\
             Keep it together with the original message; any OpenTimestamps\r\n\
             client can verify it once the calendar has anchored it.\r\n",
            record.fingerprint.to_hex(),
            record.created_at.to_rfc3339(),
            PROOF_ATTACHMENT_NAME,
        );

        OutboundMessage {
            from: self.from.clone(),
            to: to.to_string(),
            subject: CONFIRMATION_SUBJECT.to_string(),
            body,
            attachment: Attachment {
                filename: PROOF_ATTACHMENT_NAME.to_string(),
                content_type: PROOF_CONTENT_TYPE.to_string(),
                bytes: record.serialized_proof.clone(),
            },
        }
    }

    /// Send the confirmation, retrying transient transport failures.
    ///
    /// # Returns
    /// `DeliveryRejected` on permanent rejection, `DeliveryExhausted` when
    /// the retry budget runs out
    pub async fn dispatch(&self, to: &str, record: &ProofRecord) -> StampResult<()> {
        let message = self.build_message(to, record);

        let transport = &self.transport;
        let message = &message;
        execute_with_retry(&self.retry, "confirmation.send", |_| async move {
            transport.send(message).await.map_err(StampError::from)
        })
        .await?;

        CONFIRMATIONS_SENT_TOTAL.inc();
        Ok(())
    }
}
