use crate::events::StatusEventBus;
use blocketch_error::{StampError, StampResult};
use blocketch_types::{
    Envelope, FailureReason, Fingerprint, StatusEvent, Submission, SubmissionStatus,
    TransitionError,
};
use tracing::{debug, warn};

/// A submission bound to the event bus: every accepted transition is
/// published exactly once, in order.
pub(crate) struct SubmissionTracker {
    submission: Submission,
    bus: StatusEventBus,
    sender_log: String,
}

fn illegal(e: TransitionError) -> StampError {
    StampError::internal(e.to_string())
}

impl SubmissionTracker {
    pub fn start(envelope: Envelope, bus: StatusEventBus, sender_log: String) -> Self {
        let tracker = Self {
            submission: Submission::receive(envelope),
            bus,
            sender_log,
        };
        tracker.emit(StatusEvent::new(
            tracker.submission.id(),
            tracker.submission.sender(),
            SubmissionStatus::Received,
            0,
        ));
        tracker
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn content(&self) -> StampResult<&[u8]> {
        self.submission
            .raw_content()
            .ok_or_else(|| StampError::internal("message content already released"))
    }

    pub fn fingerprinted(&mut self, fingerprint: Fingerprint) -> StampResult<()> {
        self.submission.fingerprinted(fingerprint).map_err(illegal)?;
        self.emit_current();
        Ok(())
    }

    /// Returns the attempt number just started
    pub fn proof_requested(&mut self) -> StampResult<u32> {
        let attempt = self.submission.proof_requested().map_err(illegal)?;
        self.emit_current();
        Ok(attempt)
    }

    pub fn advance(&mut self, next: SubmissionStatus) -> StampResult<()> {
        self.submission.advance(next).map_err(illegal)?;
        self.emit_current();
        Ok(())
    }

    /// Move to Failed, classifying `error`
    pub fn fail(&mut self, error: &StampError) -> FailureReason {
        let reason = error.failure_reason();
        if let Err(e) = self.submission.fail(reason) {
            warn!(
                submission_id = %self.submission.id(),
                error = %e,
                "Submission already terminal, failure not recorded"
            );
            return self.submission.failure_reason().unwrap_or(reason);
        }

        self.emit(
            StatusEvent::new(
                self.submission.id(),
                self.submission.sender(),
                SubmissionStatus::Failed,
                self.submission.attempts(),
            )
            .with_failure(reason, error.to_string()),
        );
        reason
    }

    fn emit_current(&self) {
        self.emit(StatusEvent::new(
            self.submission.id(),
            self.submission.sender(),
            self.submission.status(),
            self.submission.attempts(),
        ));
    }

    fn emit(&self, event: StatusEvent) {
        debug!(
            submission_id = %event.submission_id,
            sender = %self.sender_log,
            status = %event.status,
            attempt = event.attempt,
            "Submission transition"
        );
        self.bus.publish(event);
    }
}
