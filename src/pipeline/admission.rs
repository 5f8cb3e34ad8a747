use blocketch_error::{StampError, StampResult};
use blocketch_metrics::PROOF_REQUESTS_IN_FLIGHT;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bound on submissions simultaneously in ProofRequested.
///
/// Submissions that cannot get a permit wait (in Fingerprinted) until one is
/// released. Waiters are served in FIFO order.
#[derive(Clone, Debug)]
pub struct AdmissionControl {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// Released on drop, including when the holding task is cancelled
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        PROOF_REQUESTS_IN_FLIGHT.dec();
    }
}

impl AdmissionControl {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub async fn acquire(&self) -> StampResult<AdmissionPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StampError::internal("admission control closed"))?;
        PROOF_REQUESTS_IN_FLIGHT.inc();
        Ok(AdmissionPermit { _permit: permit })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }
}
