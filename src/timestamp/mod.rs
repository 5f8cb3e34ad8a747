// ============================================================================
// Timestamp Client
// ============================================================================
//
// Talks to external calendar / timestamping authorities. One call submits a
// fingerprint and returns either a completed proof blob or a classified
// failure (Unreachable, Rejected, Timeout). Calls are independent and keep
// no state on failure; retries are the caller's decision.
//
// - calendar: one OpenTimestamps calendar over HTTP
// - fanout:   the same fingerprint to several calendars, first success wins
// - ots:      detached timestamp file framing of the returned proof
//
// ============================================================================

pub mod calendar;
pub mod fanout;
pub mod ots;

pub use calendar::CalendarClient;
pub use fanout::FanoutClient;

use async_trait::async_trait;
use blocketch_error::ProofFailure;
use blocketch_types::Fingerprint;

/// Completed proof blob or classified failure
pub type ProofResult = Result<Vec<u8>, ProofFailure>;

/// A timestamping authority (or a group of them)
#[async_trait]
pub trait TimestampClient: Send + Sync {
    /// Request a proof of existence for `fingerprint`
    async fn request_proof(&self, fingerprint: &Fingerprint) -> ProofResult;

    /// Human-readable name for logs
    fn name(&self) -> String;
}
