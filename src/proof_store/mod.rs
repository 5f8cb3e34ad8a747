// ============================================================================
// Proof Store
// ============================================================================
//
// Durable, append-only mapping fingerprint -> serialized proof.
//
// Contract:
// - put_if_absent is atomic and first-writer-wins: if a record exists, it is
//   returned and the new proof is discarded
// - a write is durable before put_if_absent returns
// - concurrent readers never observe a partially written record
//
// ============================================================================

pub mod fs;
pub mod memory;

pub use fs::FsProofStore;
pub use memory::MemoryProofStore;

use async_trait::async_trait;
use blocketch_error::StampResult;
use blocketch_types::{Fingerprint, ProofRecord};

/// Result of `put_if_absent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// This call created the record
    Created(ProofRecord),
    /// A record already existed; the offered proof was discarded
    Existing(ProofRecord),
}

impl PutOutcome {
    pub fn record(&self) -> &ProofRecord {
        match self {
            PutOutcome::Created(record) | PutOutcome::Existing(record) => record,
        }
    }

    pub fn into_record(self) -> ProofRecord {
        match self {
            PutOutcome::Created(record) | PutOutcome::Existing(record) => record,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, PutOutcome::Created(_))
    }

    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            PutOutcome::Created(_) => "created",
            PutOutcome::Existing(_) => "existing",
        }
    }
}

#[async_trait]
pub trait ProofStore: Send + Sync {
    /// Atomically store `proof` unless a record for `fingerprint` exists
    async fn put_if_absent(&self, fingerprint: &Fingerprint, proof: Vec<u8>)
    -> StampResult<PutOutcome>;

    /// Fetch the record for `fingerprint`, if any
    async fn get(&self, fingerprint: &Fingerprint) -> StampResult<Option<ProofRecord>>;

    /// Check that the store is usable (health endpoint)
    async fn ping(&self) -> StampResult<()>;
}
