// ============================================================================
// Proof Record
// ============================================================================

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extension of stored proof files (OpenTimestamps detached proof)
pub const PROOF_FILE_EXTENSION: &str = "ots";

/// Stored, deduplicated result of a successful proof acquisition.
///
/// At most one record exists per fingerprint and it is never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub fingerprint: Fingerprint,
    /// Opaque proof blob as produced by the timestamp client
    pub serialized_proof: Vec<u8>,
    /// When the record was first persisted
    pub created_at: DateTime<Utc>,
}

impl ProofRecord {
    pub fn new(fingerprint: Fingerprint, serialized_proof: Vec<u8>) -> Self {
        Self {
            fingerprint,
            serialized_proof,
            created_at: Utc::now(),
        }
    }

    /// Stored file name of the record for `fingerprint`
    pub fn file_name_for(fingerprint: &Fingerprint) -> String {
        format!("{}.{}", fingerprint.to_hex(), PROOF_FILE_EXTENSION)
    }
}
