// ============================================================================
// Blocketch Types - Core Data Types
// ============================================================================
//
// Data structures shared by every part of the timestamping service. This
// crate has NO dependencies on business logic, storage or network code.
//
// Contents:
// - Content fingerprints (fixed-length, hex-addressable)
// - Submissions and their lifecycle state machine
// - Stored proof records
// - Status events and operational alerts
// - Mail envelopes and SMTP replies
//
// Dependencies:
// - serde (serialization only)
// - uuid (identifiers)
// - chrono (timestamps)
// - hex (fingerprint text encoding)
//
// ============================================================================

pub mod envelope;
pub mod event;
pub mod fingerprint;
pub mod proof;
pub mod submission;

// Re-exports for convenience
pub use envelope::*;
pub use event::*;
pub use fingerprint::*;
pub use proof::*;
pub use submission::*;
