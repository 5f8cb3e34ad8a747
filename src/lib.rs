// ============================================================================
// Blocketch Server
// ============================================================================
//
// Email-driven proof-of-existence timestamping:
//
//   inbound mail -> fingerprint -> timestamp proof -> durable proof store
//                -> confirmation mail with the proof attached
//
// Modules:
// - fingerprint:   content fingerprint functions
// - timestamp:     calendar clients (single authority, fan-out) and .ots framing
// - proof_store:   first-writer-wins proof persistence
// - pipeline:      submission lifecycle, admission control, retries
// - confirmation:  outbound confirmation building and dispatch
// - events:        status event bus
// - monitor:       status event consumer (counts, recent submissions, alerts)
// - smtp:          inbound SMTP server and outbound SMTP transport
// - health:        /health and /metrics HTTP endpoint
//
// ============================================================================

pub mod confirmation;
pub mod events;
pub mod fingerprint;
pub mod health;
pub mod monitor;
pub mod pipeline;
pub mod proof_store;
pub mod retry;
pub mod smtp;
pub mod timestamp;
pub mod utils;

pub use confirmation::{ConfirmationDispatcher, MailTransport, OutboundMessage};
pub use events::StatusEventBus;
pub use fingerprint::Fingerprinter;
pub use monitor::{MonitorSnapshot, ProcessingMonitor};
pub use pipeline::{PipelineSettings, SubmissionOutcome, SubmissionPipeline};
pub use proof_store::{FsProofStore, MemoryProofStore, ProofStore, PutOutcome};
pub use retry::RetryPolicy;
pub use timestamp::{TimestampClient, calendar::CalendarClient, fanout::FanoutClient};
