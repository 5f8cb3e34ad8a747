// ============================================================================
// Configuration Constants
// ============================================================================

// Mail transport
pub(crate) const DEFAULT_MAIL_SERVER_ADDRESS: &str = "0.0.0.0:2525";
pub(crate) const DEFAULT_OUTBOUND_SERVER_ADDRESS: &str = "localhost:25";
pub(crate) const DEFAULT_REPLY_FROM_ADDRESS: &str = "timestamp@blocketch.example";
pub(crate) const DEFAULT_HELO_NAME: &str = "blocketch.local";

// Timestamp calendars
pub(crate) const DEFAULT_CALENDAR_URL: &str = "https://btc.calendar.opentimestamps.org";
pub(crate) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub(crate) const DEFAULT_USER_AGENT: &str = concat!("blocketch/", env!("CARGO_PKG_VERSION"));

// Pipeline policy
pub(crate) const DEFAULT_MAX_CONCURRENT_PROOF_REQUESTS: usize = 16;
pub(crate) const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;
pub(crate) const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 500;
pub(crate) const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 30_000;
pub(crate) const DEFAULT_STORAGE_MAX_ATTEMPTS: u32 = 5;
pub(crate) const DEFAULT_DELIVERY_MAX_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_SUBMISSION_DEADLINE_SECS: u64 = 600;
pub(crate) const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

// Storage
pub(crate) const DEFAULT_PROOF_STORE_DIR: &str = "/app/timestamps";
pub(crate) const DEFAULT_CONFIG_FILE: &str = "/app/config/config.json";
pub(crate) const SIGNING_KEY_FILE_NAME: &str = ".signing-key";

// Health / metrics endpoint
pub(crate) const DEFAULT_HEALTH_PORT: u16 = 8081;

// Message size limits (in bytes)
// Proof requests carry only the digest, but the whole message is held in
// memory until fingerprinting completes.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024; // 10 MB
