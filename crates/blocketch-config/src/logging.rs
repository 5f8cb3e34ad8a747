// ============================================================================
// Logging Configuration
// ============================================================================

/// Privacy settings for structured logs
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log sender addresses in clear (otherwise a salted short hash)
    pub enable_user_identifiers: bool,
    /// Salt mixed into hashed identifiers
    pub hash_salt: String,
}

impl LoggingConfig {
    pub(crate) fn from_env() -> Self {
        let hash_salt = std::env::var("LOG_HASH_SALT").unwrap_or_else(|_| {
            // A per-process salt still lets one run's log lines correlate
            let salt = uuid::Uuid::new_v4().simple().to_string();
            tracing::debug!("LOG_HASH_SALT not set, using a random per-process salt");
            salt
        });

        Self {
            enable_user_identifiers: std::env::var("LOG_USER_IDENTIFIERS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            hash_salt,
        }
    }
}
