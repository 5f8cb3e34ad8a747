use blocketch_config::LoggingConfig;
use sha2::{Digest, Sha256};

/// Creates a truncated, salted hash of an identifier for safe logging.
///
/// # Arguments
/// * `id` - The identifier to hash (e.g., a sender address).
/// * `salt` - A salt value from the application's configuration.
///
/// # Returns
/// A short, hexadecimal string representing the salted hash.
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let hash = hasher.finalize();

    hex::encode(&hash[..4])
}

/// Identifier rendering for log fields, honoring the privacy settings
#[derive(Clone, Debug)]
pub struct LogIdentity {
    reveal: bool,
    salt: String,
}

impl LogIdentity {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            reveal: config.enable_user_identifiers,
            salt: config.hash_salt.clone(),
        }
    }

    /// Hash everything with a fixed salt (tests and tools)
    pub fn hashed(salt: impl Into<String>) -> Self {
        Self {
            reveal: false,
            salt: salt.into(),
        }
    }

    /// Address as it may appear in logs
    pub fn address(&self, addr: &str) -> String {
        if self.reveal {
            addr.to_string()
        } else {
            log_safe_id(&addr.to_ascii_lowercase(), &self.salt)
        }
    }
}

/// Strip angle brackets and SMTP parameters from a path argument:
/// `<alice@example.com> SIZE=123` -> `alice@example.com`
pub fn normalize_address(raw: &str) -> String {
    let raw = raw.trim();
    let path = match (raw.find('<'), raw.find('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw.split_whitespace().next().unwrap_or(""),
    };
    path.trim().to_string()
}

/// Whether `addr` can be written into an SMTP command or a mail header as-is:
/// no control characters (bare CR/LF), whitespace or angle brackets
pub fn is_wire_safe_address(addr: &str) -> bool {
    !addr.is_empty()
        && !addr
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || c == '<' || c == '>')
}
