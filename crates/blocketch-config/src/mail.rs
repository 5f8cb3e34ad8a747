// ============================================================================
// Mail Transport Configuration
// ============================================================================

use crate::constants::*;

/// Inbound and outbound mail settings
#[derive(Clone, Debug)]
pub struct MailConfig {
    /// Address the inbound SMTP listener binds to (e.g. "0.0.0.0:2525")
    pub mail_server_address: String,
    /// Outbound SMTP relay used for confirmations (e.g. "localhost:25")
    pub outbound_server_address: String,
    /// From address of confirmation mails
    pub reply_from_address: String,
    /// Name announced in EHLO/greeting
    pub helo_name: String,
    /// Largest accepted DATA payload in bytes
    pub max_message_size: usize,
}

impl MailConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            mail_server_address: std::env::var("MAIL_SERVER_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_MAIL_SERVER_ADDRESS.to_string()),
            outbound_server_address: std::env::var("OUTBOUND_SERVER_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_OUTBOUND_SERVER_ADDRESS.to_string()),
            reply_from_address: std::env::var("REPLY_FROM_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_REPLY_FROM_ADDRESS.to_string()),
            helo_name: std::env::var("SMTP_HELO_NAME")
                .unwrap_or_else(|_| DEFAULT_HELO_NAME.to_string()),
            max_message_size: std::env::var("MAX_MESSAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_MESSAGE_SIZE),
        }
    }
}
