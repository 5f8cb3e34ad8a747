// ============================================================================
// Mail Envelope & SMTP Reply
// ============================================================================
//
// The inbound transport delivers an Envelope; the pipeline answers with an
// SmtpReply that the transport writes back verbatim ("250 ...", "451 ...").
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsed inbound message as handed over by the mail transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// MAIL FROM address
    pub sender: String,
    /// RCPT TO address
    pub recipient: String,
    /// Raw DATA bytes (headers and body, dot-unstuffed)
    pub content: Vec<u8>,
}

impl Envelope {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            content,
        }
    }
}

/// Protocol reply returned to the sending mail server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub text: String,
}

impl SmtpReply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 4xx - the sender may retry later
    pub fn is_transient(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// 5xx - the sender must not retry
    pub fn is_permanent(&self) -> bool {
        self.code >= 500
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_classes() {
        let ok = SmtpReply::new(250, "2.0.0 Timestamp proof sent");
        assert!(ok.is_success());
        assert_eq!(ok.to_string(), "250 2.0.0 Timestamp proof sent");

        assert!(SmtpReply::new(451, "4.4.1 try later").is_transient());
        assert!(SmtpReply::new(554, "5.6.0 bad content").is_permanent());
    }
}
