// ============================================================================
// MIME Rendering
// ============================================================================
//
// RFC 5322 / RFC 2045 rendering of a confirmation: multipart/mixed with a
// plain text part and one base64 attachment. CRLF line endings throughout.
//
// ============================================================================

use super::OutboundMessage;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};

/// base64 line length (RFC 2045)
const BASE64_LINE_LEN: usize = 76;

/// Render `message` for the DATA phase (not yet dot-stuffed)
pub fn render(message: &OutboundMessage) -> String {
    render_at(message, Utc::now(), &uuid::Uuid::new_v4().simple().to_string())
}

fn render_at(message: &OutboundMessage, date: DateTime<Utc>, unique: &str) -> String {
    let boundary = format!("=_blocketch_{}", unique);
    let domain = message
        .from
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or("localhost");

    let mut out = String::new();
    out.push_str(&format!("From: {}\r\n", message.from));
    out.push_str(&format!("To: {}\r\n", message.to));
    out.push_str(&format!("Subject: {}\r\n", message.subject));
    out.push_str(&format!("Date: {}\r\n", date.to_rfc2822()));
    out.push_str(&format!("Message-ID: <{}@{}>\r\n", unique, domain));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"\r\n",
        boundary
    ));
    out.push_str("\r\n");

    out.push_str(&format!("--{}\r\n", boundary));
    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    out.push_str("Content-Transfer-Encoding: 8bit\r\n");
    out.push_str("\r\n");
    out.push_str(&normalize_newlines(&message.body));
    if !message.body.ends_with('\n') {
        out.push_str("\r\n");
    }

    let attachment = &message.attachment;
    out.push_str(&format!("--{}\r\n", boundary));
    out.push_str(&format!(
        "Content-Type: {}; name=\"{}\"\r\n",
        attachment.content_type, attachment.filename
    ));
    out.push_str("Content-Transfer-Encoding: base64\r\n");
    out.push_str(&format!(
        "Content-Disposition: attachment; filename=\"{}\"\r\n",
        attachment.filename
    ));
    out.push_str("\r\n");
    out.push_str(&wrap_base64(&attachment.bytes));
    out.push_str(&format!("--{}--\r\n", boundary));
    out
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

fn wrap_base64(bytes: &[u8]) -> String {
    let encoded = general_purpose::STANDARD.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LEN * 2 + 2);
    // base64 output is ASCII, so byte chunks are valid str slices
    for line in encoded.as_bytes().chunks(BASE64_LINE_LEN) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::Attachment;

    fn message(bytes: Vec<u8>) -> OutboundMessage {
        OutboundMessage {
            from: "stamp@blocketch.example".to_string(),
            to: "alice@example.com".to_string(),
            subject: "Your Timestamp Proof".to_string(),
            body: "line one\nline two\n".to_string(),
            attachment: Attachment {
                filename: "proof.ots".to_string(),
                content_type: "application/octet-stream".to_string(),
                bytes,
            },
        }
    }

    /// Pull the base64 attachment back out of a rendered message
    fn attachment_of(rendered: &str) -> Vec<u8> {
        let start = rendered
            .find("filename=\"proof.ots\"\r\n\r\n")
            .map(|i| i + "filename=\"proof.ots\"\r\n\r\n".len())
            .unwrap();
        let end = start + rendered[start..].find("--").unwrap();
        let joined: String = rendered[start..end].split("\r\n").collect();
        general_purpose::STANDARD.decode(joined).unwrap()
    }

    #[test]
    fn test_headers_and_structure() {
        let rendered = render_at(&message(b"P".to_vec()), Utc::now(), "abc");

        assert!(rendered.starts_with("From: stamp@blocketch.example\r\n"));
        assert!(rendered.contains("To: alice@example.com\r\n"));
        assert!(rendered.contains("Subject: Your Timestamp Proof\r\n"));
        assert!(rendered.contains("Message-ID: <abc@blocketch.example>\r\n"));
        assert!(rendered.contains("boundary=\"=_blocketch_abc\""));
        assert!(rendered.contains("line one\r\nline two\r\n"));
        assert!(rendered.ends_with("--=_blocketch_abc--\r\n"));
    }

    #[test]
    fn test_attachment_is_wrapped_base64() {
        let proof: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let rendered = render(&message(proof.clone()));

        assert_eq!(attachment_of(&rendered), proof);
        assert!(rendered.lines().all(|line| line.len() <= 998));
    }
}
