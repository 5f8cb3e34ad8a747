// ============================================================================
// SMTP Adapters
// ============================================================================
//
// Thin mail transport at the edges of the pipeline:
// - server: receives messages and answers with the pipeline's reply
// - client: delivers confirmations through the outbound relay
//
// Both sides speak only the subset of RFC 5321 they need.
//
// ============================================================================

pub mod client;
pub mod server;

pub use client::SmtpTransport;
pub use server::SmtpServer;

use blocketch_types::SmtpReply;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Longest command line accepted (RFC 5321 4.5.3.1.4 allows 512)
pub(crate) const MAX_COMMAND_LINE: usize = 1024;

/// Read one line (terminator included) into `buf`, keeping at most `limit`
/// bytes. Returns the number of bytes consumed from the stream; 0 means EOF.
pub(crate) async fn read_line_limited<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut consumed = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(consumed);
        }
        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        let keep = used.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&available[..keep]);
        reader.consume(used);
        consumed += used;
        if done {
            return Ok(consumed);
        }
    }
}

/// Line content without its CRLF / LF terminator
pub(crate) fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

pub(crate) async fn write_reply<W>(writer: &mut W, reply: &SmtpReply) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{}\r\n", reply).as_bytes())
        .await?;
    writer.flush().await
}

/// Escape lines starting with '.' and terminate with `<CRLF>.<CRLF>`
pub fn dot_stuff(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for line in text.split_inclusive('\n') {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    out
}
