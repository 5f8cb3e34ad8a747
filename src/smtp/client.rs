// ============================================================================
// Outbound SMTP Transport
// ============================================================================
//
// Delivers confirmations through the configured relay, one connection per
// message. Reply classes map onto the transport error taxonomy:
// - 4xx, timeouts, connection and I/O failures -> Transient (retried)
// - 5xx -> Permanent
//
// ============================================================================

use super::{MAX_COMMAND_LINE, dot_stuff, read_line_limited, trim_line_ending};
use crate::confirmation::{MailTransport, OutboundMessage, mime};
use crate::utils::is_wire_safe_address;
use async_trait::async_trait;
use blocketch_config::MailConfig;
use blocketch_error::TransportError;
use blocketch_types::SmtpReply;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

pub struct SmtpTransport {
    server_address: String,
    helo_name: String,
    timeout: Duration,
}

impl SmtpTransport {
    /// # Arguments
    /// * `server_address` - Relay as `host:port`
    /// * `helo_name` - Name sent with EHLO
    /// * `timeout` - Bound for one complete delivery
    pub fn new(server_address: impl Into<String>, helo_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server_address: server_address.into(),
            helo_name: helo_name.into(),
            timeout,
        }
    }

    pub fn from_config(config: &MailConfig, timeout: Duration) -> Self {
        Self::new(
            config.outbound_server_address.clone(),
            config.helo_name.clone(),
            timeout,
        )
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        for addr in [&message.from, &message.to] {
            if !is_wire_safe_address(addr) {
                return Err(TransportError::Permanent(format!(
                    "address {:?} cannot be written to the relay",
                    addr
                )));
            }
        }

        let stream = TcpStream::connect(&self.server_address)
            .await
            .map_err(|e| io_error("connect", e))?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        expect(read_reply(&mut reader).await?, &[220])?;
        command(&mut writer, &mut reader, &format!("EHLO {}", self.helo_name), &[250]).await?;
        command(
            &mut writer,
            &mut reader,
            &format!("MAIL FROM:<{}>", message.from),
            &[250],
        )
        .await?;
        command(
            &mut writer,
            &mut reader,
            &format!("RCPT TO:<{}>", message.to),
            &[250, 251],
        )
        .await?;
        command(&mut writer, &mut reader, "DATA", &[354]).await?;

        let data = dot_stuff(&mime::render(message));
        writer
            .write_all(data.as_bytes())
            .await
            .map_err(|e| io_error("DATA", e))?;
        writer.flush().await.map_err(|e| io_error("DATA", e))?;
        let accepted = expect(read_reply(&mut reader).await?, &[250])?;

        // The message is accepted; a failed QUIT changes nothing
        let _ = command(&mut writer, &mut reader, "QUIT", &[221]).await;

        debug!(
            relay = %self.server_address,
            reply = %accepted,
            "Confirmation handed to relay"
        );
        Ok(())
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        match tokio::time::timeout(self.timeout, self.deliver(message)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Transient(format!(
                "delivery to {} timed out after {:?}",
                self.server_address, self.timeout
            ))),
        }
    }
}

fn io_error(stage: &str, e: std::io::Error) -> TransportError {
    TransportError::Transient(format!("{} failed: {}", stage, e))
}

async fn command<W, R>(
    writer: &mut W,
    reader: &mut R,
    line: &str,
    accepted: &[u16],
) -> Result<SmtpReply, TransportError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    let verb = line.split(' ').next().unwrap_or(line);
    writer
        .write_all(format!("{}\r\n", line).as_bytes())
        .await
        .map_err(|e| io_error(verb, e))?;
    writer.flush().await.map_err(|e| io_error(verb, e))?;
    expect(read_reply(reader).await?, accepted)
}

fn expect(reply: SmtpReply, accepted: &[u16]) -> Result<SmtpReply, TransportError> {
    if accepted.contains(&reply.code) {
        Ok(reply)
    } else if reply.is_permanent() {
        Err(TransportError::Permanent(reply.to_string()))
    } else {
        Err(TransportError::Transient(reply.to_string()))
    }
}

/// Read a possibly multi-line reply (`250-...` continued until `250 ...`)
async fn read_reply<R>(reader: &mut R) -> Result<SmtpReply, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut text = Vec::new();

    loop {
        let read = read_line_limited(reader, &mut line, MAX_COMMAND_LINE)
            .await
            .map_err(|e| io_error("read reply", e))?;
        if read == 0 {
            return Err(TransportError::Transient(
                "connection closed by relay".to_string(),
            ));
        }

        let content = String::from_utf8_lossy(trim_line_ending(&line)).into_owned();
        let code = content
            .get(..3)
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(|| TransportError::Transient(format!("malformed reply: {}", content)))?;
        let last = content.as_bytes().get(3) != Some(&b'-');
        text.push(content.get(4..).unwrap_or("").to_string());

        if last {
            return Ok(SmtpReply::new(code, text.join(" ")));
        }
    }
}
