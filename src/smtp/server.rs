// ============================================================================
// Inbound SMTP Server
// ============================================================================
//
// One task per connection. Each completed DATA phase becomes an Envelope,
// runs through the pipeline, and the pipeline's reply is written back, so
// the sending server learns the outcome (250 / 4xx / 5xx) of its message.
//
// ============================================================================

use super::{MAX_COMMAND_LINE, read_line_limited, trim_line_ending, write_reply};
use crate::pipeline::SubmissionPipeline;
use crate::utils::{is_wire_safe_address, normalize_address};
use blocketch_config::MailConfig;
use blocketch_types::{Envelope, SmtpReply};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Idle time allowed between commands
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Idle time allowed between lines of a DATA block (RFC 5321 4.5.3.2)
const DATA_TIMEOUT: Duration = Duration::from_secs(180);

pub struct SmtpServer {
    pipeline: Arc<SubmissionPipeline>,
    helo_name: String,
    max_message_size: usize,
    command_timeout: Duration,
    data_timeout: Duration,
}

/// Per-transaction state (reset by RSET, HELO/EHLO and after DATA)
#[derive(Default)]
struct Transaction {
    sender: Option<String>,
    recipient: Option<String>,
}

enum DataOutcome {
    Complete(Vec<u8>),
    TooLarge,
    TimedOut,
}

impl SmtpServer {
    pub fn new(pipeline: Arc<SubmissionPipeline>, config: &MailConfig) -> Self {
        Self {
            pipeline,
            helo_name: config.helo_name.clone(),
            max_message_size: config.max_message_size,
            command_timeout: COMMAND_TIMEOUT,
            data_timeout: DATA_TIMEOUT,
        }
    }

    /// Override the idle timeouts for commands and for DATA lines
    pub fn with_timeouts(mut self, command_timeout: Duration, data_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self.data_timeout = data_timeout;
        self
    }

    /// Accept connections until the listener fails
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "SMTP server listening");

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Failed to accept SMTP connection");
                    continue;
                }
            };

            let server = self.clone();
            tokio::spawn(async move {
                debug!(peer = %peer, "SMTP connection opened");
                if let Err(e) = server.handle_session(socket).await {
                    debug!(peer = %peer, error = %e, "SMTP session ended with error");
                }
            });
        }
    }

    /// Run one SMTP session over `stream`
    pub async fn handle_session<S>(&self, stream: S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);
        let mut line = Vec::with_capacity(128);
        let mut greeted = false;
        let mut tx = Transaction::default();

        self.reply(&mut writer, 220, &format!("{} ESMTP blocketch ready", self.helo_name))
            .await?;

        loop {
            let read = match tokio::time::timeout(
                self.command_timeout,
                read_line_limited(&mut reader, &mut line, MAX_COMMAND_LINE),
            )
            .await
            {
                Ok(read) => read?,
                Err(_) => {
                    self.reply(&mut writer, 421, "4.4.2 Idle timeout, closing connection")
                        .await?;
                    return Ok(());
                }
            };
            if read == 0 {
                return Ok(());
            }
            if read > MAX_COMMAND_LINE {
                self.reply(&mut writer, 500, "5.5.6 Line too long").await?;
                continue;
            }

            let text = String::from_utf8_lossy(trim_line_ending(&line)).into_owned();
            let (verb, arg) = match text.split_once(' ') {
                Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.trim().to_string()),
                None => (text.trim().to_ascii_uppercase(), String::new()),
            };

            match verb.as_str() {
                "HELO" => {
                    greeted = true;
                    tx = Transaction::default();
                    self.reply(&mut writer, 250, &self.helo_name).await?;
                }
                "EHLO" => {
                    greeted = true;
                    tx = Transaction::default();
                    let lines = format!(
                        "250-{}\r\n250-SIZE {}\r\n250-8BITMIME\r\n250 PIPELINING\r\n",
                        self.helo_name, self.max_message_size
                    );
                    writer.write_all(lines.as_bytes()).await?;
                    writer.flush().await?;
                }
                "MAIL" => {
                    let reply = self.mail_from(greeted, &mut tx, &arg);
                    write_reply(&mut writer, &reply).await?;
                }
                "RCPT" => {
                    let reply = Self::rcpt_to(&mut tx, &arg);
                    write_reply(&mut writer, &reply).await?;
                }
                "DATA" => {
                    let (Some(sender), Some(recipient)) = (tx.sender.take(), tx.recipient.take())
                    else {
                        tx = Transaction::default();
                        self.reply(&mut writer, 503, "5.5.1 Need MAIL and RCPT first")
                            .await?;
                        continue;
                    };

                    self.reply(&mut writer, 354, "Start mail input; end with <CRLF>.<CRLF>")
                        .await?;
                    let reply = match self.read_data(&mut reader, &mut line).await? {
                        DataOutcome::TooLarge => {
                            SmtpReply::new(552, "5.3.4 Message size exceeds fixed limit")
                        }
                        DataOutcome::TimedOut => {
                            warn!("DATA stalled, closing connection");
                            self.reply(&mut writer, 421, "4.4.2 Data timeout, closing connection")
                                .await?;
                            return Ok(());
                        }
                        DataOutcome::Complete(content) => {
                            self.pipeline
                                .handle_envelope(Envelope::new(sender, recipient, content))
                                .await
                        }
                    };
                    write_reply(&mut writer, &reply).await?;
                }
                "RSET" => {
                    tx = Transaction::default();
                    self.reply(&mut writer, 250, "2.0.0 OK").await?;
                }
                "NOOP" => self.reply(&mut writer, 250, "2.0.0 OK").await?,
                "QUIT" => {
                    self.reply(&mut writer, 221, "2.0.0 Bye").await?;
                    return Ok(());
                }
                _ => {
                    self.reply(&mut writer, 500, "5.5.2 Command not recognized")
                        .await?;
                }
            }
        }
    }

    fn mail_from(&self, greeted: bool, tx: &mut Transaction, arg: &str) -> SmtpReply {
        if !greeted {
            return SmtpReply::new(503, "5.5.1 Send HELO/EHLO first");
        }
        if tx.sender.is_some() {
            return SmtpReply::new(503, "5.5.1 Sender already specified");
        }
        let Some(path) = strip_keyword(arg, "FROM:") else {
            return SmtpReply::new(501, "5.5.4 Syntax: MAIL FROM:<address>");
        };

        if let Some(size) = size_param(path) {
            if size > self.max_message_size {
                return SmtpReply::new(552, "5.3.4 Message size exceeds fixed limit");
            }
        }

        let sender = normalize_address(path);
        if sender.is_empty() {
            // Null reverse-path: bounces are never timestamped
            return SmtpReply::new(550, "5.7.1 Null sender not accepted");
        }
        if !sender.contains('@') || !is_wire_safe_address(&sender) {
            return SmtpReply::new(501, "5.1.7 Invalid sender address");
        }

        tx.sender = Some(sender);
        SmtpReply::new(250, "2.1.0 OK")
    }

    fn rcpt_to(tx: &mut Transaction, arg: &str) -> SmtpReply {
        if tx.sender.is_none() {
            return SmtpReply::new(503, "5.5.1 Need MAIL first");
        }
        let Some(path) = strip_keyword(arg, "TO:") else {
            return SmtpReply::new(501, "5.5.4 Syntax: RCPT TO:<address>");
        };
        if tx.recipient.is_some() {
            return SmtpReply::new(452, "4.5.3 Too many recipients");
        }

        let recipient = normalize_address(path);
        if !is_wire_safe_address(&recipient) {
            return SmtpReply::new(501, "5.1.3 Invalid recipient address");
        }
        tx.recipient = Some(recipient);
        SmtpReply::new(250, "2.1.5 OK")
    }

    /// Read the DATA phase up to the terminating ".", undoing dot-stuffing.
    ///
    /// An oversized message is read to its end and discarded so the
    /// session stays in sync.
    async fn read_data<R>(&self, reader: &mut R, line: &mut Vec<u8>) -> io::Result<DataOutcome>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut content = Vec::new();
        let mut too_large = false;

        loop {
            let limit = if too_large {
                0
            } else {
                self.max_message_size - content.len() + 2
            };
            let read = match tokio::time::timeout(
                self.data_timeout,
                read_line_limited(reader, line, limit.max(3)),
            )
            .await
            {
                Ok(read) => read?,
                Err(_) => return Ok(DataOutcome::TimedOut),
            };
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during DATA",
                ));
            }

            let current = line.as_slice();
            if trim_line_ending(current) == b"." && read == current.len() {
                break;
            }
            if too_large {
                continue;
            }

            let unstuffed = current.strip_prefix(b".").unwrap_or(current);
            if read > current.len() || content.len() + unstuffed.len() > self.max_message_size {
                too_large = true;
                content = Vec::new();
                continue;
            }
            content.extend_from_slice(unstuffed);
        }

        if too_large {
            warn!(
                max_message_size = self.max_message_size,
                "Rejected oversized message"
            );
            return Ok(DataOutcome::TooLarge);
        }
        Ok(DataOutcome::Complete(content))
    }

    async fn reply<W>(&self, writer: &mut W, code: u16, text: &str) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        write_reply(writer, &SmtpReply::new(code, text)).await
    }
}

/// `FROM:<a@b>` -> `<a@b>` (keyword match is case-insensitive)
fn strip_keyword<'a>(arg: &'a str, keyword: &str) -> Option<&'a str> {
    let head = arg.get(..keyword.len())?;
    head.eq_ignore_ascii_case(keyword)
        .then(|| arg[keyword.len()..].trim())
}

/// Value of a `SIZE=` ESMTP parameter, if present
fn size_param(path: &str) -> Option<usize> {
    path.split_whitespace()
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.eq_ignore_ascii_case("SIZE").then_some(value)
        })
        .and_then(|value| value.parse().ok())
}
