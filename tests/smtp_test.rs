// ============================================================================
// SMTP Intake and Outbound Transport Tests
// ============================================================================

mod test_utils;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use blocketch_config::MailConfig;
use blocketch_error::TransportError;
use blocketch_server::confirmation::{Attachment, MailTransport, OutboundMessage};
use blocketch_server::proof_store::MemoryProofStore;
use blocketch_server::smtp::{SmtpServer, SmtpTransport};
use std::sync::Arc;
use std::time::Duration;
use test_utils::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

fn mail_config(max_message_size: usize) -> MailConfig {
    MailConfig {
        mail_server_address: "127.0.0.1:0".to_string(),
        outbound_server_address: "127.0.0.1:25".to_string(),
        reply_from_address: SERVICE_ADDRESS.to_string(),
        helo_name: "stamp.test".to_string(),
        max_message_size,
    }
}

/// Start an intake server backed by a stub pipeline
async fn start_server(
    stub: Arc<StubTimestamp>,
    transport: Arc<RecordingTransport>,
    max_message_size: usize,
) -> String {
    let harness = build_pipeline(
        stub,
        Arc::new(MemoryProofStore::new()),
        transport,
        fast_settings(3),
    );
    spawn_server(SmtpServer::new(harness.pipeline, &mail_config(max_message_size))).await
}

async fn spawn_server(server: SmtpServer) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(Arc::new(server).serve(listener));
    addr
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Session {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        let mut session = Self {
            reader: BufReader::new(read),
            writer,
        };
        assert!(session.reply().await.starts_with("220 "));
        session
    }

    /// Last line of the next (possibly multi-line) reply
    async fn reply(&mut self) -> String {
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            let line = line.trim_end().to_string();
            if line.as_bytes().get(3) != Some(&b'-') {
                return line;
            }
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    async fn command(&mut self, line: &str) -> String {
        self.send_raw(format!("{}\r\n", line).as_bytes()).await;
        self.reply().await
    }

    async fn code(&mut self, line: &str) -> u16 {
        self.command(line).await[..3].parse().unwrap()
    }

    async fn envelope(&mut self, sender: &str) {
        assert_eq!(self.code("EHLO client.test").await, 250);
        assert_eq!(self.code(&format!("MAIL FROM:<{}>", sender)).await, 250);
        assert_eq!(self.code(&format!("RCPT TO:<{}>", SERVICE_ADDRESS)).await, 250);
        assert_eq!(self.code("DATA").await, 354);
    }
}

#[tokio::test]
async fn test_message_is_timestamped_and_confirmed() {
    let stub = Arc::new(StubTimestamp::succeeding(STUB_PROOF));
    let transport = Arc::new(RecordingTransport::new());
    let addr = start_server(stub.clone(), transport.clone(), 1024 * 1024).await;

    let mut session = Session::connect(&addr).await;
    session.envelope("alice@example.com").await;
    let reply = session
        .command("Subject: hi\r\n\r\nhello world\r\n..leading dot\r\n.")
        .await;

    assert!(reply.starts_with("250 "), "unexpected reply {}", reply);
    assert_eq!(stub.calls(), 1);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@example.com");
    assert_eq!(sent[0].attachment.bytes, STUB_PROOF.to_vec());

    assert_eq!(session.code("QUIT").await, 221);
}

#[tokio::test]
async fn test_command_sequence_errors() {
    let addr = start_server(
        Arc::new(StubTimestamp::succeeding(STUB_PROOF)),
        Arc::new(RecordingTransport::new()),
        1024,
    )
    .await;
    let mut session = Session::connect(&addr).await;

    assert_eq!(session.code("MAIL FROM:<a@example.com>").await, 503);
    assert_eq!(session.code("HELO client.test").await, 250);
    assert_eq!(session.code("RCPT TO:<x@example.com>").await, 503);
    assert_eq!(session.code("DATA").await, 503);
    assert_eq!(session.code("MAIL FROM:<>").await, 550);
    assert_eq!(session.code("MAIL FROM:nobody").await, 501);
    assert_eq!(session.code("MAIL FROM:<a@example.com>").await, 250);
    assert_eq!(session.code("MAIL FROM:<b@example.com>").await, 503);
    assert_eq!(session.code("RCPT TO:<x@example.com>").await, 250);
    assert_eq!(session.code("RCPT TO:<y@example.com>").await, 452);
    assert_eq!(session.code("RSET").await, 250);
    assert_eq!(session.code("DATA").await, 503);
    assert_eq!(session.code("VRFY someone").await, 500);
    assert_eq!(session.code("NOOP").await, 250);
}

#[tokio::test]
async fn test_control_characters_in_addresses_rejected() {
    let addr = start_server(
        Arc::new(StubTimestamp::succeeding(STUB_PROOF)),
        Arc::new(RecordingTransport::new()),
        1024,
    )
    .await;
    let mut session = Session::connect(&addr).await;

    assert_eq!(session.code("EHLO client.test").await, 250);
    assert_eq!(
        session.code("MAIL FROM:<a@example.com\rRCPT TO:<evil@example.net>>").await,
        501
    );
    assert_eq!(session.code("MAIL FROM:<a@example.com>").await, 250);
    assert_eq!(session.code("RCPT TO:<x@example.com\u{7}>").await, 501);
    assert_eq!(session.code("RCPT TO:<x@example.com>").await, 250);
}

#[tokio::test]
async fn test_oversized_message_rejected_and_session_continues() {
    let stub = Arc::new(StubTimestamp::succeeding(STUB_PROOF));
    let addr = start_server(stub.clone(), Arc::new(RecordingTransport::new()), 64).await;
    let mut session = Session::connect(&addr).await;

    assert_eq!(session.code("EHLO client.test").await, 250);
    assert_eq!(session.code("MAIL FROM:<a@example.com> SIZE=100000").await, 552);

    session.envelope("a@example.com").await;
    let body = "x".repeat(200);
    let reply = session.command(&format!("{}\r\n{}\r\n.", body, body)).await;
    assert!(reply.starts_with("552 "), "unexpected reply {}", reply);
    assert_eq!(stub.calls(), 0);

    assert_eq!(session.code("NOOP").await, 250);
}

#[tokio::test]
async fn test_undecodable_content_is_bounced() {
    let stub = Arc::new(StubTimestamp::succeeding(STUB_PROOF));
    let transport = Arc::new(RecordingTransport::new());
    let addr = start_server(stub.clone(), transport.clone(), 1024).await;
    let mut session = Session::connect(&addr).await;

    session.envelope("a@example.com").await;
    session.send_raw(b"caf\xe9 au lait\r\n.\r\n").await;
    let reply = session.reply().await;

    assert!(reply.starts_with("554 "), "unexpected reply {}", reply);
    assert_eq!(stub.calls(), 0);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_authority_outage_is_temporary_failure() {
    let stub = Arc::new(StubTimestamp::always_failing(
        blocketch_error::ProofFailure::Unreachable("down".into()),
    ));
    let addr = start_server(stub.clone(), Arc::new(RecordingTransport::new()), 1024).await;
    let mut session = Session::connect(&addr).await;

    session.envelope("a@example.com").await;
    let reply = session.command("hello\r\n.").await;

    assert!(reply.starts_with("451 "), "unexpected reply {}", reply);
    assert_eq!(stub.calls(), 3);
}

#[tokio::test]
async fn test_stalled_data_is_closed_with_421() {
    let stub = Arc::new(StubTimestamp::succeeding(STUB_PROOF));
    let harness = build_pipeline(
        stub.clone(),
        Arc::new(MemoryProofStore::new()),
        Arc::new(RecordingTransport::new()),
        fast_settings(3),
    );
    let server = SmtpServer::new(harness.pipeline, &mail_config(1024))
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(200));
    let addr = spawn_server(server).await;
    let mut session = Session::connect(&addr).await;

    session.envelope("a@example.com").await;
    session.send_raw(b"first line, then nothing\r\n").await;

    let reply = tokio::time::timeout(Duration::from_secs(5), session.reply())
        .await
        .expect("server must give up on a stalled DATA block");
    assert!(reply.starts_with("421 "), "unexpected reply {}", reply);
    assert_eq!(stub.calls(), 0);

    let mut rest = String::new();
    assert_eq!(session.reader.read_line(&mut rest).await.unwrap(), 0);
}

#[tokio::test]
async fn test_idle_session_is_closed_with_421() {
    let harness = build_pipeline(
        Arc::new(StubTimestamp::succeeding(STUB_PROOF)),
        Arc::new(MemoryProofStore::new()),
        Arc::new(RecordingTransport::new()),
        fast_settings(3),
    );
    let server = SmtpServer::new(harness.pipeline, &mail_config(1024))
        .with_timeouts(Duration::from_millis(200), Duration::from_secs(5));
    let addr = spawn_server(server).await;
    let mut session = Session::connect(&addr).await;

    let reply = tokio::time::timeout(Duration::from_secs(5), session.reply())
        .await
        .unwrap();
    assert!(reply.starts_with("421 "), "unexpected reply {}", reply);
}

// ============================================================================
// Outbound transport against a scripted relay
// ============================================================================

/// Single-connection relay; RCPT gets `rcpt_reply`, DATA payloads are
/// forwarded on the returned channel
async fn spawn_relay(rcpt_reply: &'static str) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read);
        writer.write_all(b"220 relay.test ESMTP\r\n").await.unwrap();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let verb = line.split([' ', '\r']).next().unwrap_or("").to_ascii_uppercase();
            let reply = match verb.as_str() {
                "EHLO" => "250-relay.test\r\n250 8BITMIME\r\n".to_string(),
                "MAIL" => "250 2.1.0 OK\r\n".to_string(),
                "RCPT" => format!("{}\r\n", rcpt_reply),
                "DATA" => {
                    writer.write_all(b"354 go ahead\r\n").await.unwrap();
                    let mut data = String::new();
                    loop {
                        let mut l = String::new();
                        reader.read_line(&mut l).await.unwrap();
                        if l == ".\r\n" {
                            break;
                        }
                        data.push_str(&l);
                    }
                    let _ = tx.send(data);
                    "250 2.0.0 queued\r\n".to_string()
                }
                "QUIT" => {
                    let _ = writer.write_all(b"221 bye\r\n").await;
                    return;
                }
                _ => "500 unknown\r\n".to_string(),
            };
            writer.write_all(reply.as_bytes()).await.unwrap();
        }
    });

    (addr, rx)
}

fn message(proof: &[u8]) -> OutboundMessage {
    OutboundMessage {
        from: SERVICE_ADDRESS.to_string(),
        to: "alice@example.com".to_string(),
        subject: "Your Timestamp Proof".to_string(),
        body: "Proof attached.\r\n.hidden line\r\n".to_string(),
        attachment: Attachment {
            filename: "proof.ots".to_string(),
            content_type: "application/vnd.opentimestamps.v1".to_string(),
            bytes: proof.to_vec(),
        },
    }
}

#[tokio::test]
async fn test_transport_delivers_mime_message() {
    let (addr, mut data) = spawn_relay("250 2.1.5 OK").await;
    let transport = SmtpTransport::new(addr, "stamp.test", Duration::from_secs(5));

    transport.send(&message(b"proof-bytes")).await.unwrap();

    let payload = data.recv().await.unwrap();
    assert!(payload.contains("Subject: Your Timestamp Proof\r\n"));
    assert!(payload.contains("To: alice@example.com\r\n"));
    assert!(payload.contains("filename=\"proof.ots\""));
    assert!(payload.contains(&BASE64.encode(b"proof-bytes")));
    // Dot-stuffed on the wire
    assert!(payload.contains("\r\n..hidden line\r\n"));
}

#[tokio::test]
async fn test_transport_classifies_permanent_rejection() {
    let (addr, _data) = spawn_relay("550 5.1.1 no such user").await;
    let transport = SmtpTransport::new(addr, "stamp.test", Duration::from_secs(5));

    let result = transport.send(&message(b"p")).await;
    assert!(matches!(result, Err(TransportError::Permanent(_))));
}

#[tokio::test]
async fn test_transport_classifies_temporary_failure() {
    let (addr, _data) = spawn_relay("451 4.3.0 try later").await;
    let transport = SmtpTransport::new(addr, "stamp.test", Duration::from_secs(5));

    let result = transport.send(&message(b"p")).await;
    assert!(matches!(result, Err(TransportError::Transient(_))));
}

#[tokio::test]
async fn test_transport_refuses_unsafe_recipient() {
    let (addr, mut data) = spawn_relay("250 2.1.5 OK").await;
    let transport = SmtpTransport::new(addr, "stamp.test", Duration::from_secs(5));

    let mut unsafe_message = message(b"p");
    unsafe_message.to = "alice@example.com\r\nBcc: x@example.net".to_string();

    let result = transport.send(&unsafe_message).await;
    assert!(matches!(result, Err(TransportError::Permanent(_))));
    assert!(data.try_recv().is_err());
}

#[tokio::test]
async fn test_transport_unreachable_relay_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let transport = SmtpTransport::new(addr, "stamp.test", Duration::from_secs(5));
    let result = transport.send(&message(b"p")).await;
    assert!(matches!(result, Err(TransportError::Transient(_))));
}
