#![allow(dead_code)]

use async_trait::async_trait;
use blocketch_error::{ProofFailure, StampError, StampResult, TransportError};
use blocketch_server::confirmation::{ConfirmationDispatcher, MailTransport, OutboundMessage};
use blocketch_server::events::StatusEventBus;
use blocketch_server::fingerprint::ContentDigest;
use blocketch_server::pipeline::{PipelineSettings, SubmissionPipeline};
use blocketch_server::proof_store::{MemoryProofStore, ProofStore, PutOutcome};
use blocketch_server::retry::RetryPolicy;
use blocketch_server::timestamp::{ProofResult, TimestampClient};
use blocketch_server::utils::LogIdentity;
use blocketch_types::{Fingerprint, ProofRecord, StatusEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

pub const STUB_PROOF: &[u8] = b"stub-proof-P";
pub const SERVICE_ADDRESS: &str = "stamp@blocketch.example";

// ============================================================================
// Timestamp authority stub
// ============================================================================

/// Scripted timestamp authority: replays `script`, then answers `fallback`
pub struct StubTimestamp {
    script: Mutex<VecDeque<ProofResult>>,
    fallback: ProofResult,
    /// Answer with a proof derived from the fingerprint instead of `fallback`
    echo: bool,
    delay: Duration,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubTimestamp {
    fn with(script: Vec<ProofResult>, fallback: ProofResult) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            echo: false,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(proof: &[u8]) -> Self {
        Self::with(vec![], Ok(proof.to_vec()))
    }

    pub fn failing_then_succeeding(failures: usize, failure: ProofFailure, proof: &[u8]) -> Self {
        Self::with(vec![Err(failure); failures], Ok(proof.to_vec()))
    }

    pub fn always_failing(failure: ProofFailure) -> Self {
        Self::with(vec![], Err(failure))
    }

    /// Proof bytes are `proof-for-{hex}` of the requested fingerprint
    pub fn echoing() -> Self {
        let mut stub = Self::succeeding(b"");
        stub.echo = true;
        stub
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub fn echo_proof(fingerprint: &Fingerprint) -> Vec<u8> {
    format!("proof-for-{}", fingerprint.to_hex()).into_bytes()
}

#[async_trait]
impl TimestampClient for StubTimestamp {
    async fn request_proof(&self, fingerprint: &Fingerprint) -> ProofResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        let result = match scripted {
            Some(result) => result,
            None if self.echo => Ok(echo_proof(fingerprint)),
            None => self.fallback.clone(),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> String {
        "stub".to_string()
    }
}

// ============================================================================
// Outbound mail stub
// ============================================================================

/// Records every message; answers from `script`, then `fallback`
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    fallback: Result<(), TransportError>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::scripted(vec![], Ok(()))
    }

    pub fn rejecting(reason: &str) -> Self {
        Self::scripted(vec![], Err(TransportError::Permanent(reason.to_string())))
    }

    pub fn scripted(
        script: Vec<Result<(), TransportError>>,
        fallback: Result<(), TransportError>,
    ) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            fallback,
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message.clone());
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

// ============================================================================
// Proof store wrappers
// ============================================================================

/// Fails the first `failures` writes with a storage error
pub struct FlakyStore {
    pub inner: MemoryProofStore,
    failures_left: AtomicU32,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MemoryProofStore::new(),
            failures_left: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl ProofStore for FlakyStore {
    async fn put_if_absent(
        &self,
        fingerprint: &Fingerprint,
        proof: Vec<u8>,
    ) -> StampResult<PutOutcome> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StampError::storage("injected write failure"));
        }
        self.inner.put_if_absent(fingerprint, proof).await
    }

    async fn get(&self, fingerprint: &Fingerprint) -> StampResult<Option<ProofRecord>> {
        self.inner.get(fingerprint).await
    }

    async fn ping(&self) -> StampResult<()> {
        Ok(())
    }
}

/// Hides existing records from `get`, as if another process wrote them
/// between our lookup and our write
pub struct RaceLosingStore {
    pub inner: MemoryProofStore,
}

#[async_trait]
impl ProofStore for RaceLosingStore {
    async fn put_if_absent(
        &self,
        fingerprint: &Fingerprint,
        proof: Vec<u8>,
    ) -> StampResult<PutOutcome> {
        self.inner.put_if_absent(fingerprint, proof).await
    }

    async fn get(&self, _fingerprint: &Fingerprint) -> StampResult<Option<ProofRecord>> {
        Ok(None)
    }

    async fn ping(&self) -> StampResult<()> {
        Ok(())
    }
}

// ============================================================================
// Pipeline harness
// ============================================================================

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
}

pub fn fast_settings(max_attempts: u32) -> PipelineSettings {
    PipelineSettings {
        max_concurrent_proof_requests: 4,
        proof_retry: fast_retry(max_attempts),
        storage_retry: fast_retry(3),
        request_timeout: Duration::from_secs(2),
        submission_deadline: Duration::from_secs(10),
    }
}

pub struct Harness {
    pub pipeline: Arc<SubmissionPipeline>,
    pub bus: StatusEventBus,
    pub events: broadcast::Receiver<StatusEvent>,
}

pub fn build_pipeline(
    timestamp: Arc<dyn TimestampClient>,
    store: Arc<dyn ProofStore>,
    transport: Arc<dyn MailTransport>,
    settings: PipelineSettings,
) -> Harness {
    let bus = StatusEventBus::new(4096);
    let events = bus.subscribe();
    let dispatcher = ConfirmationDispatcher::new(transport, SERVICE_ADDRESS, fast_retry(3));

    let pipeline = SubmissionPipeline::new(
        Arc::new(ContentDigest),
        timestamp,
        store,
        dispatcher,
        bus.clone(),
        settings,
        LogIdentity::hashed("test-salt"),
    );

    Harness {
        pipeline: Arc::new(pipeline),
        bus,
        events,
    }
}

/// Everything published so far
pub fn drain_events(events: &mut broadcast::Receiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
