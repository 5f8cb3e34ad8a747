// ============================================================================
// Fan-out Client - several calendars, first success wins
// ============================================================================
//
// The same fingerprint goes to every configured authority concurrently. The
// first completed proof is returned and the remaining requests are dropped
// (cancelled). The whole call is bounded by `timeout`, so one slow authority
// cannot hold the caller longer than configured.
//
// When every authority fails the outcome is aggregated:
// - all Rejected -> Rejected (terminal)
// - all Timeout  -> Timeout
// - otherwise    -> Unreachable
//
// ============================================================================

use super::{CalendarClient, ProofResult, TimestampClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use blocketch_config::CalendarConfig;
use blocketch_error::ProofFailure;
use blocketch_types::Fingerprint;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct FanoutClient {
    authorities: Vec<Arc<dyn TimestampClient>>,
    timeout: Duration,
}

impl FanoutClient {
    pub fn new(authorities: Vec<Arc<dyn TimestampClient>>, timeout: Duration) -> Self {
        Self {
            authorities,
            timeout,
        }
    }

    /// One CalendarClient per configured URL, sharing a connection pool
    pub fn from_config(config: &CalendarConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        let authorities = config
            .urls
            .iter()
            .map(|url| {
                Arc::new(CalendarClient::with_http_client(
                    http_client.clone(),
                    url,
                    config.request_timeout,
                )) as Arc<dyn TimestampClient>
            })
            .collect();

        Ok(Self::new(authorities, config.request_timeout))
    }

    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    async fn race(&self, fingerprint: &Fingerprint) -> ProofResult {
        let mut pending: FuturesUnordered<_> = self
            .authorities
            .iter()
            .map(|authority| async move {
                let result = authority.request_proof(fingerprint).await;
                (authority.name(), result)
            })
            .collect();

        let mut failures = Vec::with_capacity(self.authorities.len());
        while let Some((name, result)) = pending.next().await {
            match result {
                Ok(proof) => {
                    debug!(
                        authority = %name,
                        fingerprint = %fingerprint.short(),
                        "Proof obtained"
                    );
                    return Ok(proof);
                }
                Err(failure) => {
                    debug!(authority = %name, error = %failure, "Authority failed");
                    failures.push(failure);
                }
            }
        }

        Err(aggregate(failures))
    }
}

/// Combine per-authority failures into one classified failure
pub(crate) fn aggregate(failures: Vec<ProofFailure>) -> ProofFailure {
    if failures.is_empty() {
        return ProofFailure::Unreachable("no timestamp authorities configured".to_string());
    }

    if failures.iter().all(|f| matches!(f, ProofFailure::Rejected(_))) {
        let reasons: Vec<String> = failures.iter().map(ToString::to_string).collect();
        return ProofFailure::Rejected(reasons.join("; "));
    }

    if failures.iter().all(|f| matches!(f, ProofFailure::Timeout(_))) {
        if let Some(ProofFailure::Timeout(after)) = failures.first() {
            return ProofFailure::Timeout(*after);
        }
    }

    let reasons: Vec<String> = failures.iter().map(ToString::to_string).collect();
    ProofFailure::Unreachable(reasons.join("; "))
}

#[async_trait]
impl TimestampClient for FanoutClient {
    async fn request_proof(&self, fingerprint: &Fingerprint) -> ProofResult {
        match tokio::time::timeout(self.timeout, self.race(fingerprint)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    fingerprint = %fingerprint.short(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    authorities = self.authorities.len(),
                    "No authority answered before the request timeout"
                );
                Err(ProofFailure::Timeout(self.timeout))
            }
        }
    }

    fn name(&self) -> String {
        let names: Vec<String> = self.authorities.iter().map(|a| a.name()).collect();
        format!("fanout[{}]", names.join(", "))
    }
}
