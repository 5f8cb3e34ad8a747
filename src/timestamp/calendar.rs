// ============================================================================
// Calendar Client - one OpenTimestamps calendar
// ============================================================================
//
// POST {url}/digest with the raw fingerprint bytes. A 200 response body is
// the calendar's timestamp for that digest, returned to the caller framed
// as a detached timestamp file.
//
// Failure classification:
// - request timeout                        -> Timeout
// - connect / transport error, 5xx, 408,
//   429, empty body                        -> Unreachable (transient)
// - any other 4xx                          -> Rejected (terminal)
//
// ============================================================================

use super::{ProofResult, TimestampClient, ots};
use anyhow::{Context, Result};
use async_trait::async_trait;
use blocketch_error::ProofFailure;
use blocketch_types::Fingerprint;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

const OTS_ACCEPT: &str = "application/vnd.opentimestamps.v1";

/// Client for a single calendar server
#[derive(Clone)]
pub struct CalendarClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl CalendarClient {
    /// Build a client with its own connection pool
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_http_client(http_client, base_url, timeout))
    }

    /// Reuse an existing pooled HTTP client
    pub fn with_http_client(http_client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn classify_error(&self, err: reqwest::Error) -> ProofFailure {
        if err.is_timeout() {
            ProofFailure::Timeout(self.timeout)
        } else {
            ProofFailure::Unreachable(err.to_string())
        }
    }
}

/// Map a non-success HTTP status to a failure class
pub(crate) fn classify_status(status: StatusCode, body: &str) -> ProofFailure {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.chars().take(200).collect::<String>())
    };

    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        ProofFailure::Unreachable(detail)
    } else {
        ProofFailure::Rejected(detail)
    }
}

#[async_trait]
impl TimestampClient for CalendarClient {
    async fn request_proof(&self, fingerprint: &Fingerprint) -> ProofResult {
        let url = format!("{}/digest", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::ACCEPT, OTS_ACCEPT)
            .body(fingerprint.as_bytes().to_vec())
            .send()
            .await
            .map_err(|e| self.classify_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let timestamp = response.bytes().await.map_err(|e| self.classify_error(e))?;
        if timestamp.is_empty() {
            return Err(ProofFailure::Unreachable(format!(
                "{} returned an empty timestamp",
                self.base_url
            )));
        }

        debug!(
            calendar = %self.base_url,
            fingerprint = %fingerprint.short(),
            timestamp_len = timestamp.len(),
            "Calendar accepted digest"
        );

        Ok(ots::detached_file(fingerprint, &timestamp))
    }

    fn name(&self) -> String {
        self.base_url.clone()
    }
}
