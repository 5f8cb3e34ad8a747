// ============================================================================
// Blocketch - email timestamping service
// ============================================================================
//
// Wiring:
// 1. Load configuration (env + config file overlay) and initialize tracing
// 2. Build fingerprinter, calendar fan-out client, proof store, outbound
//    SMTP transport, status event bus and the submission pipeline
// 3. Spawn the processing monitor, the health/metrics endpoint and the
//    inbound SMTP listener
// 4. Log a periodic processing summary until SIGTERM / Ctrl-C
//
// On shutdown the listener stops accepting; submissions already in
// ProofRequested get a grace period to finish.
//
// ============================================================================

use anyhow::{Context, Result};
use blocketch_config::Config;
use blocketch_server::confirmation::ConfirmationDispatcher;
use blocketch_server::events::StatusEventBus;
use blocketch_server::monitor::{DEFAULT_HISTORY_LIMIT, ProcessingMonitor};
use blocketch_server::pipeline::{PipelineSettings, SubmissionPipeline};
use blocketch_server::proof_store::{FsProofStore, ProofStore};
use blocketch_server::retry::RetryPolicy;
use blocketch_server::smtp::{SmtpServer, SmtpTransport};
use blocketch_server::timestamp::FanoutClient;
use blocketch_server::utils::LogIdentity;
use blocketch_server::{fingerprint, health};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bound for one outbound confirmation delivery
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(60);
const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Blocketch Timestamp Service Starting ===");
    info!("Mail server address: {}", config.mail.mail_server_address);
    info!("Outbound relay: {}", config.mail.outbound_server_address);
    info!("Calendars: {}", config.calendar.urls.join(", "));
    info!("Proof store: {}", config.store.dir.display());
    info!(
        "Max concurrent proof requests: {}, max attempts: {}, request timeout: {:?}",
        config.pipeline.max_concurrent_proof_requests,
        config.pipeline.max_retry_attempts,
        config.calendar.request_timeout
    );

    let store: Arc<dyn ProofStore> = Arc::new(
        FsProofStore::open(&config.store.dir).context("Failed to open proof store")?,
    );
    let fingerprinter = fingerprint::from_config(&config.fingerprint)?;
    info!("Fingerprint mode: {}", fingerprinter.name());

    let timestamp = Arc::new(FanoutClient::from_config(&config.calendar)?);
    let transport = Arc::new(SmtpTransport::from_config(&config.mail, DELIVERY_TIMEOUT));
    let dispatcher = ConfirmationDispatcher::new(
        transport,
        config.mail.reply_from_address.clone(),
        RetryPolicy::for_delivery(&config.pipeline),
    );

    let bus = StatusEventBus::new(config.pipeline.event_bus_capacity);
    let identity = LogIdentity::new(&config.logging);
    let (monitor, _monitor_handle) =
        ProcessingMonitor::spawn(&bus, DEFAULT_HISTORY_LIMIT, identity.clone());

    let pipeline = Arc::new(SubmissionPipeline::new(
        fingerprinter,
        timestamp,
        store.clone(),
        dispatcher,
        bus,
        PipelineSettings::from_config(&config),
        identity,
    ));

    // Health / metrics endpoint
    let health_port = config.health_port;
    let health_store = store.clone();
    tokio::spawn(async move {
        if let Err(e) = health::run_http_server(health_port, health_store).await {
            error!(error = %e, "HTTP server failed");
        }
    });

    // Inbound SMTP
    let listener = TcpListener::bind(&config.mail.mail_server_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.mail.mail_server_address))?;
    let smtp_server = Arc::new(SmtpServer::new(pipeline.clone(), &config.mail));
    let mut smtp_handle = tokio::spawn(smtp_server.serve(listener));

    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);
    summary.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                break;
            }
            res = &mut smtp_handle => {
                match res {
                    Ok(Err(e)) => error!(error = %e, "SMTP server failed"),
                    Err(e) => error!(error = %e, "SMTP server task panicked"),
                    Ok(Ok(())) => warn!("SMTP server stopped"),
                }
                return Err(anyhow::anyhow!("SMTP listener is no longer running"));
            }
            _ = summary.tick() => {
                let snapshot = monitor.snapshot().await;
                info!(
                    processed = snapshot.processed,
                    failed = snapshot.failed,
                    in_progress = snapshot.in_progress,
                    proof_requests_in_flight = pipeline.admission().in_flight(),
                    lagged_events = snapshot.lagged_events,
                    "Processing summary"
                );
            }
        }
    }

    // Stop accepting new mail, let in-flight proof requests finish
    smtp_handle.abort();
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while pipeline.admission().in_flight() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    let remaining = pipeline.admission().in_flight();
    if remaining > 0 {
        warn!(remaining, "Shutting down with proof requests still in flight");
    }

    let snapshot = monitor.snapshot().await;
    info!(
        processed = snapshot.processed,
        failed = snapshot.failed,
        "=== Blocketch Timestamp Service Stopped ==="
    );
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown...");
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("SIGINT received, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Ctrl-C received, initiating graceful shutdown...");
    }
    Ok(())
}
