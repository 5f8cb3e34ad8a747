// ============================================================================
// Blocketch Config - Centralized configuration management
// ============================================================================
//
// Configuration for the timestamping service. Values come from environment
// variables (with `.env` support and sensible defaults) and are then
// overlaid with the operator-edited JSON config file, if present.
//
// ============================================================================

mod calendar;
mod constants;
mod file;
mod logging;
mod mail;
mod pipeline;
mod store;

// Re-export all public types
pub use calendar::CalendarConfig;
pub use constants::MAX_MESSAGE_SIZE;
pub use file::FileOverrides;
pub use logging::LoggingConfig;
pub use mail::MailConfig;
pub use pipeline::PipelineConfig;
pub use store::{FingerprintConfig, FingerprintMode, StoreConfig};

use anyhow::{Result, bail};
use constants::*;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the Blocketch service
#[derive(Clone, Debug)]
pub struct Config {
    pub health_port: u16,
    pub rust_log: String,
    /// Operator-edited overlay file
    pub config_file: PathBuf,

    // Sub-configurations
    pub mail: MailConfig,
    pub calendar: CalendarConfig,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub fingerprint: FingerprintConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let store = StoreConfig::from_env();
        let fingerprint = FingerprintConfig::from_env(&store)?;

        Ok(Self {
            health_port: std::env::var("HEALTH_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_HEALTH_PORT),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            config_file: std::env::var("CONFIG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),

            mail: MailConfig::from_env(),
            calendar: CalendarConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
            store,
            fingerprint,
            logging: LoggingConfig::from_env(),
        })
    }

    /// Environment, then config file overlay, then validation
    pub fn load() -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(overrides) = FileOverrides::load(&config.config_file)? {
            tracing::info!(
                path = %config.config_file.display(),
                "Applying config file overrides"
            );
            config.apply_overrides(&overrides);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &FileOverrides) {
        if let Some(addr) = &overrides.mail_server_address {
            self.mail.mail_server_address = addr.clone();
        }
        if let Some(addr) = &overrides.outbound_server_address {
            self.mail.outbound_server_address = addr.clone();
        }
        if let Some(from) = &overrides.reply_from_address {
            self.mail.reply_from_address = from.clone();
        }
        if let Some(max) = overrides.max_concurrent_proof_requests {
            self.pipeline.max_concurrent_proof_requests = max;
        }
        if let Some(attempts) = overrides.max_retry_attempts {
            self.pipeline.max_retry_attempts = attempts;
        }
        if let Some(secs) = overrides.request_timeout_secs {
            self.calendar.request_timeout = Duration::from_secs(secs);
        }
        if let Some(urls) = &overrides.calendar_urls {
            self.calendar.urls = urls.clone();
        }
    }

    /// Current values of the operator-editable settings
    pub fn overrides(&self) -> FileOverrides {
        FileOverrides {
            mail_server_address: Some(self.mail.mail_server_address.clone()),
            outbound_server_address: Some(self.mail.outbound_server_address.clone()),
            reply_from_address: Some(self.mail.reply_from_address.clone()),
            max_concurrent_proof_requests: Some(self.pipeline.max_concurrent_proof_requests),
            max_retry_attempts: Some(self.pipeline.max_retry_attempts),
            request_timeout_secs: Some(self.calendar.request_timeout.as_secs()),
            calendar_urls: Some(self.calendar.urls.clone()),
        }
    }

    /// Persist the operator-editable settings to `config_file`
    pub fn save_file(&self) -> Result<()> {
        self.overrides().save(&self.config_file)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_concurrent_proof_requests == 0 {
            bail!("MAX_CONCURRENT_PROOF_REQUESTS must be at least 1");
        }
        if self.pipeline.max_retry_attempts == 0 {
            bail!("MAX_RETRY_ATTEMPTS must be at least 1");
        }
        if self.pipeline.storage_max_attempts == 0 || self.pipeline.delivery_max_attempts == 0 {
            bail!("STORAGE_MAX_ATTEMPTS and DELIVERY_MAX_ATTEMPTS must be at least 1");
        }
        if self.calendar.request_timeout.is_zero() {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }
        if self.calendar.urls.is_empty() {
            bail!("At least one calendar URL is required");
        }
        if !self.mail.reply_from_address.contains('@') {
            bail!(
                "REPLY_FROM_ADDRESS is not a mail address: {}",
                self.mail.reply_from_address
            );
        }
        Ok(())
    }
}
