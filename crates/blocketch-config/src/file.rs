// ============================================================================
// Config File Overlay
// ============================================================================
//
// Settings edited by the operator front-end are saved as a small JSON file
// and applied on top of the environment. The legacy key names written by the
// first front-end (imap_server / smtp_server / email_address) are accepted.
// Empty strings mean "not set".
//
// ============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Operator-editable subset of the configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOverrides {
    #[serde(default, alias = "imap_server", skip_serializing_if = "Option::is_none")]
    pub mail_server_address: Option<String>,

    #[serde(default, alias = "smtp_server", skip_serializing_if = "Option::is_none")]
    pub outbound_server_address: Option<String>,

    #[serde(default, alias = "email_address", skip_serializing_if = "Option::is_none")]
    pub reply_from_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_proof_requests: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_attempts: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_urls: Option<Vec<String>>,
}

impl FileOverrides {
    /// Read the overlay; a missing file is not an error
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config file {}", path.display()));
            }
        };

        let overrides: FileOverrides = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(Some(overrides.normalized()))
    }

    /// Write the overlay atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config dir {}", dir.display()))?;

        let json = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        let tmp_path = dir.join(format!(".config-{}.tmp", uuid::Uuid::new_v4().simple()));

        let mut file = std::fs::File::create(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to publish config file {}", path.display()))?;
        Ok(())
    }

    fn normalized(mut self) -> Self {
        fn non_empty(value: Option<String>) -> Option<String> {
            value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }

        self.mail_server_address = non_empty(self.mail_server_address);
        self.outbound_server_address = non_empty(self.outbound_server_address);
        self.reply_from_address = non_empty(self.reply_from_address);
        self.calendar_urls = self
            .calendar_urls
            .map(|urls| crate::calendar::parse_url_list(&urls.join(",")))
            .filter(|urls| !urls.is_empty());
        self
    }
}
