// ============================================================================
// Proof Store & Fingerprint Configuration
// ============================================================================

use crate::constants::*;
use std::path::PathBuf;

/// Where proofs are persisted
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding one `{fingerprint}.ots` blob per fingerprint
    pub dir: PathBuf,
}

impl StoreConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            dir: std::env::var("PROOF_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROOF_STORE_DIR)),
        }
    }
}

/// Fingerprint construction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerprintMode {
    /// SHA-256 of the content
    Digest,
    /// SHA-256 of a deterministic Ed25519 signature under the service key
    Signed,
}

impl std::str::FromStr for FingerprintMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digest" => Ok(FingerprintMode::Digest),
            "signed" => Ok(FingerprintMode::Signed),
            other => Err(anyhow::anyhow!("Unknown FINGERPRINT_MODE: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FingerprintConfig {
    pub mode: FingerprintMode,
    /// Service signing key (created on first start in Signed mode)
    pub key_path: PathBuf,
}

impl FingerprintConfig {
    pub(crate) fn from_env(store: &StoreConfig) -> anyhow::Result<Self> {
        let mode = match std::env::var("FINGERPRINT_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => FingerprintMode::Signed,
        };

        Ok(Self {
            mode,
            key_path: std::env::var("FINGERPRINT_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| store.dir.join(SIGNING_KEY_FILE_NAME)),
        })
    }
}
