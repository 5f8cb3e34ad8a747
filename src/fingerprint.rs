// ============================================================================
// Fingerprint Engine
// ============================================================================
//
// Deterministic, content-addressing hash over message bytes. Two
// constructions are available:
//
// - ContentDigest: SHA-256(content)
// - SignedDigest:  SHA-256(Ed25519-sign(service_key, content))
//
// Ed25519 signatures are deterministic (RFC 8032), and the service key is
// long-lived, so SignedDigest is a pure function of the content for a given
// deployment. Identical content always converges on one proof record.
//
// Both are pure: no I/O and no shared mutable state after construction.
//
// ============================================================================

use anyhow::{Context, Result};
use blocketch_config::{FingerprintConfig, FingerprintMode};
use blocketch_error::{StampError, StampResult};
use blocketch_types::{FINGERPRINT_LEN, Fingerprint};
use ed25519_dalek::{SECRET_KEY_LENGTH, Signer, SigningKey};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Content fingerprint function
pub trait Fingerprinter: Send + Sync {
    /// Fingerprint message content.
    ///
    /// Fails with `StampError::Encoding` when the content is not valid
    /// message text.
    fn fingerprint(&self, content: &[u8]) -> StampResult<Fingerprint>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Message text must decode as UTF-8 before it is fingerprinted
fn decode_content(content: &[u8]) -> StampResult<&str> {
    std::str::from_utf8(content).map_err(|e| {
        StampError::encoding(format!(
            "invalid UTF-8 at byte {}",
            e.valid_up_to()
        ))
    })
}

fn sha256(bytes: &[u8]) -> Fingerprint {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; FINGERPRINT_LEN];
    out.copy_from_slice(&digest);
    Fingerprint::from_bytes(out)
}

/// SHA-256 over the content bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentDigest;

impl Fingerprinter for ContentDigest {
    fn fingerprint(&self, content: &[u8]) -> StampResult<Fingerprint> {
        let text = decode_content(content)?;
        Ok(sha256(text.as_bytes()))
    }

    fn name(&self) -> &'static str {
        "digest"
    }
}

/// SHA-256 over a deterministic Ed25519 signature of the content
pub struct SignedDigest {
    signing_key: SigningKey,
}

impl SignedDigest {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Load the service key from `path`, creating it on first use.
    ///
    /// The key file holds the raw 32-byte secret and is created with 0600
    /// permissions via a temp file + rename, so a crash never leaves a
    /// truncated key behind.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let secret: [u8; SECRET_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
                    anyhow::anyhow!(
                        "Signing key {} must be {} bytes, found {}",
                        path.display(),
                        SECRET_KEY_LENGTH,
                        bytes.len()
                    )
                })?;
                Ok(Self::new(SigningKey::from_bytes(&secret)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let secret: [u8; SECRET_KEY_LENGTH] = rand::random();
                write_key_file(path, &secret)?;
                info!(path = %path.display(), "Created new fingerprint signing key");
                Ok(Self::new(SigningKey::from_bytes(&secret)))
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read signing key {}", path.display())),
        }
    }

    /// Public half of the service key, hex encoded
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }
}

impl Fingerprinter for SignedDigest {
    fn fingerprint(&self, content: &[u8]) -> StampResult<Fingerprint> {
        let text = decode_content(content)?;
        let signature = self.signing_key.sign(text.as_bytes());
        Ok(sha256(&signature.to_bytes()))
    }

    fn name(&self) -> &'static str {
        "signed"
    }
}

fn write_key_file(path: &Path, secret: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create key dir {}", dir.display()))?;

    let tmp_path = dir.join(format!(".signing-key-{}.tmp", uuid::Uuid::new_v4().simple()));
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    file.write_all(secret)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to publish signing key {}", path.display()))?;
    Ok(())
}

/// Build the configured fingerprinter
pub fn from_config(config: &FingerprintConfig) -> Result<Arc<dyn Fingerprinter>> {
    Ok(match config.mode {
        FingerprintMode::Digest => Arc::new(ContentDigest),
        FingerprintMode::Signed => {
            let signed = SignedDigest::load_or_create(&config.key_path)?;
            info!(
                verifying_key = %signed.verifying_key_hex(),
                "Using signed fingerprints"
            );
            Arc::new(signed)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn fixed_signer() -> SignedDigest {
        SignedDigest::new(SigningKey::from_bytes(&[42u8; SECRET_KEY_LENGTH]))
    }

    #[test]
    fn test_content_digest_known_vector() {
        let fp = ContentDigest.fingerprint(b"hello world").unwrap();
        assert_eq!(
            fp.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_identical_content_identical_fingerprint() {
        let signer = fixed_signer();
        let a = signer.fingerprint(b"Subject: hi\r\n\r\nhello world").unwrap();
        let b = signer.fingerprint(b"Subject: hi\r\n\r\nhello world").unwrap();
        assert_eq!(a, b);

        // A fresh instance with the same key agrees (stable across restarts)
        assert_eq!(a, fixed_signer().fingerprint(b"Subject: hi\r\n\r\nhello world").unwrap());
    }

    #[test]
    fn test_signed_differs_from_plain_digest_and_other_keys() {
        let content = b"hello world";
        let signed = fixed_signer().fingerprint(content).unwrap();
        let other_key = SignedDigest::new(SigningKey::from_bytes(&[7u8; SECRET_KEY_LENGTH]))
            .fingerprint(content)
            .unwrap();

        assert_ne!(signed, ContentDigest.fingerprint(content).unwrap());
        assert_ne!(signed, other_key);
    }

    #[test]
    fn test_invalid_utf8_is_encoding_error() {
        let result = ContentDigest.fingerprint(&[0x68, 0x69, 0xff, 0xfe]);
        assert!(matches!(result, Err(StampError::Encoding(_))));

        let result = fixed_signer().fingerprint(&[0xc3]);
        assert!(matches!(result, Err(StampError::Encoding(_))));
    }

    #[test]
    fn test_no_collisions_over_random_sample() {
        use rand::Rng;
        use rand::distributions::Alphanumeric;

        let signer = fixed_signer();
        let mut rng = rand::thread_rng();
        let mut contents = HashSet::new();
        let mut digests = HashSet::new();
        let mut signed = HashSet::new();

        while contents.len() < 5_000 {
            let len = rng.gen_range(1..64);
            let text: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect();
            if !contents.insert(text.clone()) {
                continue;
            }
            assert!(digests.insert(ContentDigest.fingerprint(text.as_bytes()).unwrap()));
            assert!(signed.insert(signer.fingerprint(text.as_bytes()).unwrap()));
        }
    }

    #[test]
    fn test_load_or_create_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join(".signing-key");

        let first = SignedDigest::load_or_create(&path).unwrap();
        let second = SignedDigest::load_or_create(&path).unwrap();
        assert_eq!(first.verifying_key_hex(), second.verifying_key_hex());
        assert_eq!(
            first.fingerprint(b"same").unwrap(),
            second.fingerprint(b"same").unwrap()
        );
    }
}
