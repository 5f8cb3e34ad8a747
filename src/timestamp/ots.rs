// ============================================================================
// Detached Timestamp File (.ots) Framing
// ============================================================================
//
// A calendar answers a digest submission with a serialized timestamp that
// starts at that digest. Prefixed with the file header below, it becomes a
// standalone `.ots` proof that stock OpenTimestamps tooling can upgrade and
// verify:
//
//   magic (31 bytes) | major version (varuint 1) | op tag 0x08 (SHA-256)
//   | 32-byte digest | calendar timestamp bytes
//
// ============================================================================

use blocketch_types::{FINGERPRINT_LEN, Fingerprint};
use std::fmt;

/// File header magic of detached timestamp files
pub const HEADER_MAGIC: &[u8] =
    b"\x00OpenTimestamps\x00\x00Proof\x00\xbf\x89\xe2\xe8\x84\xe8\x92\x94";

/// Supported major version
pub const MAJOR_VERSION: u8 = 0x01;

/// Op tag of the SHA-256 file hash
pub const OP_SHA256: u8 = 0x08;

/// Wrap a calendar response as a detached timestamp file
pub fn detached_file(fingerprint: &Fingerprint, timestamp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_MAGIC.len() + 2 + FINGERPRINT_LEN + timestamp.len());
    out.extend_from_slice(HEADER_MAGIC);
    out.push(MAJOR_VERSION);
    out.push(OP_SHA256);
    out.extend_from_slice(fingerprint.as_bytes());
    out.extend_from_slice(timestamp);
    out
}

/// Split a detached timestamp file into its digest and timestamp bytes
pub fn parse_detached(bytes: &[u8]) -> Result<(Fingerprint, &[u8]), OtsError> {
    let rest = bytes
        .strip_prefix(HEADER_MAGIC)
        .ok_or(OtsError::BadMagic)?;

    let (&version, rest) = rest.split_first().ok_or(OtsError::Truncated)?;
    if version != MAJOR_VERSION {
        return Err(OtsError::UnsupportedVersion(version));
    }

    let (&op, rest) = rest.split_first().ok_or(OtsError::Truncated)?;
    if op != OP_SHA256 {
        return Err(OtsError::UnsupportedOp(op));
    }

    if rest.len() < FINGERPRINT_LEN {
        return Err(OtsError::Truncated);
    }
    let (digest, timestamp) = rest.split_at(FINGERPRINT_LEN);
    let fingerprint = Fingerprint::from_slice(digest).map_err(|_| OtsError::Truncated)?;
    Ok((fingerprint, timestamp))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtsError {
    BadMagic,
    UnsupportedVersion(u8),
    UnsupportedOp(u8),
    Truncated,
}

impl fmt::Display for OtsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtsError::BadMagic => write!(f, "Not a detached timestamp file"),
            OtsError::UnsupportedVersion(v) => write!(f, "Unsupported major version {}", v),
            OtsError::UnsupportedOp(op) => write!(f, "Unsupported file hash op 0x{:02x}", op),
            OtsError::Truncated => write!(f, "Detached timestamp file is truncated"),
        }
    }
}

impl std::error::Error for OtsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let fp = Fingerprint::from_bytes([0x11; FINGERPRINT_LEN]);
        let file = detached_file(&fp, &[0xf0, 0x10]);

        assert_eq!(HEADER_MAGIC.len(), 31);
        assert_eq!(&file[..31], HEADER_MAGIC);
        assert_eq!(file[31], 0x01);
        assert_eq!(file[32], 0x08);
        assert_eq!(&file[33..65], fp.as_bytes());
        assert_eq!(&file[65..], &[0xf0, 0x10]);

        let (parsed, timestamp) = parse_detached(&file).unwrap();
        assert_eq!(parsed, fp);
        assert_eq!(timestamp, &[0xf0, 0x10]);
    }

    #[test]
    fn test_parse_rejects_malformed_files() {
        let fp = Fingerprint::from_bytes([0x22; FINGERPRINT_LEN]);
        let file = detached_file(&fp, b"ts");

        assert_eq!(parse_detached(b"garbage"), Err(OtsError::BadMagic));
        assert_eq!(parse_detached(&file[..40]), Err(OtsError::Truncated));

        let mut wrong_version = file.clone();
        wrong_version[31] = 2;
        assert_eq!(
            parse_detached(&wrong_version),
            Err(OtsError::UnsupportedVersion(2))
        );

        let mut wrong_op = file;
        wrong_op[32] = 0x02;
        assert_eq!(parse_detached(&wrong_op), Err(OtsError::UnsupportedOp(0x02)));
    }
}
