//! Content fingerprints.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

/// Length of a fingerprint rendered as lowercase hex.
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// A SHA-256 digest of a content unit's bytes.
///
/// Fingerprints name objects in every content-addressable store: two units
/// with identical bytes share one fingerprint, and therefore one object,
/// regardless of which repository they were published in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Creates a fingerprint from raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes the fingerprint of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = FingerprintHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Computes the fingerprint of everything `reader` yields.
    ///
    /// Returns the fingerprint and the number of bytes read.
    pub fn compute_reader<R: Read>(mut reader: R) -> io::Result<(Self, u64)> {
        let mut hasher = FingerprintHasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let len = hasher.len();
        Ok((hasher.finalize(), len))
    }

    /// Parses a lowercase hex digest.
    pub fn from_hex(s: &str) -> ProtocolResult<Self> {
        if s.len() != FINGERPRINT_HEX_LEN {
            return Err(ProtocolError::InvalidFingerprint {
                value: s.to_string(),
                reason: format!("expected {} hex characters, got {}", FINGERPRINT_HEX_LEN, s.len()),
            });
        }
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(ProtocolError::InvalidFingerprint {
                value: s.to_string(),
                reason: "must be lowercase".into(),
            });
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| ProtocolError::InvalidFingerprint {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// Renders the digest as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl FromStr for Fingerprint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental fingerprint computation for streamed content.
#[derive(Clone, Default)]
pub struct FingerprintHasher {
    inner: Sha256,
    len: u64,
}

impl FingerprintHasher {
    /// Creates an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if no bytes were hashed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Consumes the hasher and returns the fingerprint.
    pub fn finalize(self) -> Fingerprint {
        Fingerprint(self.inner.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        let fp = Fingerprint::compute(b"hello world");
        assert_eq!(
            fp.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn hex_roundtrip_and_display() {
        let fp = Fingerprint::compute(b"unit");
        let parsed: Fingerprint = fp.to_hex().parse().unwrap();
        assert_eq!(parsed, fp);
        assert_eq!(fp.to_string(), fp.to_hex());
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(Fingerprint::from_hex("abc").is_err());
        assert!(Fingerprint::from_hex(&"Z".repeat(64)).is_err());
        let upper = Fingerprint::compute(b"x").to_hex().to_uppercase();
        assert!(Fingerprint::from_hex(&upper).is_err());
    }

    #[test]
    fn reader_matches_buffer() {
        let data = vec![7u8; 200_000];
        let (fp, len) = Fingerprint::compute_reader(&data[..]).unwrap();
        assert_eq!(fp, Fingerprint::compute(&data));
        assert_eq!(len, 200_000);
    }

    #[test]
    fn serde_as_hex_string() {
        let fp = Fingerprint::compute(b"abc");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
