//! Content hashes.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a hex-encoded SHA-256 digest.
const HEX_LEN: usize = 64;

/// A SHA-256 digest of raw bytes, rendered as 64 lowercase hex characters.
///
/// Clients compute the same digest independently to decide what to upload,
/// so the encoding is fixed: no prefix, no uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Hashes `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Parses a hex digest received on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHash`] unless `s` is exactly 64
    /// lowercase hex characters.
    pub fn parse(s: &str) -> ProtocolResult<Self> {
        let well_formed = s.len() == HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(ProtocolError::InvalidHash(s.to_string()))
        }
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `bytes` hash to this digest.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        *self == Self::of(bytes)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ProtocolError;

    fn try_from(value: String) -> ProtocolResult<Self> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        let hash = ContentHash::of(b"some-content");
        assert_eq!(hash.as_str().len(), 64);
        // sha256 of the empty string
        assert_eq!(
            ContentHash::of(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn stable_across_calls() {
        assert_eq!(ContentHash::of(b"abc"), ContentHash::of(b"abc"));
        assert_ne!(ContentHash::of(b"abc"), ContentHash::of(b"abd"));
    }

    #[test]
    fn parse_rejects_bad_digests() {
        assert!(ContentHash::parse("").is_err());
        assert!(ContentHash::parse("abc").is_err());
        let upper = ContentHash::of(b"x").as_str().to_uppercase();
        assert!(ContentHash::parse(&upper).is_err());
        let good = ContentHash::of(b"x");
        assert_eq!(ContentHash::parse(good.as_str()).unwrap(), good);
    }

    #[test]
    fn matches_content() {
        let hash = ContentHash::of(b"payload");
        assert!(hash.matches(b"payload"));
        assert!(!hash.matches(b"other"));
    }

    #[test]
    fn serde_validates() {
        let good = format!("\"{}\"", ContentHash::of(b"x"));
        assert!(serde_json::from_str::<ContentHash>(&good).is_ok());
        assert!(serde_json::from_str::<ContentHash>("\"nope\"").is_err());
    }
}
