//! Artifact digests and checksum verification.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel digest value that exempts a library from verification.
pub const NO_CHECK: &str = "NOCHECK";

/// Errors produced when parsing a digest string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("{algorithm} digest must be {expected} hex characters, got {actual}")]
    Length {
        algorithm: DigestAlgorithm,
        expected: usize,
        actual: usize,
    },

    #[error("digest contains non-hex characters")]
    NotHex,
}

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    /// Length of the hex encoding of a digest.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Sha256 => 64,
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha1 => f.write_str("sha1"),
            Self::Sha256 => f.write_str("sha256"),
        }
    }
}

/// A digest value tagged with its algorithm. The hex form is kept lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    pub algorithm: DigestAlgorithm,
    pub hex: String,
}

impl Digest {
    /// Parse a hex digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has the wrong length or is not hex.
    pub fn parse(algorithm: DigestAlgorithm, value: &str) -> Result<Self, DigestError> {
        if value.len() != algorithm.hex_len() {
            return Err(DigestError::Length {
                algorithm,
                expected: algorithm.hex_len(),
                actual: value.len(),
            });
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::NotHex);
        }
        Ok(Self {
            algorithm,
            hex: value.to_ascii_lowercase(),
        })
    }

    /// Compute the digest of `data`.
    #[must_use]
    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let hex = match algorithm {
            DigestAlgorithm::Sha1 => {
                use sha1::{Digest as _, Sha1};
                let mut hasher = Sha1::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
            DigestAlgorithm::Sha256 => {
                use sha2::{Digest as _, Sha256};
                let mut hasher = Sha256::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
        };
        Self { algorithm, hex }
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// What a library declares about its integrity.
///
/// `Skip` is the explicit `NOCHECK` opt-out. It is a distinct state from a
/// declared digest that simply has not been checked yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestRequirement {
    Verify(Digest),
    Skip,
}

impl DigestRequirement {
    /// The expected digest, if one is declared.
    #[must_use]
    pub fn expected(&self) -> Option<&Digest> {
        match self {
            Self::Verify(d) => Some(d),
            Self::Skip => None,
        }
    }
}

impl std::fmt::Display for DigestRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verify(d) => d.fmt(f),
            Self::Skip => f.write_str(NO_CHECK),
        }
    }
}

/// Validates artifact bytes against an expected digest.
pub trait ChecksumVerifier: Send + Sync {
    fn verify(&self, bytes: &[u8], expected: &Digest) -> bool;
}

/// Verifier backed by the RustCrypto hash implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardVerifier;

impl ChecksumVerifier for StandardVerifier {
    fn verify(&self, bytes: &[u8], expected: &Digest) -> bool {
        Digest::compute(expected.algorithm, bytes).hex == expected.hex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_sha1() {
        let digest = Digest::compute(DigestAlgorithm::Sha1, b"hello world");
        assert_eq!(digest.hex, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn test_compute_sha256() {
        let digest = Digest::compute(DigestAlgorithm::Sha256, b"hello world");
        assert_eq!(
            digest.hex,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_parse_normalizes_case() {
        let digest = Digest::parse(
            DigestAlgorithm::Sha1,
            "2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED",
        )
        .unwrap();
        assert_eq!(digest.hex, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        assert_eq!(digest.to_string(), "sha1:2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let err = Digest::parse(DigestAlgorithm::Sha256, "abcd").unwrap_err();
        assert!(matches!(err, DigestError::Length { expected: 64, actual: 4, .. }));
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        let value = "z".repeat(40);
        assert_eq!(
            Digest::parse(DigestAlgorithm::Sha1, &value),
            Err(DigestError::NotHex)
        );
    }

    #[test]
    fn test_standard_verifier() {
        let expected = Digest::compute(DigestAlgorithm::Sha256, b"payload");
        assert!(StandardVerifier.verify(b"payload", &expected));
        assert!(!StandardVerifier.verify(b"tampered", &expected));
    }

    #[test]
    fn test_skip_is_distinct() {
        assert_eq!(DigestRequirement::Skip.expected(), None);
        assert_eq!(DigestRequirement::Skip.to_string(), "NOCHECK");
    }
}
