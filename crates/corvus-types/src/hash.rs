//! 256-bit hashes and the chain digest.

use blake2::{Blake2b, Digest};
use std::fmt;
use std::str::FromStr;

type Blake2b256 = Blake2b<blake2::digest::consts::U32>;

/// A 256-bit hash.
///
/// Used for transaction ids, block hashes and merkle nodes. Displayed as
/// lowercase hex in stored byte order; the derived `Ord` over the bytes is
/// the deterministic tie-break order used by the mempool indices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Hex string of the hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

/// Error parsing a hash from hex.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid hash hex: {0}")]
pub struct ParseHashError(String);

impl FromStr for Hash256 {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| ParseHashError(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseHashError(s.to_string()))?;
        Ok(Hash256(arr))
    }
}

/// Blake2b-256 of arbitrary bytes.
pub fn blake2b256(data: &[u8]) -> Hash256 {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash256(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_round_trip() {
        let h = blake2b256(b"corvus");
        let parsed: Hash256 = h.to_hex().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(blake2b256(b"a"), blake2b256(b"a"));
        assert_ne!(blake2b256(b"a"), blake2b256(b"b"));
    }

    #[test]
    fn test_zero_hash() {
        assert!(Hash256::ZERO.is_zero());
        assert!(!blake2b256(b"x").is_zero());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("zz".parse::<Hash256>().is_err());
        assert!("00".parse::<Hash256>().is_err());
    }
}
