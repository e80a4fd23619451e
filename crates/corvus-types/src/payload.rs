//! Special-transaction payloads.

use crate::encoding::{write_hash, write_u16, write_u32, Decodable, DecodeError, Encodable, Reader};
use crate::hash::Hash256;

/// Typed payload of the special coinbase transaction.
///
/// Version 1 commits to the deterministic masternode list; version 2 adds the
/// commitment to the active quorum set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbasePayload {
    pub version: u16,
    pub height: u32,
    pub mn_list_root: Hash256,
    /// Present from payload version 2.
    pub quorum_root: Option<Hash256>,
}

impl CoinbasePayload {
    /// Payload committing to the masternode list only.
    pub fn v1(height: u32, mn_list_root: Hash256) -> Self {
        CoinbasePayload {
            version: 1,
            height,
            mn_list_root,
            quorum_root: None,
        }
    }

    /// Payload committing to the masternode list and quorum set.
    pub fn v2(height: u32, mn_list_root: Hash256, quorum_root: Hash256) -> Self {
        CoinbasePayload {
            version: 2,
            height,
            mn_list_root,
            quorum_root: Some(quorum_root),
        }
    }
}

impl Encodable for CoinbasePayload {
    fn encode(&self, out: &mut Vec<u8>) {
        write_u16(out, self.version);
        write_u32(out, self.height);
        write_hash(out, &self.mn_list_root);
        if self.version >= 2 {
            write_hash(out, self.quorum_root.as_ref().unwrap_or(&Hash256::ZERO));
        }
    }
}

impl Decodable for CoinbasePayload {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let version = r.read_u16()?;
        let height = r.read_u32()?;
        let mn_list_root = r.read_hash()?;
        let quorum_root = if version >= 2 {
            Some(r.read_hash()?)
        } else {
            None
        };
        Ok(CoinbasePayload {
            version,
            height,
            mn_list_root,
            quorum_root,
        })
    }
}
