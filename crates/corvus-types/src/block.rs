//! Block headers and blocks.
//!
//! The wire layout is the 80-byte base header followed, for proof-of-stake
//! blocks, by the stake reference and the block signature. The block hash
//! always covers exactly the 80-byte base preimage; the signature never
//! enters any hash stream.

use crate::encoding::{
    write_compact_size, write_hash, write_i32, write_u32, write_var_bytes, Decodable, DecodeError,
    Encodable, Reader,
};
use crate::hash::{blake2b256, Hash256};
use crate::merkle::merkle_root;
use crate::transaction::{OutPoint, Transaction};

/// Version bit marking a proof-of-stake block.
pub const POS_BIT: u32 = 0x1000_0000;

/// Version bits marking a proof-of-stake v2 block.
pub const POSV2_BITS: u32 = POS_BIT | 0x0800_0000;

/// Block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    /// PoW nonce; doubles as the stake modifier on PoS blocks.
    pub nonce: u32,
    /// Stake primary input transaction (PoS only).
    pub stake_hash: Hash256,
    /// Stake primary input output index (PoS only).
    pub stake_index: u32,
    /// Signature by the coinstake primary output key (PoS only).
    pub block_sig: Vec<u8>,
}

impl Default for BlockHeader {
    fn default() -> Self {
        BlockHeader {
            version: 0,
            prev_block: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            time: 0,
            bits: 0,
            nonce: 0,
            stake_hash: Hash256::ZERO,
            stake_index: 0,
            block_sig: Vec::new(),
        }
    }
}

impl BlockHeader {
    /// True when the proof-of-stake version bit is set.
    pub fn is_proof_of_stake(&self) -> bool {
        (self.version as u32) & POS_BIT != 0
    }

    /// True when both PoS v2 version bits are set.
    pub fn is_proof_of_stake_v2(&self) -> bool {
        (self.version as u32) & POSV2_BITS == POSV2_BITS
    }

    /// True for proof-of-work blocks.
    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    /// The stake modifier aliases the nonce field on PoS blocks.
    pub fn stake_modifier(&self) -> u32 {
        self.nonce
    }

    /// Outpoint of the staked input.
    pub fn stake_input(&self) -> OutPoint {
        OutPoint {
            txid: self.stake_hash,
            index: self.stake_index,
        }
    }

    /// The 80-byte hash preimage: the base header fields only.
    pub fn hash_preimage(&self) -> [u8; 80] {
        let mut buf = Vec::with_capacity(80);
        write_i32(&mut buf, self.version);
        write_hash(&mut buf, &self.prev_block);
        write_hash(&mut buf, &self.merkle_root);
        write_u32(&mut buf, self.time);
        write_u32(&mut buf, self.bits);
        write_u32(&mut buf, self.nonce);
        let mut out = [0u8; 80];
        out.copy_from_slice(&buf);
        out
    }

    /// Block hash: the chain digest of the 80-byte preimage.
    pub fn hash(&self) -> Hash256 {
        blake2b256(&self.hash_preimage())
    }
}

impl Encodable for BlockHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.hash_preimage());
        if self.is_proof_of_stake() {
            write_hash(out, &self.stake_hash);
            write_u32(out, self.stake_index);
            write_var_bytes(out, &self.block_sig);
        }
    }
}

impl Decodable for BlockHeader {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let version = r.read_i32()?;
        let prev_block = r.read_hash()?;
        let merkle_root = r.read_hash()?;
        let time = r.read_u32()?;
        let bits = r.read_u32()?;
        let nonce = r.read_u32()?;
        let mut header = BlockHeader {
            version,
            prev_block,
            merkle_root,
            time,
            bits,
            nonce,
            ..BlockHeader::default()
        };
        if header.is_proof_of_stake() {
            header.stake_hash = r.read_hash()?;
            header.stake_index = r.read_u32()?;
            header.block_sig = r.read_var_bytes()?;
        }
        Ok(header)
    }
}

/// A block: header plus ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Slot of the coinbase transaction.
    pub const COINBASE_INDEX: usize = 0;

    /// Slot of the coinstake transaction in PoS blocks.
    pub const STAKE_INDEX: usize = 1;

    /// The coinbase transaction, if the slot is populated.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.get(Self::COINBASE_INDEX)
    }

    /// The coinstake transaction, if the slot is populated.
    pub fn stake(&self) -> Option<&Transaction> {
        self.transactions.get(Self::STAKE_INDEX)
    }

    /// True when slot 0 holds a well-formed coinbase.
    pub fn has_coinbase(&self) -> bool {
        self.coinbase().map_or(false, |tx| tx.is_coinbase())
    }

    /// Merkle root over the current transaction ids.
    pub fn compute_merkle_root(&self) -> Hash256 {
        let txids: Vec<Hash256> = self.transactions.iter().map(|tx| tx.txid()).collect();
        merkle_root(&txids)
    }

    /// Serialized size of the whole block in bytes.
    pub fn total_size(&self) -> u64 {
        self.to_bytes().len() as u64
    }
}

impl Encodable for Block {
    fn encode(&self, out: &mut Vec<u8>) {
        self.header.encode(out);
        write_compact_size(out, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode(out);
        }
    }
}

impl Decodable for Block {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let header = BlockHeader::decode(r)?;
        let count = r.read_compact_size()?;
        let mut transactions = Vec::with_capacity(count as usize);
        for _ in 0..count {
            transactions.push(Transaction::decode(r)?);
        }
        Ok(Block {
            header,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use crate::transaction::{TxIn, TxOut};

    fn pow_header() -> BlockHeader {
        BlockHeader {
            version: 0x2000_0000u32 as i32,
            prev_block: blake2b256(b"prev"),
            merkle_root: blake2b256(b"merkle"),
            time: 1_700_000_000,
            bits: 0x1e0f_fff0,
            nonce: 42,
            ..BlockHeader::default()
        }
    }

    fn pos_header() -> BlockHeader {
        let mut header = pow_header();
        header.version = (0x2000_0000 | POS_BIT) as i32;
        header.stake_hash = blake2b256(b"stake");
        header.stake_index = 1;
        header.block_sig = vec![0xab; 65];
        header
    }

    #[test]
    fn test_pow_header_is_80_bytes() {
        assert_eq!(pow_header().to_bytes().len(), 80);
    }

    #[test]
    fn test_pow_header_round_trip() {
        let header = pow_header();
        let decoded = BlockHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_pos_header_round_trip() {
        let header = pos_header();
        let decoded = BlockHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(header, decoded);
        assert!(decoded.is_proof_of_stake());
        assert_eq!(decoded.block_sig.len(), 65);
    }

    #[test]
    fn test_signature_does_not_change_hash() {
        let mut header = pos_header();
        let before = header.hash();
        header.block_sig = vec![0xcd; 65];
        assert_eq!(header.hash(), before);
    }

    #[test]
    fn test_pos_v2_detection() {
        let mut header = pos_header();
        assert!(!header.is_proof_of_stake_v2());
        header.version = POSV2_BITS as i32;
        assert!(header.is_proof_of_stake_v2());
        // The v2 bit alone is not a PoS marker.
        header.version = 0x0800_0000;
        assert!(header.is_proof_of_work());
    }

    #[test]
    fn test_block_round_trip() {
        let coinbase = Transaction {
            inputs: vec![TxIn::new(OutPoint::null(), Script::new().push_num(101))],
            outputs: vec![TxOut {
                value: 25 * crate::COIN,
                script_pubkey: Script::new().push_op(crate::script::OP_TRUE),
            }],
            ..Transaction::default()
        };
        let mut block = Block {
            header: pow_header(),
            transactions: vec![coinbase],
        };
        block.header.merkle_root = block.compute_merkle_root();

        let decoded = Block::from_bytes(&block.to_bytes()).unwrap();
        assert_eq!(block, decoded);
        assert_eq!(block.header.hash(), decoded.header.hash());
        assert!(decoded.has_coinbase());
    }
}
