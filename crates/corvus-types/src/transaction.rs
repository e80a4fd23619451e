//! Transactions.
//!
//! The wire format packs the original 32-bit version field as two
//! little-endian `u16`s: the transaction version and the special-transaction
//! type. Version 3 transactions carry an extra payload whose meaning depends
//! on the type.

use crate::encoding::{
    compact_size_len, write_compact_size, write_hash, write_i64, write_u16, write_u32, Decodable,
    DecodeError, Encodable, Reader,
};
use crate::hash::{blake2b256, Hash256};
use crate::script::Script;
use crate::Amount;

/// Sequence value that opts an input out of lock-time enforcement.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Plain payment transaction type.
pub const TX_TYPE_STANDARD: u16 = 0;

/// Special coinbase transaction carrying the typed payload.
pub const TX_TYPE_COINBASE: u16 = 5;

/// Transaction version from which the extra payload is serialized.
pub const TX_VERSION_SPECIAL: u16 = 3;

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Id of the transaction holding the output.
    pub txid: Hash256,
    /// Output position within that transaction.
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        OutPoint {
            txid: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    /// True for the coinbase marker outpoint.
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u32::MAX
    }
}

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxIn {
    /// Input spending `prevout` with a final sequence.
    pub fn new(prevout: OutPoint, script_sig: Script) -> Self {
        TxIn {
            prevout,
            script_sig,
            sequence: SEQUENCE_FINAL,
        }
    }
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Script,
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u16,
    pub tx_type: u16,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
    /// Typed payload, serialized from version 3 onward.
    pub extra_payload: Vec<u8>,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            version: 1,
            tx_type: TX_TYPE_STANDARD,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            extra_payload: Vec::new(),
        }
    }
}

impl Transaction {
    /// Transaction id: the chain digest of the serialized transaction.
    pub fn txid(&self) -> Hash256 {
        blake2b256(&self.to_bytes())
    }

    /// True for the block-creating transaction (single null-prevout input).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Serialized size in bytes.
    pub fn total_size(&self) -> u64 {
        let mut size = 4u64; // version + type
        size += compact_size_len(self.inputs.len() as u64) as u64;
        for input in &self.inputs {
            size += 36; // prevout
            size += compact_size_len(input.script_sig.len() as u64) as u64;
            size += input.script_sig.len() as u64;
            size += 4; // sequence
        }
        size += compact_size_len(self.outputs.len() as u64) as u64;
        for output in &self.outputs {
            size += 8; // value
            size += compact_size_len(output.script_pubkey.len() as u64) as u64;
            size += output.script_pubkey.len() as u64;
        }
        size += 4; // lock time
        if self.version >= TX_VERSION_SPECIAL {
            size += compact_size_len(self.extra_payload.len() as u64) as u64;
            size += self.extra_payload.len() as u64;
        }
        size
    }

    /// Sum of output values.
    pub fn value_out(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Legacy signature-operation count over all input and output scripts.
    pub fn legacy_sigop_count(&self) -> u32 {
        let inputs: u32 = self.inputs.iter().map(|i| i.script_sig.sigop_count()).sum();
        let outputs: u32 = self
            .outputs
            .iter()
            .map(|o| o.script_pubkey.sigop_count())
            .sum();
        inputs + outputs
    }
}

impl Encodable for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        write_u16(out, self.version);
        write_u16(out, self.tx_type);
        write_compact_size(out, self.inputs.len() as u64);
        for input in &self.inputs {
            write_hash(out, &input.prevout.txid);
            write_u32(out, input.prevout.index);
            input.script_sig.encode(out);
            write_u32(out, input.sequence);
        }
        write_compact_size(out, self.outputs.len() as u64);
        for output in &self.outputs {
            write_i64(out, output.value);
            output.script_pubkey.encode(out);
        }
        write_u32(out, self.lock_time);
        if self.version >= TX_VERSION_SPECIAL {
            write_compact_size(out, self.extra_payload.len() as u64);
            out.extend_from_slice(&self.extra_payload);
        }
    }
}

impl Decodable for Transaction {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let version = r.read_u16()?;
        let tx_type = r.read_u16()?;
        let input_count = r.read_compact_size()?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let txid = r.read_hash()?;
            let index = r.read_u32()?;
            let script_sig = Script::decode(r)?;
            let sequence = r.read_u32()?;
            inputs.push(TxIn {
                prevout: OutPoint { txid, index },
                script_sig,
                sequence,
            });
        }
        let output_count = r.read_compact_size()?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            let value = r.read_i64()?;
            let script_pubkey = Script::decode(r)?;
            outputs.push(TxOut {
                value,
                script_pubkey,
            });
        }
        let lock_time = r.read_u32()?;
        let extra_payload = if version >= TX_VERSION_SPECIAL {
            r.read_var_bytes()?
        } else {
            Vec::new()
        };
        Ok(Transaction {
            version,
            tx_type,
            inputs,
            outputs,
            lock_time,
            extra_payload,
        })
    }
}
