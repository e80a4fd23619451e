//! Proof-of-work: compact bits, target checks, retargeting.

use crate::chain::{BlockIndex, Chain};
use crate::params::ConsensusParams;
use corvus_types::Hash256;
use num_bigint::BigUint;

/// Decode compact difficulty bits into a 256-bit target.
///
/// Returns `None` for negative or overflowing encodings.
pub fn compact_to_target(bits: u32) -> Option<BigUint> {
    let size = (bits >> 24) as u32;
    let mut word = bits & 0x007f_ffff;
    if bits & 0x0080_0000 != 0 {
        // Sign bit set: no valid target.
        return None;
    }
    let target = if size <= 3 {
        word >>= 8 * (3 - size);
        BigUint::from(word)
    } else {
        BigUint::from(word) << (8 * (size - 3))
    };
    if target.bits() > 256 {
        return None;
    }
    Some(target)
}

/// Encode a target as compact difficulty bits.
pub fn target_to_compact(target: &BigUint) -> u32 {
    let bytes = target.to_bytes_be();
    let mut size = bytes.len() as u32;
    let mut word: u32 = match bytes.len() {
        0 => 0,
        1 => u32::from(bytes[0]) << 16,
        2 => (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8),
        _ => (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]),
    };
    // Avoid setting the sign bit; shift the mantissa down instead.
    if word & 0x0080_0000 != 0 {
        word >>= 8;
        size += 1;
    }
    (size << 24) | word
}

/// True when `hash` meets the target encoded by `bits`.
pub fn check_proof_of_work(hash: &Hash256, bits: u32, params: &ConsensusParams) -> bool {
    let target = match compact_to_target(bits) {
        Some(t) => t,
        None => return false,
    };
    let limit = match compact_to_target(params.pow_limit_bits) {
        Some(t) => t,
        None => return false,
    };
    if target == BigUint::from(0u32) || target > limit {
        return false;
    }
    BigUint::from_bytes_be(hash.as_bytes()) <= target
}

/// Difficulty of `bits` relative to a difficulty-1 target.
pub fn bits_to_difficulty(bits: u32) -> f64 {
    let mut shift = (bits >> 24) & 0xff;
    let mut diff = 65535.0 / f64::from(bits & 0x00ff_ffff).max(1.0);
    while shift < 29 {
        diff *= 256.0;
        shift += 1;
    }
    while shift > 29 {
        diff /= 256.0;
        shift -= 1;
    }
    diff
}

/// Expected work of one block at `bits`: `2^256 / (target + 1)`, saturated
/// to 128 bits.
pub fn work_for_bits(bits: u32) -> u128 {
    let target = match compact_to_target(bits) {
        Some(t) => t,
        None => return 0,
    };
    let numerator = BigUint::from(1u32) << 256;
    let work: BigUint = numerator / (target + BigUint::from(1u32));
    let bytes = work.to_bytes_be();
    if bytes.len() > 16 {
        return u128::MAX;
    }
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(&bytes);
    u128::from_be_bytes(buf)
}

/// Required compact bits for the block following `prev`.
///
/// Networks that allow minimum-difficulty blocks fall back to the easiest
/// target when the new block's time is more than twice the target spacing
/// past the parent. Otherwise the difficulty retargets once per adjustment
/// interval from the clamped timespan of the previous window.
pub fn get_next_work_required(
    chain: &Chain,
    prev: &BlockIndex,
    header_time: i64,
    params: &ConsensusParams,
) -> u32 {
    if params.allow_min_difficulty_blocks
        && header_time > i64::from(prev.time) + params.pow_target_spacing * 2
    {
        return params.pow_limit_bits;
    }

    let interval = params.difficulty_adjustment_interval();
    let next_height = prev.height + 1;
    if next_height % interval != 0 || next_height < interval {
        return prev.bits;
    }

    let first = match chain.at(next_height - interval) {
        Some(index) => index,
        None => return prev.bits,
    };
    let mut actual_timespan = i64::from(prev.time) - i64::from(first.time);
    actual_timespan = actual_timespan.clamp(
        params.pow_target_timespan / 4,
        params.pow_target_timespan * 4,
    );

    let prev_target = match compact_to_target(prev.bits) {
        Some(t) => t,
        None => return params.pow_limit_bits,
    };
    let limit = compact_to_target(params.pow_limit_bits).expect("pow limit bits are valid");
    let mut new_target =
        prev_target * BigUint::from(actual_timespan as u64) / BigUint::from(params.pow_target_timespan as u64);
    if new_target > limit {
        new_target = limit;
    }
    target_to_compact(&new_target)
}
