//! Block subsidy schedule.

use crate::params::ConsensusParams;
use crate::pow::bits_to_difficulty;
use corvus_types::{Amount, COIN};

/// Base whole-coin subsidy after the ramp.
const BASE_SUBSIDY: f64 = 25.0;

/// Subsidy of the block following the parent at (`prev_bits`, `prev_height`).
///
/// The subsidy is keyed to the PARENT block: an early-chain ramp derived from
/// the parent difficulty discourages instamine at trivial difficulty, after
/// which a fixed base halves every `subsidy_halving_interval` blocks.
pub fn block_subsidy(prev_bits: u32, prev_height: u32, params: &ConsensusParams) -> Amount {
    let base = if prev_height < params.subsidy_ramp_end {
        let difficulty = bits_to_difficulty(prev_bits);
        let scaled = 1111.0 / ((difficulty + 51.0) / 6.0).powi(2);
        scaled.clamp(1.0, BASE_SUBSIDY)
    } else {
        BASE_SUBSIDY
    };

    let halvings = prev_height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return 0;
    }
    ((base * COIN as f64) as Amount) >> halvings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ChainParams;

    #[test]
    fn test_ramp_caps_low_difficulty() {
        let params = ChainParams::mainnet().consensus;
        // At trivial difficulty the ramp pays well under the base subsidy.
        let easy = block_subsidy(0x207f_ffff, 10, &params);
        assert!(easy >= COIN);
        assert!(easy < 25 * COIN);
    }

    #[test]
    fn test_established_chain_pays_base() {
        let params = ChainParams::mainnet().consensus;
        assert_eq!(block_subsidy(0x1c00_ffff, 100_000, &params), 25 * COIN);
    }

    #[test]
    fn test_halving() {
        let params = ChainParams::mainnet().consensus;
        let interval = params.subsidy_halving_interval;
        let full = block_subsidy(0x1c00_ffff, interval - 1, &params);
        let halved = block_subsidy(0x1c00_ffff, interval, &params);
        assert_eq!(halved * 2, full);
    }

    #[test]
    fn test_subsidy_runs_out() {
        let params = ChainParams::regtest().consensus;
        assert_eq!(block_subsidy(0x207f_ffff, 150 * 64, &params), 0);
    }

    #[test]
    fn test_regtest_has_no_ramp() {
        let params = ChainParams::regtest().consensus;
        assert_eq!(block_subsidy(0x207f_ffff, 0, &params), 25 * COIN);
        assert_eq!(block_subsidy(0x207f_ffff, 150, &params), 25 * COIN / 2);
    }
}
