//! Chain parameters.
//!
//! Network-specific consensus constants. Feature activations that the
//! original deployment gated on version-bit signalling are expressed here as
//! plain activation heights; the signalling window is kept only for the
//! template's `rules`/`vbavailable` reporting.

use corvus_types::{BlockHeader, Hash256};

/// Parameters of one long-living masternode quorum type.
#[derive(Debug, Clone)]
pub struct LlmqParams {
    /// Numeric quorum type identifier.
    pub llmq_type: u8,
    /// Human-readable name.
    pub name: &'static str,
    /// Quorum size in members.
    pub size: u32,
    /// Signing threshold in members.
    pub threshold: u32,
    /// Blocks between DKG sessions.
    pub dkg_interval: u32,
}

/// State of a version-bit deployment at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    /// Not yet signalling.
    Defined,
    /// Signalling window open; miners set the bit.
    Started,
    /// Rules are enforced.
    Active,
}

/// A version-bit deployment.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Deployment name as surfaced by `getblocktemplate`.
    pub name: &'static str,
    /// Version bit used while signalling.
    pub bit: u8,
    /// Whether clients may safely ignore the rule (no `!` prefix).
    pub gbt_force: bool,
    /// Height at which signalling starts.
    pub start_height: u32,
    /// Height at which the rules activate.
    pub active_height: u32,
}

impl Deployment {
    /// Deployment state for a block at `height`.
    pub fn state_at(&self, height: u32) -> DeploymentState {
        if height >= self.active_height {
            DeploymentState::Active
        } else if height >= self.start_height {
            DeploymentState::Started
        } else {
            DeploymentState::Defined
        }
    }

    /// Name with the BIP9 `!` prefix when client support is mandatory.
    pub fn gbt_name(&self) -> String {
        if self.gbt_force {
            self.name.to_string()
        } else {
            format!("!{}", self.name)
        }
    }
}

/// Consensus-critical constants.
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    /// Blocks between subsidy halvings.
    pub subsidy_halving_interval: u32,
    /// Height below which the subsidy ramps with the parent difficulty.
    pub subsidy_ramp_end: u32,
    /// Height from which masternode payments are required.
    pub masternode_payments_start_block: u32,
    /// Height of the first superblock.
    pub superblock_start_block: u32,
    /// Blocks between superblocks.
    pub superblock_cycle: u32,
    /// Activation height of the 2 MB block size increase.
    pub dip0001_height: u32,
    /// Activation height of special transactions and the coinbase payload.
    pub dip0003_height: u32,
    /// Activation height of the quorum-commitment merkle root (payload v2).
    pub dip0008_height: u32,
    /// Height from which blocks must be proof-of-stake.
    pub pos_start_height: u32,
    /// Height from which PoS blocks use the v2 kernel.
    pub pos_v2_start_height: u32,
    /// Target seconds between blocks.
    pub pow_target_spacing: i64,
    /// Retarget window in seconds.
    pub pow_target_timespan: i64,
    /// Easiest permitted target, in compact form.
    pub pow_limit_bits: u32,
    /// Whether stalled networks may fall back to the minimum difficulty.
    pub allow_min_difficulty_blocks: bool,
    /// Active quorum types.
    pub llmqs: Vec<LlmqParams>,
    /// Quorum type providing chain locks.
    pub llmq_chain_locks: u8,
    /// Version-bit deployments.
    pub deployments: Vec<Deployment>,
}

impl ConsensusParams {
    /// Blocks between difficulty adjustments.
    pub fn difficulty_adjustment_interval(&self) -> u32 {
        (self.pow_target_timespan / self.pow_target_spacing) as u32
    }

    /// Consensus block-size ceiling in bytes.
    pub fn max_block_size(&self, dip0001_active: bool) -> u64 {
        if dip0001_active {
            2_000_000
        } else {
            1_000_000
        }
    }

    /// Consensus signature-operation ceiling.
    pub fn max_block_sigops(&self, dip0001_active: bool) -> u64 {
        self.max_block_size(dip0001_active) / 50
    }

    /// True once the DIP0001 size increase applies at `height`.
    pub fn dip0001_active(&self, height: u32) -> bool {
        height >= self.dip0001_height
    }

    /// True once special transactions apply at `height`.
    pub fn dip0003_active(&self, height: u32) -> bool {
        height >= self.dip0003_height
    }

    /// True once the quorum merkle root applies at `height`.
    pub fn dip0008_active(&self, height: u32) -> bool {
        height >= self.dip0008_height
    }

    /// True once blocks at `height` must be proof-of-stake.
    pub fn pos_enforced(&self, height: u32) -> bool {
        height >= self.pos_start_height
    }
}

/// Network identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Main,
    Test,
    Regtest,
}

impl Network {
    /// Network name as reported by RPC.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Regtest => "regtest",
        }
    }
}

/// All parameters of one network.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,
    pub consensus: ConsensusParams,
    /// Test networks that mine on demand allow a `-blockversion` override.
    pub mine_blocks_on_demand: bool,
    /// Genesis block timestamp.
    pub genesis_time: u32,
    /// Genesis block nonce.
    pub genesis_nonce: u32,
}

fn standard_llmqs() -> Vec<LlmqParams> {
    vec![
        LlmqParams {
            llmq_type: 1,
            name: "llmq_50_60",
            size: 50,
            threshold: 30,
            dkg_interval: 24,
        },
        LlmqParams {
            llmq_type: 2,
            name: "llmq_400_60",
            size: 400,
            threshold: 240,
            dkg_interval: 288,
        },
        LlmqParams {
            llmq_type: 3,
            name: "llmq_400_85",
            size: 400,
            threshold: 340,
            dkg_interval: 576,
        },
    ]
}

impl ChainParams {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        ChainParams {
            network: Network::Main,
            consensus: ConsensusParams {
                subsidy_halving_interval: 210_240,
                subsidy_ramp_end: 5_000,
                masternode_payments_start_block: 1_000,
                superblock_start_block: 10_000,
                superblock_cycle: 16_616,
                dip0001_height: 5_500,
                dip0003_height: 7_000,
                dip0008_height: 7_500,
                pos_start_height: 200_000,
                pos_v2_start_height: 250_000,
                pow_target_spacing: 150,
                pow_target_timespan: 24 * 60 * 60,
                pow_limit_bits: 0x1e0f_fff0,
                allow_min_difficulty_blocks: false,
                llmqs: standard_llmqs(),
                llmq_chain_locks: 2,
                deployments: vec![Deployment {
                    name: "dip0008",
                    bit: 1,
                    gbt_force: true,
                    start_height: 7_200,
                    active_height: 7_500,
                }],
            },
            mine_blocks_on_demand: false,
            genesis_time: 1_626_442_320,
            genesis_nonce: 7_465_800,
        }
    }

    /// Testnet parameters.
    pub fn testnet() -> Self {
        let mut params = Self::mainnet();
        params.network = Network::Test;
        params.consensus.allow_min_difficulty_blocks = true;
        params.consensus.masternode_payments_start_block = 100;
        params.consensus.superblock_start_block = 500;
        params.consensus.pos_start_height = 2_000;
        params.consensus.pos_v2_start_height = 3_000;
        params.genesis_time = 1_618_221_600;
        params.genesis_nonce = 2_054_584;
        params
    }

    /// Regression-test parameters: minimal difficulty, instant activations.
    pub fn regtest() -> Self {
        ChainParams {
            network: Network::Regtest,
            consensus: ConsensusParams {
                subsidy_halving_interval: 150,
                subsidy_ramp_end: 0,
                masternode_payments_start_block: 100,
                superblock_start_block: 100,
                superblock_cycle: 10,
                dip0001_height: 2_000,
                dip0003_height: 3_000,
                dip0008_height: 3_500,
                pos_start_height: 10_000,
                pos_v2_start_height: 10_000,
                pow_target_spacing: 150,
                pow_target_timespan: 24 * 60 * 60,
                pow_limit_bits: 0x207f_ffff,
                allow_min_difficulty_blocks: true,
                llmqs: vec![LlmqParams {
                    llmq_type: 100,
                    name: "llmq_test",
                    size: 5,
                    threshold: 3,
                    dkg_interval: 24,
                }],
                llmq_chain_locks: 100,
                deployments: Vec::new(),
            },
            mine_blocks_on_demand: true,
            genesis_time: 1_618_221_600,
            genesis_nonce: 98_744,
        }
    }

    /// Parameters by network name.
    pub fn for_network(name: &str) -> Option<Self> {
        match name {
            "main" | "mainnet" => Some(Self::mainnet()),
            "test" | "testnet" => Some(Self::testnet()),
            "regtest" => Some(Self::regtest()),
            _ => None,
        }
    }

    /// The deterministic genesis header of this network.
    pub fn genesis_header(&self) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            time: self.genesis_time,
            bits: self.consensus.pow_limit_bits,
            nonce: self.genesis_nonce,
            ..BlockHeader::default()
        }
    }

    /// Block version for a freshly assembled block at `height`.
    ///
    /// BIP9 top bits, plus the bit of every deployment currently signalling,
    /// plus the PoS marker bits once stake blocks are enforced.
    pub fn compute_block_version(&self, height: u32) -> i32 {
        let mut version: u32 = 0x2000_0000;
        for deployment in &self.consensus.deployments {
            if deployment.state_at(height) == DeploymentState::Started {
                version |= 1 << deployment.bit;
            }
        }
        if self.consensus.pos_enforced(height) {
            version |= corvus_types::POS_BIT;
            if height >= self.consensus.pos_v2_start_height {
                version |= corvus_types::POSV2_BITS;
            }
        }
        version as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_names() {
        assert_eq!(ChainParams::mainnet().network.name(), "main");
        assert_eq!(ChainParams::testnet().network.name(), "test");
        assert_eq!(ChainParams::regtest().network.name(), "regtest");
    }

    #[test]
    fn test_for_network() {
        assert!(ChainParams::for_network("regtest").is_some());
        assert!(ChainParams::for_network("mainnet").is_some());
        assert!(ChainParams::for_network("nonsense").is_none());
    }

    #[test]
    fn test_block_size_limits() {
        let params = ChainParams::mainnet().consensus;
        assert_eq!(params.max_block_size(false), 1_000_000);
        assert_eq!(params.max_block_size(true), 2_000_000);
        assert_eq!(params.max_block_sigops(true), 40_000);
    }

    #[test]
    fn test_deployment_states() {
        let d = Deployment {
            name: "dip0008",
            bit: 1,
            gbt_force: true,
            start_height: 100,
            active_height: 200,
        };
        assert_eq!(d.state_at(99), DeploymentState::Defined);
        assert_eq!(d.state_at(100), DeploymentState::Started);
        assert_eq!(d.state_at(199), DeploymentState::Started);
        assert_eq!(d.state_at(200), DeploymentState::Active);
    }

    #[test]
    fn test_block_version_pos_bits() {
        let params = ChainParams::mainnet();
        let pow_version = params.compute_block_version(100) as u32;
        assert_eq!(pow_version & corvus_types::POS_BIT, 0);

        let pos_version = params.compute_block_version(200_000) as u32;
        assert_ne!(pos_version & corvus_types::POS_BIT, 0);

        let pos_v2 = params.compute_block_version(250_000) as u32;
        assert_eq!(pos_v2 & corvus_types::POSV2_BITS, corvus_types::POSV2_BITS);
    }

    #[test]
    fn test_block_version_signalling_bit() {
        let params = ChainParams::mainnet();
        // Inside the signalling window the deployment bit is set.
        let signalling = params.compute_block_version(7_300) as u32;
        assert_ne!(signalling & (1 << 1), 0);
        // After activation the bit is cleared again.
        let active = params.compute_block_version(7_600) as u32;
        assert_eq!(active & (1 << 1), 0);
    }

    #[test]
    fn test_difficulty_adjustment_interval() {
        let params = ChainParams::mainnet().consensus;
        assert_eq!(params.difficulty_adjustment_interval(), 576);
    }
}
