//! Mining status handlers.

use crate::{ApiResult, AppState};
use axum::{extract::State, Json};
use corvus_consensus::{bits_to_difficulty, Chain};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `getmininginfo` response.
#[derive(Serialize, ToSchema)]
pub struct MiningInfoResponse {
    /// Current chain height.
    pub blocks: u32,
    /// Size of the last assembled template.
    pub currentblocksize: u64,
    /// Transaction count of the last assembled template.
    pub currentblocktx: u64,
    /// Difficulty at the tip.
    pub difficulty: f64,
    /// Current status-bar warnings.
    pub errors: String,
    /// Estimated network hashes per second.
    pub networkhashps: f64,
    /// Mempool transaction count.
    pub pooledtx: usize,
    /// Network name.
    pub chain: String,
}

/// Average network hashes per second over the last `lookup` blocks, or
/// since the last difficulty change when `lookup` is non-positive. With a
/// non-negative `height` the estimate is taken at that block.
pub(crate) fn network_hash_ps(
    chain: &Chain,
    params: &corvus_consensus::ConsensusParams,
    lookup: i64,
    height: i64,
) -> f64 {
    let tip = chain.tip();
    let pb = if height >= 0 && (height as u32) < tip.height {
        match chain.at(height as u32) {
            Some(index) => index,
            None => return 0.0,
        }
    } else {
        tip
    };
    if pb.height == 0 {
        return 0.0;
    }

    let mut lookup = if lookup <= 0 {
        i64::from(pb.height % params.difficulty_adjustment_interval()) + 1
    } else {
        lookup
    };
    if lookup > i64::from(pb.height) {
        lookup = i64::from(pb.height);
    }

    let mut min_time = i64::from(pb.time);
    let mut max_time = min_time;
    let mut cursor = pb.clone();
    for _ in 0..lookup {
        cursor = match chain.at(cursor.height - 1) {
            Some(index) => index,
            None => break,
        };
        let time = i64::from(cursor.time);
        min_time = min_time.min(time);
        max_time = max_time.max(time);
    }
    if min_time == max_time {
        return 0.0;
    }

    let work_diff = pb.chain_work - cursor.chain_work;
    let time_diff = max_time - min_time;
    work_diff as f64 / time_diff as f64
}

/// POST /rpc/getmininginfo
#[utoipa::path(
    post,
    path = "/rpc/getmininginfo",
    tag = "mining",
    responses((status = 200, description = "Mining information", body = MiningInfoResponse))
)]
pub async fn getmininginfo(State(state): State<AppState>) -> ApiResult<Json<MiningInfoResponse>> {
    let params = &state.miner.params;
    let chain = state.miner.chain.read();
    let tip = chain.tip();
    let networkhashps = network_hash_ps(&chain, &params.consensus, 120, -1);
    drop(chain);

    Ok(Json(MiningInfoResponse {
        blocks: tip.height,
        currentblocksize: state.handle.last_block_size(),
        currentblocktx: state.handle.last_block_tx(),
        difficulty: bits_to_difficulty(tip.bits),
        errors: String::new(),
        networkhashps,
        pooledtx: state.miner.mempool.len(),
        chain: params.network.name().to_string(),
    }))
}

/// `getnetworkhashps` request.
#[derive(Deserialize, ToSchema, Default)]
#[serde(default)]
pub struct NetworkHashPsRequest {
    /// Blocks to average over; non-positive means since the last
    /// difficulty change.
    pub nblocks: Option<i64>,
    /// Estimate at this height; -1 means the tip.
    pub height: Option<i64>,
}

/// POST /rpc/getnetworkhashps
#[utoipa::path(
    post,
    path = "/rpc/getnetworkhashps",
    tag = "mining",
    request_body = NetworkHashPsRequest,
    responses((status = 200, description = "Hashes per second"))
)]
pub async fn getnetworkhashps(
    State(state): State<AppState>,
    Json(request): Json<NetworkHashPsRequest>,
) -> ApiResult<Json<f64>> {
    let chain = state.miner.chain.read();
    let hps = network_hash_ps(
        &chain,
        &state.miner.params.consensus,
        request.nblocks.unwrap_or(120),
        request.height.unwrap_or(-1),
    );
    Ok(Json(hps))
}
