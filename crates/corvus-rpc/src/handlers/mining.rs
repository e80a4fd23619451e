//! Block template and submission handlers.

use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, Json};
use corvus_consensus::{adjusted_time, compact_to_target, DeploymentState};
use corvus_miner::{
    generate_blocks, update_time, AssemblerDeps, BlockAssembler, BlockTemplate, DEFAULT_MAX_TRIES,
};
use corvus_miner::coinbase_flags;
use corvus_types::{
    Block, Decodable, Encodable, Hash256, Script, TxOut, OP_TRUE,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

/// Seconds a cached template stays fresh against pool churn.
const TEMPLATE_REFRESH_SECS: i64 = 5;

/// Long-poll timeout before transaction updates are consulted.
const LONGPOLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Long-poll re-check slice after the first timeout.
const LONGPOLL_RECHECK: Duration = Duration::from_secs(10);

/// `getblocktemplate` request per BIP22/BIP23.
#[derive(Deserialize, ToSchema, Default)]
#[serde(default)]
pub struct TemplateRequest {
    /// "template" (default) or "proposal".
    pub mode: Option<String>,
    /// Client capabilities; informational.
    pub capabilities: Option<Vec<String>>,
    /// Softfork rules the client understands.
    pub rules: Option<Vec<String>>,
    /// Long-poll id from a previous template.
    pub longpollid: Option<String>,
    /// Hex block for proposal mode.
    pub data: Option<String>,
}

/// One non-coinbase transaction of the template.
#[derive(Serialize, ToSchema)]
pub struct TemplateTransaction {
    /// Raw transaction hex.
    pub data: String,
    /// Transaction id.
    pub hash: String,
    /// 1-based indices of in-template parents.
    pub depends: Vec<usize>,
    /// Fee in base units.
    pub fee: i64,
    /// Legacy sigop count.
    pub sigops: i64,
}

/// A required payment output.
#[derive(Serialize, ToSchema)]
pub struct PaymentEntry {
    pub payee: String,
    pub script: String,
    pub amount: i64,
}

fn payment_entries(outputs: &[TxOut]) -> Vec<PaymentEntry> {
    outputs
        .iter()
        .map(|out| PaymentEntry {
            payee: out.script_pubkey.to_hex(),
            script: out.script_pubkey.to_hex(),
            amount: out.value,
        })
        .collect()
}

/// Hex of the 256-bit target encoded by `bits`.
pub(crate) fn target_hex(bits: u32) -> String {
    let target = compact_to_target(bits).unwrap_or_default();
    let bytes = target.to_bytes_be();
    let mut buf = [0u8; 32];
    if bytes.len() <= 32 {
        buf[32 - bytes.len()..].copy_from_slice(&bytes);
    }
    hex::encode(buf)
}

/// Split a long-poll id into the watched tip hash and update counter.
pub(crate) fn parse_longpollid(id: &str) -> Option<(Hash256, u64)> {
    if id.len() < 64 {
        return None;
    }
    let hash: Hash256 = id[..64].parse().ok()?;
    let updates = id[64..].parse().ok()?;
    Some((hash, updates))
}

/// Non-coinbase transactions with 1-based dependency indices.
pub(crate) fn template_transactions(template: &BlockTemplate) -> Vec<TemplateTransaction> {
    let mut index_of: BTreeMap<Hash256, usize> = BTreeMap::new();
    let mut out = Vec::new();
    for (i, tx) in template.block.transactions.iter().enumerate() {
        let txid = tx.txid();
        index_of.insert(txid, i);
        if tx.is_coinbase() {
            continue;
        }
        let depends = tx
            .inputs
            .iter()
            .filter_map(|input| index_of.get(&input.prevout.txid).copied())
            .collect();
        out.push(TemplateTransaction {
            data: hex::encode(tx.to_bytes()),
            hash: txid.to_hex(),
            depends,
            fee: template.fees[i],
            sigops: template.sig_ops[i],
        });
    }
    out
}

async fn wait_for_longpoll(state: &AppState, longpollid: &str) -> ApiResult<()> {
    let mut rx = state.tip_rx.clone();
    let (watched_hash, watched_updates) = match parse_longpollid(longpollid) {
        Some(parsed) => parsed,
        // Malformed ids watch the current state, easing manual testing.
        None => (*rx.borrow(), state.miner.mempool.transactions_updated()),
    };

    let mut deadline = tokio::time::Instant::now() + LONGPOLL_TIMEOUT;
    loop {
        if *rx.borrow() != watched_hash {
            return Ok(());
        }
        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => {
                return Err(ApiError::NotReady("shutting down".to_string()));
            }
            Err(_) => {
                // Timeout: serve anyway if the pool moved, else re-wait in
                // shorter slices.
                if state.miner.mempool.transactions_updated() != watched_updates {
                    return Ok(());
                }
                deadline += LONGPOLL_RECHECK;
            }
        }
    }
}

fn check_proposal(state: &AppState, data: &str) -> ApiResult<Value> {
    let bytes =
        hex::decode(data).map_err(|_| ApiError::BadRequest("block decode failed".to_string()))?;
    let block = Block::from_bytes(&bytes)
        .map_err(|_| ApiError::BadRequest("block decode failed".to_string()))?;
    let hash = block.header.hash();

    let chain = state.miner.chain.read();
    if chain.contains(&hash) {
        return Ok(json!("duplicate"));
    }
    if block.header.prev_block != chain.tip().hash {
        return Ok(json!("inconclusive-not-best-prevblk"));
    }
    drop(chain);

    match state
        .miner
        .deps
        .validity
        .test_block_validity(&block, false, true)
    {
        Ok(()) => Ok(Value::Null),
        Err(reason) if reason.is_empty() => Ok(json!("rejected")),
        Err(reason) => Ok(json!(reason)),
    }
}

/// POST /rpc/getblocktemplate
///
/// Data needed to construct a block on the current tip. Supports BIP22
/// proposal mode and long polling on the previous template's id.
#[utoipa::path(
    post,
    path = "/rpc/getblocktemplate",
    tag = "mining",
    request_body = TemplateRequest,
    responses(
        (status = 200, description = "Block template or proposal verdict"),
        (status = 503, description = "Node not ready", body = crate::error::ErrorResponse)
    )
)]
pub async fn getblocktemplate(
    State(state): State<AppState>,
    Json(request): Json<TemplateRequest>,
) -> ApiResult<Json<Value>> {
    let mode = request.mode.as_deref().unwrap_or("template");
    match mode {
        "proposal" => {
            let data = request
                .data
                .as_deref()
                .ok_or_else(|| ApiError::BadRequest("missing data for proposal".to_string()))?;
            return check_proposal(&state, data).map(Json);
        }
        "template" => {}
        _ => return Err(ApiError::BadRequest("invalid mode".to_string())),
    }

    if !state.miner.sync.is_synced() {
        return Err(ApiError::NotReady("node is syncing".to_string()));
    }

    if let Some(ref longpollid) = request.longpollid {
        wait_for_longpoll(&state, longpollid).await?;
    }

    let params = Arc::clone(&state.miner.params);
    let (tip, template, tx_updated) = {
        let tip = state.miner.chain.read().tip();
        let mut cache = state.gbt_cache.lock();
        let now = adjusted_time();
        let pool_updates = state.miner.mempool.transactions_updated();
        let stale = match cache.as_ref() {
            None => true,
            Some(cached) => {
                cached.prev_hash != tip.hash
                    || (cached.tx_updated != pool_updates
                        && now - cached.created > TEMPLATE_REFRESH_SECS)
            }
        };
        if stale {
            let script = Script::new().push_op(OP_TRUE);
            let mut assembler = BlockAssembler::new(
                Arc::clone(&params),
                state.miner.options.clone(),
                AssemblerDeps::clone(&state.miner.deps),
            );
            let template =
                assembler.create_new_block(&state.miner.chain, &state.miner.mempool, &script, None)?;
            state
                .handle
                .set_last_block(template.size, template.tx_count);
            *cache = Some(crate::CachedTemplate {
                template,
                prev_hash: tip.hash,
                created: now,
                tx_updated: pool_updates,
            });
        }
        let cached = cache.as_ref().expect("template cache populated above");
        (tip, cached.template.clone(), cached.tx_updated)
    };

    let mut block = template.block.clone();
    if block.header.is_proof_of_stake() {
        return Err(ApiError::NotReady(
            "proof-of-stake is activated".to_string(),
        ));
    }

    {
        let chain = state.miner.chain.read();
        update_time(&mut block.header, &chain, &tip, &params.consensus);
    }
    block.header.nonce = 0;

    let height = tip.height + 1;
    let consensus = &params.consensus;
    let mut rules = Vec::new();
    let mut vbavailable = serde_json::Map::new();
    for deployment in &consensus.deployments {
        match deployment.state_at(height) {
            DeploymentState::Defined => {}
            DeploymentState::Started => {
                vbavailable.insert(deployment.gbt_name(), json!(deployment.bit));
            }
            DeploymentState::Active => rules.push(deployment.gbt_name()),
        }
    }

    let transactions = template_transactions(&template);
    let dip0001_active = consensus.dip0001_active(height);
    let coinbase = block.coinbase().expect("template carries a coinbase");
    let response = json!({
        "capabilities": ["proposal"],
        "version": block.header.version,
        "rules": rules,
        "vbavailable": vbavailable,
        "vbrequired": 0,
        "previousblockhash": block.header.prev_block.to_hex(),
        "transactions": transactions,
        "coinbaseaux": { "flags": hex::encode(coinbase_flags().as_bytes()) },
        "coinbasevalue": coinbase.value_out(),
        "longpollid": format!("{}{}", tip.hash.to_hex(), tx_updated),
        "target": target_hex(block.header.bits),
        "mintime": state.miner.chain.read().median_time_past(tip.height) + 1,
        "mutable": ["time", "transactions", "prevblock"],
        "noncerange": "00000000ffffffff",
        "sigoplimit": consensus.max_block_sigops(dip0001_active),
        "sizelimit": consensus.max_block_size(dip0001_active),
        "curtime": block.header.time,
        "bits": format!("{:08x}", block.header.bits),
        "previousbits": format!("{:08x}", template.previous_bits),
        "height": height,
        "masternode": payment_entries(&template.masternode_payments),
        "masternode_payments_started": height > consensus.masternode_payments_start_block,
        "masternode_payments_enforced": true,
        "superblock": payment_entries(&template.superblock_payments),
        "superblocks_started": height > consensus.superblock_start_block,
        "superblocks_enabled": state.superblocks_enabled,
        "coinbase_payload": hex::encode(&coinbase.extra_payload),
    });
    Ok(Json(response))
}

/// `submitblock` request.
#[derive(Deserialize, ToSchema)]
pub struct SubmitBlockRequest {
    /// Hex-encoded block.
    pub hexdata: String,
}

/// POST /rpc/submitblock
///
/// Submit a complete block. Returns JSON null on acceptance, otherwise a
/// BIP22 rejection string.
#[utoipa::path(
    post,
    path = "/rpc/submitblock",
    tag = "mining",
    request_body = SubmitBlockRequest,
    responses(
        (status = 200, description = "null or a rejection string"),
        (status = 400, description = "Malformed block", body = crate::error::ErrorResponse)
    )
)]
pub async fn submitblock(
    State(state): State<AppState>,
    Json(request): Json<SubmitBlockRequest>,
) -> ApiResult<Json<Value>> {
    let bytes = hex::decode(&request.hexdata)
        .map_err(|_| ApiError::BadRequest("block decode failed".to_string()))?;
    let block = Block::from_bytes(&bytes)
        .map_err(|_| ApiError::BadRequest("block decode failed".to_string()))?;
    if !block.has_coinbase() {
        return Err(ApiError::BadRequest(
            "block does not start with a coinbase".to_string(),
        ));
    }

    let hash = block.header.hash();
    if state.miner.chain.read().contains(&hash) {
        return Ok(Json(json!("duplicate")));
    }

    use corvus_miner::ProcessOutcome;
    match state.miner.processor.process_new_block(&block) {
        ProcessOutcome::AcceptedNew => Ok(Json(Value::Null)),
        ProcessOutcome::Duplicate => Ok(Json(json!("duplicate"))),
        ProcessOutcome::Rejected(reason) if reason.is_empty() => Ok(Json(json!("rejected"))),
        ProcessOutcome::Rejected(reason) => Ok(Json(json!(reason))),
    }
}

/// `generatetoaddress` request.
#[derive(Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// Blocks to mine.
    pub nblocks: u32,
    /// Destination script public key, hex encoded.
    pub address: String,
    /// Total nonce budget (default 1,000,000).
    pub maxtries: Option<u64>,
}

/// POST /rpc/generatetoaddress
///
/// Mine blocks immediately to the given destination.
#[utoipa::path(
    post,
    path = "/rpc/generatetoaddress",
    tag = "generating",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Hashes of the accepted blocks"),
        (status = 400, description = "Invalid address", body = crate::error::ErrorResponse)
    )
)]
pub async fn generatetoaddress(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<Vec<String>>> {
    let script = Script::from_hex(&request.address)
        .map_err(|_| ApiError::BadRequest("invalid address".to_string()))?;
    if script.is_empty() {
        return Err(ApiError::BadRequest("invalid address".to_string()));
    }
    let max_tries = request.maxtries.unwrap_or(DEFAULT_MAX_TRIES);

    let ctx = state.miner.clone();
    let handle = Arc::clone(&state.handle);
    let nblocks = request.nblocks;
    // Nonce grinding is CPU-bound; keep it off the async runtime.
    let hashes = tokio::task::spawn_blocking(move || {
        generate_blocks(&ctx, &handle, &script, nblocks, max_tries)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("mining task failed: {e}")))??;

    Ok(Json(hashes.iter().map(Hash256::to_hex).collect()))
}

/// `getgenerate` response.
#[derive(Serialize, ToSchema)]
pub struct GetGenerateResponse {
    /// Configured `-gen` flag.
    pub config: bool,
    /// Whether workers are currently running.
    pub status: bool,
    /// Rolling hashes-per-second estimate.
    pub hps: f64,
    /// Worker thread count.
    pub threads: usize,
}

/// POST /rpc/getgenerate
#[utoipa::path(
    post,
    path = "/rpc/getgenerate",
    tag = "mining",
    responses((status = 200, description = "Generation state", body = GetGenerateResponse))
)]
pub async fn getgenerate(State(state): State<AppState>) -> ApiResult<Json<GetGenerateResponse>> {
    Ok(Json(GetGenerateResponse {
        config: state.gen_config,
        status: state.handle.is_running(),
        hps: state.handle.hashes_per_second(),
        threads: state.handle.threads(),
    }))
}

/// `setgenerate` request.
#[derive(Deserialize, ToSchema)]
pub struct SetGenerateRequest {
    /// Turn generation on or off.
    pub generate: bool,
    /// Worker count; -1 selects hardware concurrency, 0 turns mining off.
    pub genproclimit: Option<i32>,
}

/// POST /rpc/setgenerate
///
/// Start or stop the PoW worker pool.
#[utoipa::path(
    post,
    path = "/rpc/setgenerate",
    tag = "mining",
    request_body = SetGenerateRequest,
    responses((status = 200, description = "null"))
)]
pub async fn setgenerate(
    State(state): State<AppState>,
    Json(request): Json<SetGenerateRequest>,
) -> ApiResult<Json<Value>> {
    let threads = request.genproclimit.unwrap_or(-1);
    let generate = request.generate && threads != 0;

    let previous = state.pow_control.lock().take();
    if let Some(miner) = previous {
        miner.stop();
    }
    if generate {
        let miner = corvus_miner::PowMiner::start(
            state.miner.clone(),
            Arc::clone(&state.handle),
            state.mining_script.clone(),
            threads,
        )?;
        *state.pow_control.lock() = Some(miner);
    }
    Ok(Json(Value::Null))
}
