//! Pool control and fee estimation handlers.

use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, Json};
use corvus_types::{Amount, Hash256, CENT, COIN};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

/// `prioritisetransaction` request.
#[derive(Deserialize, ToSchema)]
pub struct PrioritiseRequest {
    /// Transaction id.
    pub txid: String,
    /// Fee delta in base units; not actually paid, only counted by block
    /// selection.
    pub fee_delta: Amount,
}

/// POST /rpc/prioritisetransaction
#[utoipa::path(
    post,
    path = "/rpc/prioritisetransaction",
    tag = "mining",
    request_body = PrioritiseRequest,
    responses((status = 200, description = "true"))
)]
pub async fn prioritisetransaction(
    State(state): State<AppState>,
    Json(request): Json<PrioritiseRequest>,
) -> ApiResult<Json<bool>> {
    let txid: Hash256 = request
        .txid
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid txid".to_string()))?;
    state.miner.mempool.prioritise(&txid, request.fee_delta);
    Ok(Json(true))
}

/// `reservebalance` request.
#[derive(Deserialize, ToSchema, Default)]
#[serde(default)]
pub struct ReserveBalanceRequest {
    /// Turn the reserve on or off; omitted shows the current setting.
    pub reserve: Option<bool>,
    /// Amount to reserve, in base units.
    pub amount: Option<Amount>,
}

/// `reservebalance` response.
#[derive(Serialize, ToSchema)]
pub struct ReserveBalanceResponse {
    pub reserve: bool,
    /// Reserved amount in whole coins.
    pub amount: f64,
}

/// POST /rpc/reservebalance
///
/// Show or set the balance withheld from staking.
#[utoipa::path(
    post,
    path = "/rpc/reservebalance",
    tag = "mining",
    request_body = ReserveBalanceRequest,
    responses(
        (status = 200, description = "Reserve state", body = ReserveBalanceResponse),
        (status = 400, description = "Invalid amount", body = crate::error::ErrorResponse)
    )
)]
pub async fn reservebalance(
    State(state): State<AppState>,
    Json(request): Json<ReserveBalanceRequest>,
) -> ApiResult<Json<ReserveBalanceResponse>> {
    if let Some(reserve) = request.reserve {
        if reserve {
            let amount = request.amount.ok_or_else(|| {
                ApiError::BadRequest("must provide amount to reserve balance".to_string())
            })?;
            if amount < 0 {
                return Err(ApiError::BadRequest("amount cannot be negative".to_string()));
            }
            // Round down to a whole cent.
            state.handle.set_reserve_balance((amount / CENT) * CENT);
        } else {
            if request.amount.is_some() {
                return Err(ApiError::BadRequest(
                    "cannot specify amount to turn off reserve".to_string(),
                ));
            }
            state.handle.set_reserve_balance(0);
        }
    }

    let reserved = state.handle.reserve_balance();
    Ok(Json(ReserveBalanceResponse {
        reserve: reserved > 0,
        amount: reserved as f64 / COIN as f64,
    }))
}

/// Fee estimation request.
#[derive(Deserialize, ToSchema)]
pub struct EstimateFeeRequest {
    /// Confirmation target in blocks.
    pub nblocks: u32,
}

/// POST /rpc/estimatefee
///
/// Estimated fee per kilobyte, or -1 when no estimate is available.
#[utoipa::path(
    post,
    path = "/rpc/estimatefee",
    tag = "util",
    request_body = EstimateFeeRequest,
    responses((status = 200, description = "Fee per kB in whole coins, or -1"))
)]
pub async fn estimatefee(
    State(state): State<AppState>,
    Json(request): Json<EstimateFeeRequest>,
) -> ApiResult<Json<f64>> {
    let target = request.nblocks.max(1);
    match state.estimator.estimate_fee(target) {
        Some(rate) => Ok(Json(rate.per_kb() as f64 / COIN as f64)),
        None => Ok(Json(-1.0)),
    }
}

/// `estimatesmartfee` request.
#[derive(Deserialize, ToSchema)]
pub struct EstimateSmartFeeRequest {
    /// Confirmation target in blocks.
    pub conf_target: u32,
    /// "CONSERVATIVE" (default), "ECONOMICAL" or "UNSET".
    pub estimate_mode: Option<String>,
}

/// POST /rpc/estimatesmartfee
#[utoipa::path(
    post,
    path = "/rpc/estimatesmartfee",
    tag = "util",
    request_body = EstimateSmartFeeRequest,
    responses((status = 200, description = "Smart fee estimate"))
)]
pub async fn estimatesmartfee(
    State(state): State<AppState>,
    Json(request): Json<EstimateSmartFeeRequest>,
) -> ApiResult<Json<Value>> {
    let max_target = state.estimator.highest_target_tracked();
    if request.conf_target < 1 || request.conf_target > max_target {
        return Err(ApiError::BadRequest(format!(
            "invalid conf_target, must be between 1 - {max_target}"
        )));
    }
    let conservative = match request.estimate_mode.as_deref() {
        None | Some("CONSERVATIVE") | Some("UNSET") => true,
        Some("ECONOMICAL") => false,
        Some(_) => {
            return Err(ApiError::BadRequest(
                "invalid estimate_mode parameter".to_string(),
            ))
        }
    };

    match state
        .estimator
        .estimate_smart_fee(request.conf_target, conservative)
    {
        Some((rate, blocks)) => Ok(Json(json!({
            "feerate": rate.per_kb() as f64 / COIN as f64,
            "blocks": blocks,
        }))),
        None => Ok(Json(json!({
            "errors": ["Insufficient data or no feerate found"],
            "blocks": 0,
        }))),
    }
}

/// `estimaterawfee` request.
#[derive(Deserialize, ToSchema)]
pub struct EstimateRawFeeRequest {
    /// Confirmation target in blocks.
    pub conf_target: u32,
    /// Bucket pass threshold.
    pub threshold: Option<f64>,
}

/// POST /rpc/estimaterawfee
///
/// Unstable advanced interface; delegates to the estimator per horizon.
#[utoipa::path(
    post,
    path = "/rpc/estimaterawfee",
    tag = "hidden",
    request_body = EstimateRawFeeRequest,
    responses((status = 200, description = "Per-horizon estimates"))
)]
pub async fn estimaterawfee(
    State(state): State<AppState>,
    Json(request): Json<EstimateRawFeeRequest>,
) -> ApiResult<Json<Value>> {
    let threshold = request.threshold.unwrap_or(0.95);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ApiError::BadRequest("invalid threshold".to_string()));
    }
    let mut result = serde_json::Map::new();
    for horizon in ["short", "medium", "long"] {
        let entry = match state.estimator.estimate_fee(request.conf_target.max(1)) {
            Some(rate) => json!({ "feerate": rate.per_kb() as f64 / COIN as f64 }),
            None => json!({
                "errors": ["Insufficient data or no feerate found which meets threshold"],
            }),
        };
        result.insert(horizon.to_string(), entry);
    }
    Ok(Json(Value::Object(result)))
}
