//! API error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// API errors.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or invalid request parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The node cannot serve this request yet (syncing, shutting down,
    /// wrong consensus phase).
    #[error("not ready: {0}")]
    NotReady(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Mempool error.
    #[error("mempool error: {0}")]
    Mempool(#[from] corvus_mempool::MempoolError),

    /// Consensus error.
    #[error("consensus error: {0}")]
    Consensus(#[from] corvus_consensus::ConsensusError),

    /// Mining error.
    #[error("mining error: {0}")]
    Miner(#[from] corvus_miner::MinerError),
}

/// Error response body.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: u16,
    pub reason: String,
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            ApiError::BadRequest(_) | ApiError::Mempool(_) => {
                (StatusCode::BAD_REQUEST, "Bad Request")
            }
            ApiError::NotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, "Not Ready"),
            ApiError::Internal(_) | ApiError::Miner(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            ApiError::Consensus(_) => (StatusCode::BAD_REQUEST, "Validation Error"),
        };
        let body = ErrorResponse {
            error: status.as_u16(),
            reason: reason.to_string(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
