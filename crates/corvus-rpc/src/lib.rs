//! # corvus-rpc
//!
//! Mining RPC surface for the Corvus node.
//!
//! This crate provides:
//! - `getblocktemplate` with template caching, long polling and proposal mode
//! - `submitblock` and `generatetoaddress`
//! - Mining status endpoints (`getmininginfo`, `getnetworkhashps`,
//!   `getgenerate`, `setgenerate`)
//! - Pool controls (`prioritisetransaction`, `reservebalance`) and thin
//!   fee-estimation delegates

mod error;
pub mod handlers;
mod openapi;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use state::{AppState, CachedTemplate, FeeEstimator, NullFeeEstimator};

use std::net::SocketAddr;
use tracing::info;

/// Serve the RPC API until the server task is dropped.
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "RPC server listening");
    axum::serve(listener, router).await
}
