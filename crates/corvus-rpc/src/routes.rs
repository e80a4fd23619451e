//! API route definitions.

use crate::{handlers, AppState};
use axum::{routing::post, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Template and submission
        .route(
            "/rpc/getblocktemplate",
            post(handlers::mining::getblocktemplate),
        )
        .route("/rpc/submitblock", post(handlers::mining::submitblock))
        .route(
            "/rpc/generatetoaddress",
            post(handlers::mining::generatetoaddress),
        )
        // Generation control
        .route("/rpc/getgenerate", post(handlers::mining::getgenerate))
        .route("/rpc/setgenerate", post(handlers::mining::setgenerate))
        // Status
        .route("/rpc/getmininginfo", post(handlers::info::getmininginfo))
        .route(
            "/rpc/getnetworkhashps",
            post(handlers::info::getnetworkhashps),
        )
        // Pool controls
        .route(
            "/rpc/prioritisetransaction",
            post(handlers::pool::prioritisetransaction),
        )
        .route("/rpc/reservebalance", post(handlers::pool::reservebalance))
        // Fee estimation
        .route("/rpc/estimatefee", post(handlers::pool::estimatefee))
        .route(
            "/rpc/estimatesmartfee",
            post(handlers::pool::estimatesmartfee),
        )
        .route(
            "/rpc/estimaterawfee",
            post(handlers::pool::estimaterawfee),
        )
        // Apply middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
