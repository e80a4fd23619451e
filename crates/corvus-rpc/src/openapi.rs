//! OpenAPI documentation.

use utoipa::OpenApi;

/// API documentation for the mining RPC surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::mining::getblocktemplate,
        crate::handlers::mining::submitblock,
        crate::handlers::mining::generatetoaddress,
        crate::handlers::mining::getgenerate,
        crate::handlers::mining::setgenerate,
        crate::handlers::info::getmininginfo,
        crate::handlers::info::getnetworkhashps,
        crate::handlers::pool::prioritisetransaction,
        crate::handlers::pool::reservebalance,
        crate::handlers::pool::estimatefee,
        crate::handlers::pool::estimatesmartfee,
        crate::handlers::pool::estimaterawfee,
    ),
    components(schemas(
        crate::error::ErrorResponse,
        crate::handlers::mining::TemplateRequest,
        crate::handlers::mining::TemplateTransaction,
        crate::handlers::mining::PaymentEntry,
        crate::handlers::mining::SubmitBlockRequest,
        crate::handlers::mining::GenerateRequest,
        crate::handlers::mining::GetGenerateResponse,
        crate::handlers::mining::SetGenerateRequest,
        crate::handlers::info::MiningInfoResponse,
        crate::handlers::info::NetworkHashPsRequest,
        crate::handlers::pool::PrioritiseRequest,
        crate::handlers::pool::ReserveBalanceRequest,
        crate::handlers::pool::ReserveBalanceResponse,
        crate::handlers::pool::EstimateFeeRequest,
        crate::handlers::pool::EstimateSmartFeeRequest,
        crate::handlers::pool::EstimateRawFeeRequest,
    )),
    tags(
        (name = "mining", description = "Block template construction and submission"),
        (name = "generating", description = "Synchronous block generation"),
        (name = "util", description = "Fee estimation"),
    )
)]
pub struct ApiDoc;
