use utoipa::OpenApi;

use crate::routes::payment::handlers as payment_handlers;
use crate::routes::util::handlers as util_handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        payment_handlers::initiate_payment_req,
        payment_handlers::fetch_payment_status_req,
        payment_handlers::query_provider_status_req,
        payment_handlers::confirm_bank_transfer_req,
        payment_handlers::payment_webhook_req,
        util_handlers::health_check,
    ),
    tags(
        (name = "Payment", description = "Payment orchestration and reconciliation endpoints"),
        (name = "Util", description = "Operational endpoints")
    )
)]
pub struct ApiDoc {}
