use super::handlers::{
    confirm_bank_transfer_req, fetch_payment_status_req, initiate_payment_req,
    payment_webhook_req, query_provider_status_req,
};
use actix_web::web;

pub fn payment_route(cfg: &mut web::ServiceConfig) {
    cfg.route("/initiate", web::post().to(initiate_payment_req))
        .route("/{id}/status", web::get().to(fetch_payment_status_req))
        .route(
            "/{id}/query-provider",
            web::post().to(query_provider_status_req),
        )
        .route(
            "/{id}/confirm-bank-transfer",
            web::post().to(confirm_bank_transfer_req),
        )
        .route("/webhook/{provider}", web::post().to(payment_webhook_req));
}
