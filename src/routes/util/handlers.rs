use actix_web::{HttpResponse, Responder};

#[utoipa::path(
    get,
    path = "/util/health_check",
    responses(
        (status = 200, description = "Service is up"),
    ),
    tag = "Util"
)]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("Running Server")
}
