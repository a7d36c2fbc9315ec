use super::errors::{PaymentError, WebhookError};
use super::schemas::{
    BankTransferConfirmRequest, Payment, PaymentInitiateData, PaymentInitiateRequest,
    WebhookProvider,
};
use super::store::PaymentStore;
use super::utils::{
    confirm_bank_transfer, dispatch_order_sync, initiate_payment, parse_webhook_event,
    query_provider_status, reconcile_webhook, verify_webhook_signature, ReconcileOutcome,
};
use crate::configuration::ProviderSettings;
use crate::errors::GenericError;
use crate::order_client::{OrderLookup, OrderSync};
use crate::providers::ProviderRegistry;
use crate::schemas::{GenericResponse, RequestMetaData};
use actix_web::{web, HttpRequest, HttpResponse};
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/payment/initiate",
    params(
        ("x-customer-id" = String, Header, description = "id of the customer making the payment"),
    ),
    request_body(content = PaymentInitiateRequest, description = "Request body to initiate a payment for an order"),
    responses(
        (status = 201, description = "Payment record created", body = GenericResponse<PaymentInitiateData>),
        (status = 400, description = "Invalid payment request"),
        (status = 409, description = "An active payment already exists for the order"),
    ),
    tag = "Payment"
)]
#[tracing::instrument(err, name = "initiate payment request", skip(store, registry, order_lookup, order_sync, body, meta), fields(customer_id = %meta.customer_id))]
pub async fn initiate_payment_req(
    body: PaymentInitiateRequest,
    store: web::Data<dyn PaymentStore>,
    registry: web::Data<ProviderRegistry>,
    order_lookup: web::Data<dyn OrderLookup>,
    order_sync: web::Data<dyn OrderSync>,
    meta: RequestMetaData,
) -> Result<HttpResponse, GenericError> {
    let data = initiate_payment(
        store.as_ref(),
        registry.as_ref(),
        order_lookup.as_ref(),
        order_sync.into_inner(),
        body,
        &meta,
    )
    .await
    .map_err(GenericError::from)?;
    Ok(HttpResponse::Created().json(GenericResponse::success(
        "Payment initiated successfully",
        Some(data),
    )))
}

#[utoipa::path(
    get,
    path = "/payment/{id}/status",
    params(
        ("id" = String, Path, description = "id of the payment"),
        ("x-customer-id" = String, Header, description = "id of the customer who owns the payment"),
    ),
    responses(
        (status = 200, description = "Current payment record", body = GenericResponse<Payment>),
        (status = 410, description = "No such payment for this customer"),
    ),
    tag = "Payment"
)]
#[tracing::instrument(err, name = "fetch payment status request", skip(store, meta), fields(customer_id = %meta.customer_id))]
pub async fn fetch_payment_status_req(
    path: web::Path<Uuid>,
    store: web::Data<dyn PaymentStore>,
    meta: RequestMetaData,
) -> Result<HttpResponse, GenericError> {
    let payment_id = path.into_inner();
    let payment = store
        .fetch(payment_id)
        .await
        .map_err(|e| GenericError::from(PaymentError::from(e)))?
        .filter(|payment| payment.customer_id == meta.customer_id)
        .ok_or_else(|| GenericError::DataNotFound("Payment not found".to_string()))?;
    Ok(HttpResponse::Ok().json(GenericResponse::success(
        "Payment fetched successfully",
        Some(payment),
    )))
}

#[utoipa::path(
    post,
    path = "/payment/{id}/query-provider",
    params(
        ("id" = String, Path, description = "id of the payment"),
        ("x-customer-id" = String, Header, description = "id of the customer who owns the payment"),
    ),
    responses(
        (status = 200, description = "Payment record after consulting the provider", body = GenericResponse<Payment>),
        (status = 410, description = "No such payment for this customer"),
    ),
    tag = "Payment"
)]
#[tracing::instrument(err, name = "query provider status request", skip(store, registry, order_sync, meta), fields(customer_id = %meta.customer_id))]
pub async fn query_provider_status_req(
    path: web::Path<Uuid>,
    store: web::Data<dyn PaymentStore>,
    registry: web::Data<ProviderRegistry>,
    order_sync: web::Data<dyn OrderSync>,
    meta: RequestMetaData,
) -> Result<HttpResponse, GenericError> {
    let payment = query_provider_status(
        store.as_ref(),
        registry.as_ref(),
        order_sync.into_inner(),
        path.into_inner(),
        &meta,
    )
    .await
    .map_err(GenericError::from)?;
    Ok(HttpResponse::Ok().json(GenericResponse::success(
        "Payment fetched successfully",
        Some(payment),
    )))
}

#[utoipa::path(
    post,
    path = "/payment/{id}/confirm-bank-transfer",
    params(
        ("id" = String, Path, description = "id of the payment"),
    ),
    request_body(content = BankTransferConfirmRequest, description = "Bank transfer reference and optional evidence"),
    responses(
        (status = 200, description = "Bank transfer recorded for verification", body = GenericResponse<Payment>),
        (status = 400, description = "Reference mismatch or wrong payment method"),
        (status = 409, description = "Already confirmed or already settled"),
    ),
    tag = "Payment"
)]
#[tracing::instrument(err, name = "confirm bank transfer request", skip(store, body))]
pub async fn confirm_bank_transfer_req(
    path: web::Path<Uuid>,
    body: BankTransferConfirmRequest,
    store: web::Data<dyn PaymentStore>,
) -> Result<HttpResponse, GenericError> {
    let payment = confirm_bank_transfer(
        store.as_ref(),
        path.into_inner(),
        &body.reference,
        body.evidence,
    )
    .await
    .map_err(GenericError::from)?;
    Ok(HttpResponse::Ok().json(GenericResponse::success(
        "Bank transfer recorded, pending verification",
        Some(payment),
    )))
}

#[utoipa::path(
    post,
    path = "/payment/webhook/{provider}",
    params(
        ("provider" = String, Path, description = "provider slug: mpesa | airtel-money | equitel | card"),
    ),
    request_body(content = String, description = "Raw provider webhook payload"),
    responses(
        (status = 200, description = "Webhook acknowledged"),
        (status = 400, description = "Unknown provider or unparseable payload"),
        (status = 401, description = "Webhook authentication failed"),
    ),
    tag = "Payment"
)]
#[tracing::instrument(name = "payment webhook request", skip(req, body, store, provider_settings, order_sync))]
pub async fn payment_webhook_req(
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
    store: web::Data<dyn PaymentStore>,
    provider_settings: web::Data<ProviderSettings>,
    order_sync: web::Data<dyn OrderSync>,
) -> Result<HttpResponse, WebhookError> {
    let provider_name = path.into_inner();
    let provider: WebhookProvider = provider_name.parse().map_err(|_| {
        WebhookError::ValidationError(format!("Unknown webhook provider: {}", provider_name))
    })?;

    if let Err(e) = verify_webhook_signature(provider, &provider_settings, &req, &body) {
        let source_ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        tracing::warn!(
            provider = %provider,
            source_ip = %source_ip,
            "Rejected webhook with failed authentication: {}",
            e
        );
        return Err(e);
    }

    let event = parse_webhook_event(provider, &body)?;
    let message = match reconcile_webhook(store.as_ref(), &event).await? {
        ReconcileOutcome::Applied { payment, action } => {
            tracing::info!(
                "Webhook moved payment {} to {}",
                payment.id,
                payment.status
            );
            dispatch_order_sync(order_sync.into_inner(), action);
            "Webhook processed"
        }
        ReconcileOutcome::AlreadySettled(payment) => {
            tracing::info!(
                "Webhook replay for settled payment {}, acknowledging",
                payment.id
            );
            "Payment already settled"
        }
        ReconcileOutcome::Ignored(payment) => {
            tracing::info!(
                "Webhook cannot advance payment {} in state {}, acknowledging",
                payment.id,
                payment.status
            );
            "Webhook acknowledged"
        }
        ReconcileOutcome::Unmatched => "Webhook acknowledged",
    };
    Ok(HttpResponse::Ok().json(GenericResponse::success(message, Some(()))))
}
