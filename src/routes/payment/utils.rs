use super::errors::{PaymentError, WebhookError};
use super::schemas::{
    AirtelWebhookPayload, CardWebhookPayload, EquitelWebhookPayload, MpesaWebhookPayload, Payment,
    PaymentInitiateData, PaymentInitiateRequest, PaymentStatus, ProviderDetails, WebhookEvent,
    WebhookOutcome, WebhookProvider,
};
use super::state::{validate_transition, TransitionError};
use super::store::{PaymentChange, PaymentStore, StoreError};
use crate::configuration::ProviderSettings;
use crate::constants::{
    INITIATE_BACKOFF_MS, MAX_INITIATE_ATTEMPTS, MAX_ORDER_SYNC_ATTEMPTS, ORDER_SYNC_BACKOFF_MS,
};
use crate::order_client::{OrderLookup, OrderPaymentStatus, OrderSnapshot, OrderSync};
use crate::providers::{
    InitiateOutcome, ProviderAdapter, ProviderError, ProviderPaymentStatus, ProviderQuery,
    ProviderRegistry,
};
use crate::schemas::RequestMetaData;
use actix_web::HttpRequest;
use blake2::digest::Mac;
use blake2::Blake2bMac512;
use chrono::Utc;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub fn validate_order_for_payment(
    order: &OrderSnapshot,
    meta: &RequestMetaData,
) -> Result<(), PaymentError> {
    if order.customer_id != meta.customer_id {
        return Err(PaymentError::DataNotFound("Order not found".to_string()));
    }
    if order.payment_status == OrderPaymentStatus::Paid {
        return Err(PaymentError::ValidationError(
            "Order is already paid".to_string(),
        ));
    }
    Ok(())
}

fn build_payment(
    order: &OrderSnapshot,
    request: &PaymentInitiateRequest,
    details: ProviderDetails,
    meta: &RequestMetaData,
) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        order_id: order.id,
        customer_id: order.customer_id,
        amount: order.grand_total.clone(),
        currency: order.currency_code,
        method: request.method,
        status: PaymentStatus::Pending,
        provider_ref: None,
        provider_details: details,
        failure_reason: None,
        security_context: meta.into(),
        created_at: now,
        processed_at: None,
        updated_at: now,
    }
}

async fn initiate_with_retry(
    adapter: &dyn ProviderAdapter,
    payment: &Payment,
    request: &PaymentInitiateRequest,
) -> Result<InitiateOutcome, ProviderError> {
    let mut attempt = 1u32;
    loop {
        match adapter.initiate(payment, &request.method_params).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.retryable() && attempt < MAX_INITIATE_ATTEMPTS => {
                let delay = INITIATE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tracing::warn!(
                    "Provider initiation attempt {} for payment {} failed ({}), retrying in {}ms",
                    attempt,
                    payment.id,
                    e,
                    delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Creates the payment record and drives the provider initiation. The
/// conditional create enforces the one-active-payment-per-order invariant;
/// a provider failure lands the record in `failed` with the captured
/// reason, never in a dangling `pending`.
#[tracing::instrument(
    name = "initiate payment",
    skip(store, registry, order_lookup, order_sync, request, meta),
    fields(order_id = %request.order_id, method = %request.method)
)]
pub async fn initiate_payment(
    store: &dyn PaymentStore,
    registry: &ProviderRegistry,
    order_lookup: &dyn OrderLookup,
    order_sync: Arc<dyn OrderSync>,
    request: PaymentInitiateRequest,
    meta: &RequestMetaData,
) -> Result<PaymentInitiateData, PaymentError> {
    let adapter = registry.get(request.method).ok_or_else(|| {
        PaymentError::ValidationError(format!("Payment method {} is not supported", request.method))
    })?;
    let details = adapter
        .validate(&request.method_params)
        .map_err(|e| PaymentError::ValidationError(e.to_string()))?;

    let order = order_lookup
        .get(request.order_id)
        .await
        .map_err(|e| PaymentError::UnexpectedCustomError(e.to_string()))?
        .ok_or_else(|| PaymentError::DataNotFound("Order not found".to_string()))?;
    validate_order_for_payment(&order, meta)?;

    let payment = build_payment(&order, &request, details, meta);
    if let Err(e) = store.create(&payment).await {
        return Err(match e {
            // Point the caller at the payment holding the slot so it can
            // poll that one instead of initiating again.
            StoreError::ActivePaymentExists(order_id) => {
                match store
                    .fetch_active_by_order(order_id)
                    .await
                    .map_err(PaymentError::from)?
                {
                    Some(existing) => PaymentError::ConflictError(format!(
                        "Payment {} is already active for order {}, query its status instead",
                        existing.id, order_id
                    )),
                    None => StoreError::ActivePaymentExists(order_id).into(),
                }
            }
            other => other.into(),
        });
    }

    match initiate_with_retry(adapter.as_ref(), &payment, &request).await {
        Ok(outcome) => {
            let mut change = PaymentChange::to(outcome.status);
            change.provider_ref = outcome.provider_ref;
            change.provider_details = outcome.details;
            if outcome.status.is_terminal() {
                change.processed_at = Some(Utc::now());
            }
            let payment = store
                .apply_transition(payment.id, PaymentStatus::Pending, change)
                .await
                .map_err(PaymentError::from)?;
            if payment.status == PaymentStatus::Completed {
                dispatch_order_sync(order_sync, SyncAction::MarkPaid(payment.order_id));
            }
            Ok(PaymentInitiateData {
                payment,
                provider_instructions: outcome.customer_message,
            })
        }
        Err(e) => {
            let reason = e.failure_reason();
            tracing::warn!("Provider initiation for payment {} failed: {}", payment.id, e);
            let mut change = PaymentChange::to(PaymentStatus::Failed);
            change.failure_reason = Some(reason.clone());
            change.processed_at = Some(Utc::now());
            let payment = store
                .apply_transition(payment.id, PaymentStatus::Pending, change)
                .await
                .map_err(PaymentError::from)?;
            Ok(PaymentInitiateData {
                payment,
                provider_instructions: format!("Payment could not be initiated: {}", reason),
            })
        }
    }
}

/// Client-driven poll path for providers without reliable webhooks. Funnels
/// through the same optimistic precondition as the reconciler, so whichever
/// of poll/webhook lands first wins and the other becomes a no-op.
#[tracing::instrument(name = "query provider status", skip(store, registry, order_sync, meta))]
pub async fn query_provider_status(
    store: &dyn PaymentStore,
    registry: &ProviderRegistry,
    order_sync: Arc<dyn OrderSync>,
    payment_id: Uuid,
    meta: &RequestMetaData,
) -> Result<Payment, PaymentError> {
    let payment = store
        .fetch(payment_id)
        .await
        .map_err(PaymentError::from)?
        .ok_or_else(|| PaymentError::DataNotFound("Payment not found".to_string()))?;
    if payment.customer_id != meta.customer_id {
        return Err(PaymentError::DataNotFound("Payment not found".to_string()));
    }
    if payment.status.is_terminal() {
        return Ok(payment);
    }
    let provider_ref = match payment.provider_ref.as_deref() {
        Some(provider_ref) => provider_ref,
        None => return Ok(payment),
    };
    let adapter = registry.get(payment.method).ok_or_else(|| {
        PaymentError::ValidationError(format!("Payment method {} is not supported", payment.method))
    })?;

    let reported = match adapter
        .query(provider_ref)
        .await
        .map_err(|e| PaymentError::UnexpectedCustomError(e.to_string()))?
    {
        ProviderQuery::Unsupported => return Ok(payment),
        ProviderQuery::Status(reported) => reported,
    };

    let (target, failure_reason) = match reported {
        ProviderPaymentStatus::Processing => (PaymentStatus::Processing, None),
        ProviderPaymentStatus::Completed => (PaymentStatus::Completed, None),
        ProviderPaymentStatus::Failed(reason) => (PaymentStatus::Failed, Some(reason)),
    };
    if target == payment.status {
        return Ok(payment);
    }
    if let Err(e) = validate_transition(payment.method, payment.status, target, false) {
        tracing::warn!(
            "Ignoring provider-reported state for payment {}: {}",
            payment.id,
            e
        );
        return Ok(payment);
    }

    let mut change = PaymentChange::to(target);
    change.failure_reason = failure_reason.clone();
    if target.is_terminal() {
        change.processed_at = Some(Utc::now());
    }
    match store
        .apply_transition(payment.id, payment.status, change)
        .await
    {
        Ok(updated) => {
            match updated.status {
                PaymentStatus::Completed => {
                    dispatch_order_sync(order_sync, SyncAction::MarkPaid(updated.order_id))
                }
                PaymentStatus::Failed => dispatch_order_sync(
                    order_sync,
                    SyncAction::MarkFailed(
                        updated.order_id,
                        failure_reason.unwrap_or_else(|| "Payment failed".to_string()),
                    ),
                ),
                _ => {}
            }
            Ok(updated)
        }
        // The transition already happened through another path.
        Err(StoreError::PreconditionFailed) => Ok(store
            .fetch(payment.id)
            .await
            .map_err(PaymentError::from)?
            .ok_or_else(|| PaymentError::DataNotFound("Payment not found".to_string()))?),
        Err(e) => Err(e.into()),
    }
}

/// Staff confirmation of a bank transfer: `pending -> pending_verification`,
/// exactly once. Final settlement happens in a separate reconciliation step.
#[tracing::instrument(name = "confirm bank transfer", skip(store, evidence))]
pub async fn confirm_bank_transfer(
    store: &dyn PaymentStore,
    payment_id: Uuid,
    reference: &str,
    evidence: Option<String>,
) -> Result<Payment, PaymentError> {
    let payment = store
        .fetch(payment_id)
        .await
        .map_err(PaymentError::from)?
        .ok_or_else(|| PaymentError::DataNotFound("Payment not found".to_string()))?;
    let (stored_reference, expires_at) = match &payment.provider_details {
        ProviderDetails::BankTransfer {
            reference,
            expires_at,
            ..
        } => (reference.clone(), *expires_at),
        _ => {
            return Err(PaymentError::ValidationError(
                "Payment is not a bank transfer".to_string(),
            ))
        }
    };
    if reference != stored_reference {
        return Err(PaymentError::ValidationError(
            "Bank transfer reference does not match".to_string(),
        ));
    }
    if expires_at < Utc::now() {
        return Err(PaymentError::ConflictError(
            "The bank transfer reference has expired".to_string(),
        ));
    }
    validate_transition(
        payment.method,
        payment.status,
        PaymentStatus::PendingVerification,
        false,
    )
    .map_err(|e| match e {
        TransitionError::Stale => {
            PaymentError::ConflictError("Payment is already settled".to_string())
        }
        _ => PaymentError::ConflictError("Bank transfer has already been confirmed".to_string()),
    })?;

    let mut change = PaymentChange::to(PaymentStatus::PendingVerification);
    change.provider_details = Some(ProviderDetails::BankTransfer {
        reference: stored_reference,
        expires_at,
        evidence,
    });
    store
        .apply_transition(payment.id, PaymentStatus::Pending, change)
        .await
        .map_err(|e| match e {
            StoreError::PreconditionFailed => PaymentError::ConflictError(
                "Bank transfer has already been confirmed".to_string(),
            ),
            other => other.into(),
        })
}

/// Per-provider authenticity check. Mobile-money networks send a shared
/// token header; the card processor signs the raw body with a keyed
/// BLAKE2b MAC.
pub fn verify_webhook_signature(
    provider: WebhookProvider,
    settings: &ProviderSettings,
    req: &HttpRequest,
    body: &[u8],
) -> Result<(), WebhookError> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
    };
    let shared_token = match provider {
        WebhookProvider::Mpesa => Some(&settings.mpesa.webhook_token),
        WebhookProvider::AirtelMoney => Some(&settings.airtel_money.webhook_token),
        WebhookProvider::Equitel => Some(&settings.equitel.webhook_token),
        WebhookProvider::Card => None,
    };
    match shared_token {
        Some(expected) => {
            let presented = header("x-webhook-token").unwrap_or_default();
            if presented != expected.expose_secret() {
                return Err(WebhookError::AuthenticationError(
                    "Invalid webhook token".to_string(),
                ));
            }
            Ok(())
        }
        None => {
            let presented = header("x-signature").ok_or_else(|| {
                WebhookError::AuthenticationError("Missing webhook signature".to_string())
            })?;
            let signature = hex::decode(&presented).map_err(|_| {
                WebhookError::AuthenticationError("Malformed webhook signature".to_string())
            })?;
            let mut mac =
                Blake2bMac512::new_from_slice(settings.card.webhook_secret.expose_secret().as_bytes())
                    .map_err(|e| {
                        WebhookError::UnexpectedError(anyhow::anyhow!(
                            "Invalid webhook secret configured: {}",
                            e
                        ))
                    })?;
            mac.update(body);
            mac.verify_slice(&signature).map_err(|_| {
                WebhookError::AuthenticationError("Invalid webhook signature".to_string())
            })
        }
    }
}

/// Strict per-provider payload parsing into the normalized event. No
/// best-effort field scraping: unparseable payloads are rejected.
pub fn parse_webhook_event(
    provider: WebhookProvider,
    body: &[u8],
) -> Result<WebhookEvent, WebhookError> {
    let invalid = |e: serde_json::Error| {
        WebhookError::ValidationError(format!("Malformed {} webhook payload: {}", provider, e))
    };
    let (provider_ref, outcome) = match provider {
        WebhookProvider::Mpesa => {
            let payload: MpesaWebhookPayload = serde_json::from_slice(body).map_err(invalid)?;
            let callback = payload.body.stk_callback;
            let outcome = if callback.result_code == 0 {
                WebhookOutcome::Success
            } else {
                WebhookOutcome::Failure(callback.result_desc)
            };
            (callback.checkout_request_id, outcome)
        }
        WebhookProvider::AirtelMoney => {
            let payload: AirtelWebhookPayload = serde_json::from_slice(body).map_err(invalid)?;
            let transaction = payload.transaction;
            let outcome = if transaction.status_code == "TS" {
                WebhookOutcome::Success
            } else {
                WebhookOutcome::Failure(
                    transaction
                        .message
                        .unwrap_or_else(|| "Transaction failed".to_string()),
                )
            };
            (transaction.id, outcome)
        }
        WebhookProvider::Equitel => {
            let payload: EquitelWebhookPayload = serde_json::from_slice(body).map_err(invalid)?;
            let outcome = if payload.result == "000" {
                WebhookOutcome::Success
            } else {
                WebhookOutcome::Failure(
                    payload
                        .narrative
                        .unwrap_or_else(|| "Transaction failed".to_string()),
                )
            };
            (payload.reference, outcome)
        }
        WebhookProvider::Card => {
            let payload: CardWebhookPayload = serde_json::from_slice(body).map_err(invalid)?;
            let outcome = match payload.event.as_str() {
                "charge.completed" => WebhookOutcome::Success,
                "charge.failed" => WebhookOutcome::Failure(
                    payload
                        .data
                        .reason
                        .unwrap_or_else(|| "Card charge failed".to_string()),
                ),
                other => {
                    return Err(WebhookError::ValidationError(format!(
                        "Unrecognized card webhook event: {}",
                        other
                    )))
                }
            };
            (payload.data.reference, outcome)
        }
    };
    Ok(WebhookEvent {
        provider,
        provider_ref,
        outcome,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    MarkPaid(Uuid),
    MarkFailed(Uuid, String),
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The transition was applied; the order side needs `action`.
    Applied {
        payment: Payment,
        action: SyncAction,
    },
    /// Terminal replay: acknowledged, nothing changed.
    AlreadySettled(Payment),
    /// Matched a record the event cannot legally advance.
    Ignored(Payment),
    /// No payment carries this provider reference.
    Unmatched,
}

/// Maps a verified provider notification onto the matching payment,
/// idempotently. Duplicate deliveries converge on `AlreadySettled`.
#[tracing::instrument(name = "reconcile webhook", skip(store, event), fields(provider = %event.provider, provider_ref = %event.provider_ref))]
pub async fn reconcile_webhook(
    store: &dyn PaymentStore,
    event: &WebhookEvent,
) -> Result<ReconcileOutcome, WebhookError> {
    let payment = match store
        .fetch_by_provider_ref(&event.provider_ref)
        .await
        .map_err(|e| WebhookError::UnexpectedError(e.into()))?
    {
        Some(payment) => payment,
        None => {
            tracing::info!(
                "No payment matches provider ref {}, acknowledging without action",
                event.provider_ref
            );
            return Ok(ReconcileOutcome::Unmatched);
        }
    };
    if payment.status.is_terminal() {
        return Ok(ReconcileOutcome::AlreadySettled(payment));
    }

    let (target, failure_reason) = match &event.outcome {
        WebhookOutcome::Success => (PaymentStatus::Completed, None),
        WebhookOutcome::Failure(reason) => (PaymentStatus::Failed, Some(reason.clone())),
    };
    match validate_transition(payment.method, payment.status, target, false) {
        Ok(()) => {}
        Err(TransitionError::Stale) => return Ok(ReconcileOutcome::AlreadySettled(payment)),
        Err(e) => {
            tracing::warn!(
                "Webhook cannot advance payment {} from {}: {}",
                payment.id,
                payment.status,
                e
            );
            return Ok(ReconcileOutcome::Ignored(payment));
        }
    }

    let mut change = PaymentChange::to(target);
    change.failure_reason = failure_reason.clone();
    change.processed_at = Some(Utc::now());
    match store
        .apply_transition(payment.id, payment.status, change)
        .await
    {
        Ok(updated) => {
            let action = match updated.status {
                PaymentStatus::Completed => SyncAction::MarkPaid(updated.order_id),
                _ => SyncAction::MarkFailed(
                    updated.order_id,
                    failure_reason.unwrap_or_else(|| "Payment failed".to_string()),
                ),
            };
            Ok(ReconcileOutcome::Applied {
                payment: updated,
                action,
            })
        }
        Err(StoreError::PreconditionFailed) => {
            // Raced with the poll path or a duplicate delivery.
            match store
                .fetch(payment.id)
                .await
                .map_err(|e| WebhookError::UnexpectedError(e.into()))?
            {
                Some(current) if current.status.is_terminal() => {
                    Ok(ReconcileOutcome::AlreadySettled(current))
                }
                Some(current) => Ok(ReconcileOutcome::Ignored(current)),
                None => Ok(ReconcileOutcome::Unmatched),
            }
        }
        Err(StoreError::NotFound) => Ok(ReconcileOutcome::Unmatched),
        Err(e) => Err(WebhookError::UnexpectedError(e.into())),
    }
}

/// Fire-and-forget order notification: the webhook acknowledgment never
/// waits on the order service.
pub fn dispatch_order_sync(order_sync: Arc<dyn OrderSync>, action: SyncAction) {
    tokio::spawn(async move {
        if let Err(e) = run_order_sync(order_sync.as_ref(), &action).await {
            tracing::error!("Order sync {:?} failed after retries: {}", action, e);
        }
    });
}

pub async fn run_order_sync(
    order_sync: &dyn OrderSync,
    action: &SyncAction,
) -> Result<(), anyhow::Error> {
    let mut attempt = 1u32;
    loop {
        let result = match action {
            SyncAction::MarkPaid(order_id) => order_sync.mark_paid(*order_id).await,
            SyncAction::MarkFailed(order_id, reason) => {
                order_sync.mark_failed(*order_id, reason).await
            }
        };
        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < MAX_ORDER_SYNC_ATTEMPTS => {
                let delay = ORDER_SYNC_BACKOFF_MS * 2u64.pow(attempt - 1);
                tracing::warn!(
                    "Order sync attempt {} failed ({}), retrying in {}ms",
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
