use crate::errors::GenericError;
use actix_http::Payload;
use actix_web::web::Json;
use actix_web::{FromRequest, HttpRequest};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use futures_util::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    AirtelMoney,
    Equitel,
    Card,
    Cash,
    BankTransfer,
}

impl PaymentMethod {
    pub fn is_mobile_money(&self) -> bool {
        matches!(
            self,
            PaymentMethod::Mpesa | PaymentMethod::AirtelMoney | PaymentMethod::Equitel
        )
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::AirtelMoney => "airtel_money",
            PaymentMethod::Equitel => "equitel",
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
        };
        write!(f, "{}", s)
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    PendingVerification,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Terminal records accept no further transition; replays against them
    /// are benign no-ops.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::PendingVerification => "pending_verification",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MobileMoneyNetwork {
    Mpesa,
    AirtelMoney,
    Equitel,
}

impl MobileMoneyNetwork {
    pub fn display_name(&self) -> &'static str {
        match self {
            MobileMoneyNetwork::Mpesa => "M-Pesa",
            MobileMoneyNetwork::AirtelMoney => "Airtel Money",
            MobileMoneyNetwork::Equitel => "Equitel",
        }
    }
}

impl From<MobileMoneyNetwork> for PaymentMethod {
    fn from(network: MobileMoneyNetwork) -> Self {
        match network {
            MobileMoneyNetwork::Mpesa => PaymentMethod::Mpesa,
            MobileMoneyNetwork::AirtelMoney => PaymentMethod::AirtelMoney,
            MobileMoneyNetwork::Equitel => PaymentMethod::Equitel,
        }
    }
}

/// Method-specific sub-record kept on the payment for audit and customer
/// support. Stored as JSONB.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderDetails {
    MobileMoney {
        phone: String,
        network: MobileMoneyNetwork,
    },
    Card {
        last4: Option<String>,
    },
    Cash {
        collected_by: Option<String>,
    },
    BankTransfer {
        reference: String,
        #[schema(value_type = String)]
        expires_at: DateTime<Utc>,
        evidence: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    #[schema(value_type = String)]
    pub requested_at: DateTime<Utc>,
}

impl From<&crate::schemas::RequestMetaData> for SecurityContext {
    fn from(meta: &crate::schemas::RequestMetaData) -> Self {
        SecurityContext {
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            requested_at: meta.requested_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub order_id: Uuid,
    #[schema(value_type = String)]
    pub customer_id: Uuid,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub currency: crate::schemas::CurrencyType,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub provider_ref: Option<String>,
    pub provider_details: ProviderDetails,
    pub failure_reason: Option<String>,
    pub security_context: SecurityContext,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Option<String>)]
    pub processed_at: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Clone, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodParams {
    pub phone_number: Option<String>,
    pub card_token: Option<String>,
    pub card_last4: Option<String>,
    pub collected_by: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiateRequest {
    #[schema(value_type = String)]
    pub order_id: Uuid,
    pub method: PaymentMethod,
    #[serde(default)]
    pub method_params: PaymentMethodParams,
}

impl FromRequest for PaymentInitiateRequest {
    type Error = GenericError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let fut = Json::<Self>::from_request(req, payload);

        Box::pin(async move {
            match fut.await {
                Ok(json) => Ok(json.into_inner()),
                Err(e) => Err(GenericError::ValidationError(e.to_string())),
            }
        })
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiateData {
    pub payment: Payment,
    pub provider_instructions: String,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankTransferConfirmRequest {
    pub reference: String,
    pub evidence: Option<String>,
}

impl FromRequest for BankTransferConfirmRequest {
    type Error = GenericError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let fut = Json::<Self>::from_request(req, payload);

        Box::pin(async move {
            match fut.await {
                Ok(json) => Ok(json.into_inner()),
                Err(e) => Err(GenericError::ValidationError(e.to_string())),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookProvider {
    Mpesa,
    AirtelMoney,
    Equitel,
    Card,
}

impl WebhookProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookProvider::Mpesa => "mpesa",
            WebhookProvider::AirtelMoney => "airtel-money",
            WebhookProvider::Equitel => "equitel",
            WebhookProvider::Card => "card",
        }
    }
}

impl std::str::FromStr for WebhookProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mpesa" => Ok(WebhookProvider::Mpesa),
            "airtel-money" => Ok(WebhookProvider::AirtelMoney),
            "equitel" => Ok(WebhookProvider::Equitel),
            "card" => Ok(WebhookProvider::Card),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for WebhookProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized view of a provider notification: the correlation key plus the
/// reported result. Every provider payload parses into this or is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub provider: WebhookProvider,
    pub provider_ref: String,
    pub outcome: WebhookOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Success,
    Failure(String),
}

// Wire schemas, one per provider. Strict: unknown shapes fail parsing, we
// never scrape free-text fields for a reference.

#[derive(Deserialize, Debug)]
pub struct MpesaWebhookPayload {
    #[serde(rename = "Body")]
    pub body: MpesaWebhookBody,
}

#[derive(Deserialize, Debug)]
pub struct MpesaWebhookBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: MpesaStkCallback,
}

#[derive(Deserialize, Debug)]
pub struct MpesaStkCallback {
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

#[derive(Deserialize, Debug)]
pub struct AirtelWebhookPayload {
    pub transaction: AirtelWebhookTransaction,
}

#[derive(Deserialize, Debug)]
pub struct AirtelWebhookTransaction {
    pub id: String,
    /// "TS" on success, "TF" on failure.
    pub status_code: String,
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct EquitelWebhookPayload {
    pub reference: String,
    /// "000" on success.
    pub result: String,
    pub narrative: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CardWebhookPayload {
    pub event: String,
    pub data: CardWebhookData,
}

#[derive(Deserialize, Debug)]
pub struct CardWebhookData {
    pub reference: String,
    pub reason: Option<String>,
}
