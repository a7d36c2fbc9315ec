use super::schemas::{Payment, PaymentMethod, PaymentStatus, ProviderDetails, SecurityContext};
use crate::schemas::CurrencyType;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct PaymentModel {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub amount: BigDecimal,
    pub currency: CurrencyType,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub provider_ref: Option<String>,
    pub provider_details: Json<ProviderDetails>,
    pub failure_reason: Option<String>,
    pub security_context: Json<SecurityContext>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentModel {
    pub fn into_schema(self) -> Payment {
        Payment {
            id: self.id,
            order_id: self.order_id,
            customer_id: self.customer_id,
            amount: self.amount,
            currency: self.currency,
            method: self.method,
            status: self.status,
            provider_ref: self.provider_ref,
            provider_details: self.provider_details.0,
            failure_reason: self.failure_reason,
            security_context: self.security_context.0,
            created_at: self.created_at,
            processed_at: self.processed_at,
            updated_at: self.updated_at,
        }
    }
}
