use super::{InitiateOutcome, ProviderAdapter, ProviderError};
use crate::routes::payment::schemas::{
    Payment, PaymentMethod, PaymentMethodParams, PaymentStatus, ProviderDetails,
};
use async_trait::async_trait;

/// Cash on collection/delivery. The only adapter allowed to short-circuit
/// straight to a terminal state at initiation.
pub struct CashAdapter;

impl CashAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CashAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for CashAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Cash
    }

    fn validate(&self, params: &PaymentMethodParams) -> Result<ProviderDetails, ProviderError> {
        Ok(ProviderDetails::Cash {
            collected_by: params.collected_by.clone(),
        })
    }

    #[tracing::instrument(name = "record cash payment", skip(self, payment, _params), fields(payment_id = %payment.id))]
    async fn initiate(
        &self,
        payment: &Payment,
        _params: &PaymentMethodParams,
    ) -> Result<InitiateOutcome, ProviderError> {
        Ok(InitiateOutcome {
            provider_ref: None,
            status: PaymentStatus::Completed,
            customer_message: format!(
                "Cash payment of {} {} received. Thank you.",
                payment.amount, payment.currency
            ),
            details: None,
        })
    }
}
