use super::{InitiateOutcome, ProviderAdapter, ProviderError};
use crate::configuration::BankTransferSettings;
use crate::constants::{BANK_REFERENCE_LEN, BANK_REFERENCE_PREFIX};
use crate::routes::payment::schemas::{
    Payment, PaymentMethod, PaymentMethodParams, PaymentStatus, ProviderDetails,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;

/// Manual bank transfer. Initiation hands out a human reference with a
/// fixed validity window; settlement requires a staff confirmation step and
/// never completes here.
pub struct BankTransferAdapter {
    settings: BankTransferSettings,
}

impl BankTransferAdapter {
    pub fn new(settings: BankTransferSettings) -> Self {
        Self { settings }
    }

    fn generate_reference(&self) -> String {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(BANK_REFERENCE_LEN)
            .map(|c| (c as char).to_ascii_uppercase())
            .collect();
        format!("{}-{}", BANK_REFERENCE_PREFIX, suffix)
    }
}

#[async_trait]
impl ProviderAdapter for BankTransferAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::BankTransfer
    }

    fn validate(&self, _params: &PaymentMethodParams) -> Result<ProviderDetails, ProviderError> {
        Ok(ProviderDetails::BankTransfer {
            reference: self.generate_reference(),
            expires_at: Utc::now() + Duration::hours(self.settings.validity_hours),
            evidence: None,
        })
    }

    #[tracing::instrument(name = "initiate bank transfer", skip(self, payment, _params), fields(payment_id = %payment.id))]
    async fn initiate(
        &self,
        payment: &Payment,
        _params: &PaymentMethodParams,
    ) -> Result<InitiateOutcome, ProviderError> {
        let (reference, expires_at) = match &payment.provider_details {
            ProviderDetails::BankTransfer {
                reference,
                expires_at,
                ..
            } => (reference.clone(), *expires_at),
            _ => {
                return Err(ProviderError::Validation(
                    "Payment is missing bank transfer details".to_string(),
                ))
            }
        };

        Ok(InitiateOutcome {
            provider_ref: Some(reference.clone()),
            status: PaymentStatus::Pending,
            customer_message: format!(
                "Transfer {} {} to {} ({}, account {}) quoting reference {}. \
                 The reference expires on {}.",
                payment.amount,
                payment.currency,
                self.settings.account_name,
                self.settings.bank_name,
                self.settings.account_number,
                reference,
                expires_at.format("%d %b %Y %H:%M UTC"),
            ),
            details: None,
        })
    }
}
