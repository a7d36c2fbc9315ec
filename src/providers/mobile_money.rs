use super::{InitiateOutcome, ProviderAdapter, ProviderError, ProviderPaymentStatus, ProviderQuery};
use crate::configuration::MobileMoneySettings;
use crate::constants::SANDBOX_MSISDNS;
use crate::routes::payment::schemas::{
    MobileMoneyNetwork, Payment, PaymentMethod, PaymentMethodParams, PaymentStatus,
    ProviderDetails,
};
use crate::utils::{mask_msisdn, normalize_msisdn};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// STK-push adapter shared by the three Kenyan networks. Each network gets
/// its own instance with its own gateway settings; the push/status wire
/// contract is the aggregator's, not the network's.
pub struct MobileMoneyAdapter {
    network: MobileMoneyNetwork,
    settings: MobileMoneySettings,
    http_client: Client,
    production: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StkPushRequest<'a> {
    reference: Uuid,
    msisdn: &'a str,
    amount: &'a BigDecimal,
    narrative: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StkPushData {
    checkout_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StkStatusData {
    status: String,
    description: Option<String>,
}

impl MobileMoneyAdapter {
    #[tracing::instrument(skip(settings))]
    pub fn new(network: MobileMoneyNetwork, settings: MobileMoneySettings, production: bool) -> Self {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_millis(settings.timeout_ms))
            .build()
            .unwrap();
        Self {
            network,
            settings,
            http_client,
            production,
        }
    }

    fn get_auth_token(&self) -> String {
        format!("Bearer {}", self.settings.api_key.expose_secret())
    }
}

#[async_trait]
impl ProviderAdapter for MobileMoneyAdapter {
    fn method(&self) -> PaymentMethod {
        self.network.into()
    }

    fn validate(&self, params: &PaymentMethodParams) -> Result<ProviderDetails, ProviderError> {
        let raw = params.phone_number.as_deref().ok_or_else(|| {
            ProviderError::Validation(format!(
                "A phone number is required for {} payments",
                self.network.display_name()
            ))
        })?;
        let phone = normalize_msisdn(raw).ok_or_else(|| {
            ProviderError::Validation(format!("{} is not a valid Kenyan phone number", raw))
        })?;
        if self.production && SANDBOX_MSISDNS.contains(&phone.as_str()) {
            return Err(ProviderError::Validation(
                "Test phone numbers are not accepted".to_string(),
            ));
        }
        Ok(ProviderDetails::MobileMoney {
            phone,
            network: self.network,
        })
    }

    #[tracing::instrument(name = "initiate mobile money push", skip(self, payment, _params), fields(payment_id = %payment.id, network = %self.network.display_name()))]
    async fn initiate(
        &self,
        payment: &Payment,
        _params: &PaymentMethodParams,
    ) -> Result<InitiateOutcome, ProviderError> {
        let phone = match &payment.provider_details {
            ProviderDetails::MobileMoney { phone, .. } => phone.as_str(),
            _ => {
                return Err(ProviderError::Validation(
                    "Payment is missing mobile money details".to_string(),
                ))
            }
        };
        if payment.amount < BigDecimal::from(self.settings.min_amount) {
            return Err(ProviderError::Validation(format!(
                "{} payments require a minimum of {} {}",
                self.network.display_name(),
                self.settings.min_amount,
                payment.currency
            )));
        }

        let url = format!("{}/push/initiate", self.settings.base_url);
        let request_body = StkPushRequest {
            reference: payment.id,
            msisdn: phone,
            amount: &payment.amount,
            narrative: "Abai Springs water order",
        };
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.get_auth_token())
            .json(&request_body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!(
                "{} push rejected: {}",
                self.network.display_name(),
                message
            )));
        }
        let data: StkPushData = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("Failed to parse response: {}", e)))?;

        Ok(InitiateOutcome {
            provider_ref: Some(data.checkout_id),
            status: PaymentStatus::Processing,
            customer_message: format!(
                "Payment request sent to {}. Enter your {} PIN to complete the payment.",
                mask_msisdn(phone),
                self.network.display_name()
            ),
            details: None,
        })
    }

    #[tracing::instrument(name = "query mobile money push", skip(self))]
    async fn query(&self, provider_ref: &str) -> Result<ProviderQuery, ProviderError> {
        let url = format!("{}/push/status/{}", self.settings.base_url, provider_ref);
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", self.get_auth_token())
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!(
                "{} status query rejected: {}",
                self.network.display_name(),
                message
            )));
        }
        let data: StkStatusData = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("Failed to parse response: {}", e)))?;

        let reported = match data.status.to_uppercase().as_str() {
            "SUCCESS" | "COMPLETED" => ProviderPaymentStatus::Completed,
            "FAILED" | "CANCELLED" | "EXPIRED" => ProviderPaymentStatus::Failed(
                data.description
                    .unwrap_or_else(|| "Payment was not completed".to_string()),
            ),
            _ => ProviderPaymentStatus::Processing,
        };
        Ok(ProviderQuery::Status(reported))
    }
}
