use super::{InitiateOutcome, ProviderAdapter, ProviderError, ProviderPaymentStatus, ProviderQuery};
use crate::configuration::CardSettings;
use crate::routes::payment::schemas::{
    Payment, PaymentMethod, PaymentMethodParams, PaymentStatus, ProviderDetails,
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Card processor adapter. Initiation only acknowledges: settlement always
/// arrives through a webhook or a status query, never synchronously.
pub struct CardAdapter {
    settings: CardSettings,
    http_client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CardChargeRequest<'a> {
    reference: Uuid,
    amount: &'a BigDecimal,
    currency: String,
    token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardChargeData {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardSessionData {
    status: String,
    reason: Option<String>,
}

impl CardAdapter {
    #[tracing::instrument(skip(settings))]
    pub fn new(settings: CardSettings) -> Self {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_millis(settings.timeout_ms))
            .build()
            .unwrap();
        Self {
            settings,
            http_client,
        }
    }

    fn get_auth_token(&self) -> String {
        format!("Bearer {}", self.settings.api_key.expose_secret())
    }
}

#[async_trait]
impl ProviderAdapter for CardAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn validate(&self, params: &PaymentMethodParams) -> Result<ProviderDetails, ProviderError> {
        if params.card_token.as_deref().unwrap_or("").is_empty() {
            return Err(ProviderError::Validation(
                "A card token is required for card payments".to_string(),
            ));
        }
        Ok(ProviderDetails::Card {
            last4: params.card_last4.clone(),
        })
    }

    #[tracing::instrument(name = "initiate card charge", skip(self, payment, params), fields(payment_id = %payment.id))]
    async fn initiate(
        &self,
        payment: &Payment,
        params: &PaymentMethodParams,
    ) -> Result<InitiateOutcome, ProviderError> {
        let token = params.card_token.as_deref().ok_or_else(|| {
            ProviderError::Validation("A card token is required for card payments".to_string())
        })?;

        let url = format!("{}/charges", self.settings.base_url);
        let request_body = CardChargeRequest {
            reference: payment.id,
            amount: &payment.amount,
            currency: payment.currency.to_string(),
            token,
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
                "Card charge rejected: {}",
                message
            )));
        }
        let data: CardChargeData = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("Failed to parse response: {}", e)))?;

        Ok(InitiateOutcome {
            provider_ref: Some(data.session_id),
            status: PaymentStatus::Processing,
            customer_message: "Your card is being charged. You will be notified once the payment completes.".to_string(),
            details: None,
        })
    }

    #[tracing::instrument(name = "query card charge", skip(self))]
    async fn query(&self, provider_ref: &str) -> Result<ProviderQuery, ProviderError> {
        let url = format!("{}/charges/{}", self.settings.base_url, provider_ref);
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
                "Card status query rejected: {}",
                message
            )));
        }
        let data: CardSessionData = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("Failed to parse response: {}", e)))?;

        let reported = match data.status.to_lowercase().as_str() {
            "succeeded" | "captured" => ProviderPaymentStatus::Completed,
            "failed" | "declined" => ProviderPaymentStatus::Failed(
                data.reason
                    .unwrap_or_else(|| "Card charge was declined".to_string()),
            ),
            _ => ProviderPaymentStatus::Processing,
        };
        Ok(ProviderQuery::Status(reported))
    }
}
