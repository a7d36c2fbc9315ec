use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::configuration::OrderServiceSettings;
use crate::schemas::{CurrencyType, GenericResponse};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    NotPaid,
    Paid,
}

/// The slice of an order this engine needs: amount/currency come from the
/// order, never from the initiation request body.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub grand_total: BigDecimal,
    pub currency_code: CurrencyType,
    pub payment_status: OrderPaymentStatus,
}

#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn get(&self, order_id: Uuid) -> Result<Option<OrderSnapshot>, anyhow::Error>;
}

/// Order-side settlement hooks. Both calls must be safe to repeat for the
/// same order; this engine cannot guarantee exactly-once delivery.
#[async_trait]
pub trait OrderSync: Send + Sync {
    async fn mark_paid(&self, order_id: Uuid) -> Result<(), anyhow::Error>;
    async fn mark_failed(&self, order_id: Uuid, reason: &str) -> Result<(), anyhow::Error>;
}

#[derive(Debug)]
pub struct OrderServiceClient {
    http_client: Client,
    base_url: String,
    authorization_token: SecretString,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkPaidRequest {
    order_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkFailedRequest<'a> {
    order_id: Uuid,
    reason: &'a str,
}

impl OrderServiceClient {
    #[tracing::instrument]
    pub fn new(settings: OrderServiceSettings) -> Self {
        tracing::info!("Establishing connection to the order service.");
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_millis(settings.timeout_ms))
            .build()
            .unwrap();
        Self {
            http_client,
            base_url: settings.base_url,
            authorization_token: settings.authorization_token,
        }
    }

    fn get_auth_token(&self) -> String {
        format!("Bearer {}", self.authorization_token.expose_secret())
    }
}

#[async_trait]
impl OrderLookup for OrderServiceClient {
    async fn get(&self, order_id: Uuid) -> Result<Option<OrderSnapshot>, anyhow::Error> {
        let url = format!("{}/order/fetch/{}", self.base_url, order_id);
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", self.get_auth_token())
            .header("x-request-id", "internal")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Ok(None);
        }
        let response_body: GenericResponse<OrderSnapshot> = response
            .json()
            .await
            .map_err(|err| anyhow::anyhow!(format!("Failed to parse response: {}", err)))?;
        if status.is_success() {
            Ok(response_body.data)
        } else {
            Err(anyhow::anyhow!(response_body.customer_message))
        }
    }
}

#[async_trait]
impl OrderSync for OrderServiceClient {
    async fn mark_paid(&self, order_id: Uuid) -> Result<(), anyhow::Error> {
        let url = format!("{}/order/mark-paid", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.get_auth_token())
            .header("x-request-id", "internal")
            .json(&MarkPaidRequest { order_id })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let response_body: GenericResponse<()> = response
            .json()
            .await
            .map_err(|err| anyhow::anyhow!(format!("Failed to parse response: {}", err)))?;
        Err(anyhow::anyhow!(response_body.customer_message))
    }

    async fn mark_failed(&self, order_id: Uuid, reason: &str) -> Result<(), anyhow::Error> {
        let url = format!("{}/order/mark-failed", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.get_auth_token())
            .header("x-request-id", "internal")
            .json(&MarkFailedRequest { order_id, reason })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let response_body: GenericResponse<()> = response
            .json()
            .await
            .map_err(|err| anyhow::anyhow!(format!("Failed to parse response: {}", err)))?;
        Err(anyhow::anyhow!(response_body.customer_message))
    }
}
