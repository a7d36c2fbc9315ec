pub mod bank_transfer;
pub mod card;
pub mod cash;
pub mod mobile_money;

use crate::configuration::{AppEnvironment, ProviderSettings};
use crate::routes::payment::schemas::{
    MobileMoneyNetwork, Payment, PaymentMethod, PaymentMethodParams, PaymentStatus,
    ProviderDetails,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use bank_transfer::BankTransferAdapter;
pub use card::CardAdapter;
pub use cash::CashAdapter;
pub use mobile_money::MobileMoneyAdapter;

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("{0}")]
    Validation(String),
    #[error("provider request timed out")]
    Timeout,
    #[error("provider transport failure: {0}")]
    Transport(String),
    #[error("{0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn retryable(&self) -> bool {
        matches!(self, ProviderError::Timeout | ProviderError::Transport(_))
    }

    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Transport(e.to_string())
        }
    }

    /// Reason string persisted into `failure_reason`.
    pub fn failure_reason(&self) -> String {
        match self {
            ProviderError::Timeout => "timeout".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitiateOutcome {
    pub provider_ref: Option<String>,
    pub status: PaymentStatus,
    pub customer_message: String,
    pub details: Option<ProviderDetails>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderQuery {
    /// The provider has no status-query capability.
    Unsupported,
    Status(ProviderPaymentStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderPaymentStatus {
    Processing,
    Completed,
    Failed(String),
}

/// One adapter per payment method. `validate` runs before any record is
/// created and produces the audit sub-record; `initiate` is the
/// network-bound call and must carry a bounded timeout.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn method(&self) -> PaymentMethod;

    fn validate(&self, params: &PaymentMethodParams) -> Result<ProviderDetails, ProviderError>;

    async fn initiate(
        &self,
        payment: &Payment,
        params: &PaymentMethodParams,
    ) -> Result<InitiateOutcome, ProviderError>;

    async fn query(&self, _provider_ref: &str) -> Result<ProviderQuery, ProviderError> {
        Ok(ProviderQuery::Unsupported)
    }
}

/// Lookup table keyed on method; replaces per-method conditionals at every
/// call site.
pub struct ProviderRegistry {
    adapters: HashMap<PaymentMethod, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn from_settings(settings: &ProviderSettings, environment: AppEnvironment) -> Self {
        let production = environment.is_production();
        Self::new()
            .with_adapter(Arc::new(MobileMoneyAdapter::new(
                MobileMoneyNetwork::Mpesa,
                settings.mpesa.clone(),
                production,
            )))
            .with_adapter(Arc::new(MobileMoneyAdapter::new(
                MobileMoneyNetwork::AirtelMoney,
                settings.airtel_money.clone(),
                production,
            )))
            .with_adapter(Arc::new(MobileMoneyAdapter::new(
                MobileMoneyNetwork::Equitel,
                settings.equitel.clone(),
                production,
            )))
            .with_adapter(Arc::new(CardAdapter::new(settings.card.clone())))
            .with_adapter(Arc::new(CashAdapter::new()))
            .with_adapter(Arc::new(BankTransferAdapter::new(
                settings.bank_transfer.clone(),
            )))
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.method(), adapter);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&method).cloned()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
