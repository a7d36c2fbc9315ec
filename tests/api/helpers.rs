use abai_springs_payments::configuration::{get_configuration, DatabaseBackend, Settings};
use abai_springs_payments::order_client::{
    OrderLookup, OrderPaymentStatus, OrderSnapshot, OrderSync,
};
use abai_springs_payments::providers::{
    BankTransferAdapter, CashAdapter, InitiateOutcome, ProviderAdapter, ProviderError,
    ProviderRegistry,
};
use abai_springs_payments::routes::payment::schemas::{
    MobileMoneyNetwork, Payment, PaymentMethod, PaymentMethodParams, PaymentStatus,
    ProviderDetails,
};
use abai_springs_payments::routes::payment::store::{InMemoryPaymentStore, PaymentStore};
use abai_springs_payments::schemas::CurrencyType;
use abai_springs_payments::startup::run;
use abai_springs_payments::telemetry::{get_subscriber, init_subscriber};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();
    let test_log = std::env::var("TEST_LOG")
        .map(|value| value == "true")
        .unwrap_or(false);
    if test_log {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

/// Order service double backing both lookup and settlement sync.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockOrderService {
    orders: Mutex<HashMap<Uuid, OrderSnapshot>>,
    pub mark_paid_calls: Mutex<Vec<Uuid>>,
    pub mark_failed_calls: Mutex<Vec<(Uuid, String)>>,
}

impl MockOrderService {
    pub fn insert_order(&self, order: OrderSnapshot) {
        self.orders.lock().unwrap().insert(order.id, order);
    }
}

#[async_trait]
impl OrderLookup for MockOrderService {
    async fn get(&self, order_id: Uuid) -> Result<Option<OrderSnapshot>, anyhow::Error> {
        Ok(self.orders.lock().unwrap().get(&order_id).cloned())
    }
}

#[async_trait]
impl OrderSync for MockOrderService {
    async fn mark_paid(&self, order_id: Uuid) -> Result<(), anyhow::Error> {
        self.mark_paid_calls.lock().unwrap().push(order_id);
        Ok(())
    }

    async fn mark_failed(&self, order_id: Uuid, reason: &str) -> Result<(), anyhow::Error> {
        self.mark_failed_calls
            .lock()
            .unwrap()
            .push((order_id, reason.to_string()));
        Ok(())
    }
}

/// Offline STK-push stand-in: acknowledges with `processing` and a
/// deterministic checkout reference derived from the payment id.
pub struct StubMpesaAdapter;

#[async_trait]
impl ProviderAdapter for StubMpesaAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Mpesa
    }

    fn validate(&self, params: &PaymentMethodParams) -> Result<ProviderDetails, ProviderError> {
        let phone = params.phone_number.clone().ok_or_else(|| {
            ProviderError::Validation("A phone number is required for M-Pesa payments".to_string())
        })?;
        Ok(ProviderDetails::MobileMoney {
            phone,
            network: MobileMoneyNetwork::Mpesa,
        })
    }

    async fn initiate(
        &self,
        payment: &Payment,
        _params: &PaymentMethodParams,
    ) -> Result<InitiateOutcome, ProviderError> {
        Ok(InitiateOutcome {
            provider_ref: Some(checkout_ref(payment.id)),
            status: PaymentStatus::Processing,
            customer_message: "Enter your M-Pesa PIN to complete the payment.".to_string(),
            details: None,
        })
    }
}

pub fn checkout_ref(payment_id: Uuid) -> String {
    format!("CHK-{}", payment_id.simple())
}

#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub api_client: reqwest::Client,
    pub order_service: Arc<MockOrderService>,
    pub store: Arc<InMemoryPaymentStore>,
    pub settings: Settings,
}

impl TestApp {
    pub fn insert_order(&self, customer_id: Uuid) -> OrderSnapshot {
        let order = OrderSnapshot {
            id: Uuid::new_v4(),
            order_number: format!("ORD-{}", &Uuid::new_v4().simple().to_string()[..8]),
            customer_id,
            grand_total: BigDecimal::from(2400),
            currency_code: CurrencyType::Kes,
            payment_status: OrderPaymentStatus::NotPaid,
        };
        self.order_service.insert_order(order.clone());
        order
    }

    pub async fn post_initiate(
        &self,
        customer_id: Uuid,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        self.api_client
            .post(format!("{}/payment/initiate", self.address))
            .header("x-customer-id", customer_id.to_string())
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_status(&self, customer_id: Uuid, payment_id: Uuid) -> reqwest::Response {
        self.api_client
            .get(format!("{}/payment/{}/status", self.address, payment_id))
            .header("x-customer-id", customer_id.to_string())
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_webhook(
        &self,
        provider: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        let mut request = self
            .api_client
            .post(format!("{}/payment/webhook/{}", self.address, provider))
            .json(body);
        if let Some(token) = token {
            request = request.header("x-webhook-token", token);
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub async fn post_confirm_bank_transfer(
        &self,
        payment_id: Uuid,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        self.api_client
            .post(format!(
                "{}/payment/{}/confirm-bank-transfer",
                self.address, payment_id
            ))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let configuration = {
        let mut c = get_configuration().expect("Failed to read configuration.");
        c.application.port = 0;
        c.database.backend = DatabaseBackend::Memory;
        c.sweep.enabled = false;
        c
    };

    let store = Arc::new(InMemoryPaymentStore::default());
    let order_service = Arc::new(MockOrderService::default());
    let registry = Arc::new(
        ProviderRegistry::new()
            .with_adapter(Arc::new(StubMpesaAdapter))
            .with_adapter(Arc::new(CashAdapter::new()))
            .with_adapter(Arc::new(BankTransferAdapter::new(
                configuration.providers.bank_transfer.clone(),
            ))),
    );

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);
    let server = run(
        listener,
        store.clone() as Arc<dyn PaymentStore>,
        registry,
        order_service.clone() as Arc<dyn OrderLookup>,
        order_service.clone() as Arc<dyn OrderSync>,
        configuration.clone(),
    )
    .await
    .expect("Failed to build application.");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        port,
        api_client: reqwest::Client::new(),
        order_service,
        store,
        settings: configuration,
    }
}
