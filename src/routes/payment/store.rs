use super::models::PaymentModel;
use super::schemas::{Payment, PaymentStatus, ProviderDetails};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("an active payment already exists for order {0}")]
    ActivePaymentExists(Uuid),
    #[error("payment not found")]
    NotFound,
    #[error("payment state precondition failed")]
    PreconditionFailed,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Conditional mutation applied through the store's compare-and-swap.
/// `None` fields keep their stored value.
#[derive(Debug, Clone)]
pub struct PaymentChange {
    pub status: PaymentStatus,
    pub provider_ref: Option<String>,
    pub provider_details: Option<ProviderDetails>,
    pub failure_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PaymentChange {
    pub fn to(status: PaymentStatus) -> Self {
        Self {
            status,
            provider_ref: None,
            provider_details: None,
            failure_reason: None,
            processed_at: None,
        }
    }
}

/// Durable keyed storage for payments. The conditional-write contract is
/// the only cross-request coordination primitive: `create` admits at most
/// one non-terminal payment per order, `apply_transition` only writes when
/// the stored status matches `expected`. Both must be atomic at the
/// storage layer so multiple server instances stay correct.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, payment: &Payment) -> Result<(), StoreError>;
    async fn fetch(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;
    async fn fetch_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, StoreError>;
    async fn fetch_active_by_order(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError>;
    async fn apply_transition(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        change: PaymentChange,
    ) -> Result<Payment, StoreError>;
    /// Non-terminal pending/processing records created before the cutoff,
    /// oldest first. Used by the timeout sweep.
    async fn fetch_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ONE_ACTIVE_PER_ORDER_INDEX: &str = "payments_one_active_per_order";

#[async_trait]
impl PaymentStore for PgPaymentStore {
    #[tracing::instrument(name = "create payment", skip(self, payment), fields(payment_id = %payment.id, order_id = %payment.order_id))]
    async fn create(&self, payment: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, customer_id, amount, currency, method, status,
                provider_ref, provider_details, failure_reason, security_context,
                created_at, processed_at, updated_at
            )
            SELECT $1, $2, $3, $4, $5::currency_type, $6::payment_method,
                   $7::payment_status, $8, $9::jsonb, $10, $11::jsonb, $12, $13, $14
            WHERE NOT EXISTS (
                SELECT 1 FROM payments
                WHERE order_id = $2 AND status NOT IN ('completed', 'failed')
            )
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(payment.customer_id)
        .bind(&payment.amount)
        .bind(payment.currency)
        .bind(payment.method)
        .bind(payment.status)
        .bind(&payment.provider_ref)
        .bind(Json(&payment.provider_details))
        .bind(&payment.failure_reason)
        .bind(Json(&payment.security_context))
        .bind(payment.created_at)
        .bind(payment.processed_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(()),
            Ok(_) => Err(StoreError::ActivePaymentExists(payment.order_id)),
            // The partial unique index backstops the conditional insert
            // under concurrent creates.
            Err(sqlx::Error::Database(e))
                if e.constraint() == Some(ONE_ACTIVE_PER_ORDER_INDEX) =>
            {
                Err(StoreError::ActivePaymentExists(payment.order_id))
            }
            Err(e) => {
                tracing::error!("Failed to execute query while creating payment: {:?}", e);
                Err(StoreError::Unexpected(anyhow::Error::new(e).context(
                    "A database failure occurred while saving the payment",
                )))
            }
        }
    }

    #[tracing::instrument(name = "fetch payment", skip(self))]
    async fn fetch(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let record = sqlx::query_as::<_, PaymentModel>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to execute query while fetching payment: {:?}", e);
                StoreError::Unexpected(
                    anyhow::Error::new(e)
                        .context("A database failure occurred while fetching the payment"),
                )
            })?;
        Ok(record.map(PaymentModel::into_schema))
    }

    #[tracing::instrument(name = "fetch payment by provider ref", skip(self))]
    async fn fetch_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let record =
            sqlx::query_as::<_, PaymentModel>("SELECT * FROM payments WHERE provider_ref = $1")
                .bind(provider_ref)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Failed to execute query while fetching payment by provider ref: {:?}",
                        e
                    );
                    StoreError::Unexpected(
                        anyhow::Error::new(e)
                            .context("A database failure occurred while fetching the payment"),
                    )
                })?;
        Ok(record.map(PaymentModel::into_schema))
    }

    #[tracing::instrument(name = "fetch active payment for order", skip(self))]
    async fn fetch_active_by_order(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let record = sqlx::query_as::<_, PaymentModel>(
            r#"
            SELECT * FROM payments
            WHERE order_id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to execute query while fetching active payment: {:?}",
                e
            );
            StoreError::Unexpected(
                anyhow::Error::new(e)
                    .context("A database failure occurred while fetching the payment"),
            )
        })?;
        Ok(record.map(PaymentModel::into_schema))
    }

    #[tracing::instrument(name = "apply payment transition", skip(self, change), fields(status = %change.status))]
    async fn apply_transition(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        change: PaymentChange,
    ) -> Result<Payment, StoreError> {
        let record = sqlx::query_as::<_, PaymentModel>(
            r#"
            UPDATE payments
            SET status = $3::payment_status,
                provider_ref = COALESCE($4, provider_ref),
                provider_details = COALESCE($5::jsonb, provider_details),
                failure_reason = COALESCE($6, failure_reason),
                processed_at = COALESCE($7, processed_at),
                updated_at = $8
            WHERE id = $1 AND status = $2::payment_status
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(change.status)
        .bind(&change.provider_ref)
        .bind(change.provider_details.as_ref().map(Json))
        .bind(&change.failure_reason)
        .bind(change.processed_at)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to execute query while applying payment transition: {:?}",
                e
            );
            StoreError::Unexpected(
                anyhow::Error::new(e)
                    .context("A database failure occurred while updating the payment"),
            )
        })?;

        match record {
            Some(model) => Ok(model.into_schema()),
            None => match self.fetch(id).await? {
                Some(_) => Err(StoreError::PreconditionFailed),
                None => Err(StoreError::NotFound),
            },
        }
    }

    #[tracing::instrument(name = "fetch stale payments", skip(self))]
    async fn fetch_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        let records = sqlx::query_as::<_, PaymentModel>(
            r#"
            SELECT * FROM payments
            WHERE status IN ('pending', 'processing') AND created_at < $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to execute query while fetching stale payments: {:?}",
                e
            );
            StoreError::Unexpected(
                anyhow::Error::new(e)
                    .context("A database failure occurred while fetching stale payments"),
            )
        })?;
        Ok(records.into_iter().map(PaymentModel::into_schema).collect())
    }
}

fn apply_change(payment: &mut Payment, change: PaymentChange) {
    payment.status = change.status;
    if change.provider_ref.is_some() {
        payment.provider_ref = change.provider_ref;
    }
    if let Some(details) = change.provider_details {
        payment.provider_details = details;
    }
    if change.failure_reason.is_some() {
        payment.failure_reason = change.failure_reason;
    }
    if change.processed_at.is_some() {
        payment.processed_at = change.processed_at;
    }
    payment.updated_at = Utc::now();
}

/// Map-backed store for tests and single-instance deployments without
/// Postgres. The write lock makes both conditional writes atomic.
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    records: RwLock<HashMap<Uuid, Payment>>,
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records
            .values()
            .any(|p| p.order_id == payment.order_id && !p.status.is_terminal())
        {
            return Err(StoreError::ActivePaymentExists(payment.order_id));
        }
        records.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn fetch_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|p| p.provider_ref.as_deref() == Some(provider_ref))
            .cloned())
    }

    async fn fetch_active_by_order(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|p| p.order_id == order_id && !p.status.is_terminal())
            .cloned())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        change: PaymentChange,
    ) -> Result<Payment, StoreError> {
        let mut records = self.records.write().await;
        let payment = records.get_mut(&id).ok_or(StoreError::NotFound)?;
        if payment.status != expected {
            return Err(StoreError::PreconditionFailed);
        }
        apply_change(payment, change);
        Ok(payment.clone())
    }

    async fn fetch_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        let records = self.records.read().await;
        let mut stale: Vec<Payment> = records
            .values()
            .filter(|p| {
                matches!(
                    p.status,
                    PaymentStatus::Pending | PaymentStatus::Processing
                ) && p.created_at < older_than
            })
            .cloned()
            .collect();
        stale.sort_by_key(|p| p.created_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}
