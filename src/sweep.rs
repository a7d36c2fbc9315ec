use crate::configuration::SweepSettings;
use crate::constants::SWEEP_BATCH_SIZE;
use crate::order_client::OrderSync;
use crate::routes::payment::schemas::{PaymentStatus, ProviderDetails};
use crate::routes::payment::store::{PaymentChange, PaymentStore, StoreError};
use crate::routes::payment::utils::{run_order_sync, SyncAction};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Background task that times out abandoned payments. Customers drop off
/// mid-STK-push and some provider callbacks never arrive; without this,
/// those records hold the one-active-payment slot for their order forever.
pub fn spawn_stale_payment_sweep(
    store: Arc<dyn PaymentStore>,
    order_sync: Arc<dyn OrderSync>,
    settings: SweepSettings,
) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(settings.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match sweep_once(store.as_ref(), order_sync.as_ref(), &settings).await {
                Ok(0) => {}
                Ok(count) => tracing::info!("Timed out {} stale payments", count),
                Err(e) => tracing::error!("Stale payment sweep failed: {:?}", e),
            }
        }
    });
}

/// One pass over stale `pending`/`processing` records. Bank transfers are
/// only failed once their reference window has lapsed; everything else uses
/// the configured age. Records settled by a racing webhook are skipped.
pub async fn sweep_once(
    store: &dyn PaymentStore,
    order_sync: &dyn OrderSync,
    settings: &SweepSettings,
) -> Result<usize, StoreError> {
    let now = Utc::now();
    let cutoff = now - Duration::seconds(settings.pending_max_age_secs);
    let stale = store.fetch_stale(cutoff, SWEEP_BATCH_SIZE).await?;

    let mut failed = 0usize;
    for payment in stale {
        if let ProviderDetails::BankTransfer { expires_at, .. } = &payment.provider_details {
            if *expires_at > now {
                continue;
            }
        }
        let mut change = PaymentChange::to(PaymentStatus::Failed);
        change.failure_reason = Some("timeout".to_string());
        change.processed_at = Some(now);
        match store
            .apply_transition(payment.id, payment.status, change)
            .await
        {
            Ok(updated) => {
                failed += 1;
                let action = SyncAction::MarkFailed(updated.order_id, "timeout".to_string());
                if let Err(e) = run_order_sync(order_sync, &action).await {
                    tracing::error!(
                        "Order sync for timed-out payment {} failed: {}",
                        updated.id,
                        e
                    );
                }
            }
            // Settled between fetch and write.
            Err(StoreError::PreconditionFailed) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(failed)
}
