//! Startup reconciliation: drains any transactions the provider still has
//! pending from a previous run and reconciles pending orders against the
//! server, before the transaction monitor's steady-state loop takes over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::IapError;
use crate::provider::ProviderAdapter;

use super::order_service::OrderService;
use super::transaction_monitor::TransactionMonitor;

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    Success(usize),
    Failure(String),
    AlreadyInProgress,
}

/// Runs exactly once per call to `recover`, guarded against re-entry by an
/// `AtomicBool` — a second concurrent call returns `AlreadyInProgress`
/// immediately rather than queuing behind the first.
pub struct RecoveryManager {
    adapter: Arc<dyn ProviderAdapter>,
    order_service: Arc<OrderService>,
    monitor: Arc<TransactionMonitor>,
    in_progress: Arc<AtomicBool>,
}

impl RecoveryManager {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        order_service: Arc<OrderService>,
        monitor: Arc<TransactionMonitor>,
    ) -> Self {
        Self { adapter, order_service, monitor, in_progress: Arc::new(AtomicBool::new(false)) }
    }

    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> RecoveryOutcome {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            return RecoveryOutcome::AlreadyInProgress;
        }
        let _guard = ResetOnDrop(self.in_progress.clone());

        let pending = match self.adapter.pending_transactions().await {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!(error = %err, "recovery: failed to drain pending transactions");
                return RecoveryOutcome::Failure(err.to_string());
            }
        };
        let drained = pending.len();
        for tx in pending {
            self.monitor.handle_recovered_update(tx).await;
        }

        let reconciled = self.order_service.recover_pending_orders().await;
        for order in &reconciled {
            self.monitor.notify_order(order).await;
        }

        let total = drained + reconciled.len();
        tracing::debug!(drained_transactions = drained, reconciled_orders = reconciled.len(), "recovery complete");
        RecoveryOutcome::Success(total)
    }
}

struct ResetOnDrop(Arc<AtomicBool>);

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OrderCache;
    use crate::config::ConfigurationBuilder;
    use crate::handlers::Handlers;
    use crate::network::NetworkClient;
    use crate::provider::mock::MockProviderAdapter;
    use crate::retry::RetryManager;
    use crate::types::{Transaction, TransactionState};
    use std::time::Duration;

    fn order_service() -> Arc<OrderService> {
        let retry = RetryManager::new(0, Duration::from_millis(0));
        let network = NetworkClient::new("https://example.com", Duration::from_secs(1), retry);
        Arc::new(OrderService::new(network, OrderCache::new()))
    }

    fn monitor(adapter: Arc<dyn ProviderAdapter>, order_service: Arc<OrderService>) -> Arc<TransactionMonitor> {
        let config = Arc::new(ConfigurationBuilder::new().base_url("https://example.com").build().unwrap());
        Arc::new(TransactionMonitor::new(adapter, order_service, Arc::new(Handlers::new()), config))
    }

    fn tx(id: &str) -> Transaction {
        Transaction {
            id: id.into(),
            product_id: "p.pro".into(),
            purchase_date: chrono::Utc::now(),
            state: TransactionState::Purchased,
            receipt_data: None,
            original_transaction_id: None,
            quantity: 1,
            app_account_token: None,
        }
    }

    #[tokio::test]
    async fn drains_pending_transactions_and_reports_count() {
        let adapter = Arc::new(MockProviderAdapter::new());
        adapter.set_pending_transactions(vec![tx("t1"), tx("t2")]).await;
        let order_service = order_service();
        let monitor = monitor(adapter.clone(), order_service.clone());
        let manager = RecoveryManager::new(adapter, order_service, monitor);

        let outcome = manager.recover().await;
        assert_eq!(outcome, RecoveryOutcome::Success(2));
    }

    #[tokio::test]
    async fn concurrent_recovery_is_rejected() {
        let adapter = Arc::new(MockProviderAdapter::new());
        let order_service = order_service();
        let monitor = monitor(adapter.clone(), order_service.clone());
        let manager = Arc::new(RecoveryManager::new(adapter, order_service, monitor));

        manager.in_progress.store(true, Ordering::SeqCst);
        let outcome = manager.recover().await;
        assert_eq!(outcome, RecoveryOutcome::AlreadyInProgress);
    }
}
