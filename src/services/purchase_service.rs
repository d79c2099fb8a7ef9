//! The central state machine: executes an order-bound purchase end to end,
//! with a per-product in-flight guard, receipt validation, and
//! product-type-specific finalization.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{Configuration, ValidationMode};
use crate::error::IapError;
use crate::provider::ProviderAdapter;
use crate::types::{
    Order, OrderStatus, Product, ProductType, PurchaseOutcome, PurchaseResult, PurchaseStats, Transaction,
    TransactionState, UserInfo,
};
use crate::validator::ReceiptValidator;

use super::order_service::OrderService;

/// Releases a product's in-flight marker on every exit path, including early
/// returns via `?`. Mirrors the drop-guard idiom the rest of the codebase
/// uses for "must run on every exit" invariants.
struct InFlightGuard {
    guard: Arc<DashMap<String, ()>>,
    product_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.guard.remove(&self.product_id);
    }
}

pub struct PurchaseService {
    config: Arc<Configuration>,
    order_service: Arc<OrderService>,
    adapter: Arc<dyn ProviderAdapter>,
    validator: Arc<ReceiptValidator>,
    in_flight: Arc<DashMap<String, ()>>,
    stats: Arc<Mutex<PurchaseStats>>,
}

impl PurchaseService {
    pub fn new(
        config: Arc<Configuration>,
        order_service: Arc<OrderService>,
        adapter: Arc<dyn ProviderAdapter>,
        validator: Arc<ReceiptValidator>,
    ) -> Self {
        Self {
            config,
            order_service,
            adapter,
            validator,
            in_flight: Arc::new(DashMap::new()),
            stats: Arc::new(Mutex::new(PurchaseStats::default())),
        }
    }

    pub fn is_purchasing(&self, product_id: &str) -> bool {
        self.in_flight.contains_key(product_id)
    }

    pub fn is_busy(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Removes the in-flight marker for `product_id` without waiting for the
    /// underlying provider call to settle. Per spec, this does not cancel
    /// the provider request itself.
    pub fn cancel_purchase(&self, product_id: &str) {
        self.in_flight.remove(product_id);
    }

    pub async fn stats(&self) -> PurchaseStats {
        self.stats.lock().await.clone()
    }

    #[tracing::instrument(skip(self, product, user_info), fields(product_id = %product.id))]
    pub async fn purchase(&self, product: &Product, user_info: Option<UserInfo>) -> PurchaseResult {
        {
            self.stats.lock().await.total_attempted += 1;
        }

        if self.in_flight.insert(product.id.clone(), ()).is_some() {
            return PurchaseResult::Failed(IapError::TransactionProcessingFailed, None);
        }
        let _guard = InFlightGuard {
            guard: self.in_flight.clone(),
            product_id: product.id.clone(),
        };

        self.purchase_inner(product, user_info).await
    }

    async fn purchase_inner(&self, product: &Product, user_info: Option<UserInfo>) -> PurchaseResult {
        // 1. Validate product.
        if let Err(err) = product.validate() {
            self.record_terminal(&PurchaseOutcomeKind::Failed).await;
            return PurchaseResult::Failed(err, None);
        }

        // 2. Create order.
        let mut order = match self.order_service.create_order(product, user_info).await {
            Ok(order) => order,
            Err(err) => {
                self.record_terminal(&PurchaseOutcomeKind::Failed).await;
                return PurchaseResult::Failed(err, None);
            }
        };

        // 3. Set order to pending.
        order = match self.order_service.update_order_status(order.id, OrderStatus::Pending).await {
            Ok(order) => order,
            Err(err) => {
                self.record_terminal(&PurchaseOutcomeKind::Failed).await;
                return PurchaseResult::Failed(err, Some(order));
            }
        };

        // 4. Invoke the provider, passing the order id as the
        // synchronous-association token the Transaction Monitor can later
        // read straight off any out-of-band update for this transaction.
        let outcome = self.adapter.purchase(product, Some(&order.id.to_string())).await;

        // 5. Dispatch on outcome.
        let tx = match outcome {
            PurchaseOutcome::Success(tx) | PurchaseOutcome::Pending(tx) => tx,
            PurchaseOutcome::Cancelled => {
                let order = self.fail_order_to(order.id, OrderStatus::Cancelled).await.unwrap_or(order);
                self.record_terminal(&PurchaseOutcomeKind::Cancelled).await;
                return PurchaseResult::Cancelled(Some(order));
            }
            PurchaseOutcome::Failed(err) => {
                let order = self.fail_order_to(order.id, OrderStatus::Failed).await.unwrap_or(order);
                self.record_terminal(&PurchaseOutcomeKind::Failed).await;
                return PurchaseResult::Failed(err, Some(order));
            }
        };

        // 6. Validate association.
        if tx.product_id != order.product_id {
            let order = self.fail_order_to(order.id, OrderStatus::Failed).await.unwrap_or(order);
            self.record_terminal(&PurchaseOutcomeKind::Failed).await;
            return PurchaseResult::Failed(IapError::ServerOrderMismatch, Some(order));
        }
        if order.is_expired() {
            let order = self.fail_order_to(order.id, OrderStatus::Failed).await.unwrap_or(order);
            self.record_terminal(&PurchaseOutcomeKind::Failed).await;
            return PurchaseResult::Failed(IapError::OrderExpired, Some(order));
        }

        // 7. Validate receipt, if present.
        if let Some(receipt_data) = &tx.receipt_data {
            match self.validator.validate_for_order(receipt_data, &order).await {
                Ok(result) if result.is_valid => {}
                Ok(result) => {
                    let mode = self.config.receipt_validation.mode;
                    if matches!(mode, ValidationMode::Remote | ValidationMode::LocalThenRemote) {
                        let order = self.fail_order_to(order.id, OrderStatus::Failed).await.unwrap_or(order);
                        self.record_terminal(&PurchaseOutcomeKind::Failed).await;
                        return PurchaseResult::Failed(
                            IapError::ReceiptValidationFailed(
                                result.error.unwrap_or_else(|| "receipt invalid".into()),
                            ),
                            Some(order),
                        );
                    }
                    tracing::warn!(order_id = %order.id, "local receipt validation failed; continuing under local mode");
                }
                Err(err) => {
                    let mode = self.config.receipt_validation.mode;
                    if matches!(mode, ValidationMode::Remote | ValidationMode::LocalThenRemote) {
                        let order = self.fail_order_to(order.id, OrderStatus::Failed).await.unwrap_or(order);
                        self.record_terminal(&PurchaseOutcomeKind::Failed).await;
                        return PurchaseResult::Failed(err, Some(order));
                    }
                    tracing::warn!(order_id = %order.id, error = %err, "local receipt validation errored; continuing under local mode");
                }
            }
        }

        // 8. Finalize by transaction state.
        match &tx.state {
            TransactionState::Purchased => {
                let order = self.complete_order(order.id).await.unwrap_or(order);
                if self.config.auto_finish_transactions {
                    if let Err(err) = self.adapter.finish(&tx).await {
                        tracing::warn!(transaction_id = %tx.id, error = %err, "provider.finish failed (non-fatal)");
                    }
                }
                self.apply_product_type_checks(product, &tx, &order).await;
                self.record_terminal(&PurchaseOutcomeKind::Completed).await;
                PurchaseResult::Success(tx, order)
            }
            TransactionState::Restored => {
                let order = self.complete_order(order.id).await.unwrap_or(order);
                self.apply_product_type_checks(product, &tx, &order).await;
                self.record_terminal(&PurchaseOutcomeKind::Completed).await;
                PurchaseResult::Success(tx, order)
            }
            TransactionState::Purchasing | TransactionState::Deferred => PurchaseResult::Pending(tx, order),
            // `PurchaseOutcome::Cancelled` (step 5) is the provider's direct
            // cancellation signal; a `purchase_cancelled` string settling
            // into a later `Failed` state is the same signal arriving after
            // an intermediate `pending`/`purchasing` state.
            TransactionState::Failed { error } if error == "purchase_cancelled" => {
                let order = self.fail_order_to(order.id, OrderStatus::Cancelled).await.unwrap_or(order);
                self.record_terminal(&PurchaseOutcomeKind::Cancelled).await;
                PurchaseResult::Cancelled(Some(order))
            }
            TransactionState::Failed { error } => {
                let order = self.fail_order_to(order.id, OrderStatus::Failed).await.unwrap_or(order);
                self.record_terminal(&PurchaseOutcomeKind::Failed).await;
                PurchaseResult::Failed(IapError::PurchaseFailed(error.clone()), Some(order))
            }
        }
    }

    /// Non-consumables get an ownership-sanity check (logged, not undone);
    /// subscriptions get a presence check on `subscription_info`, never an
    /// eager finish (the provider drives renewals).
    async fn apply_product_type_checks(&self, product: &Product, tx: &Transaction, order: &Order) {
        match product.product_type {
            ProductType::NonConsumable => {
                let sane = matches!(tx.state, TransactionState::Purchased | TransactionState::Restored)
                    && order.status == OrderStatus::Completed;
                if !sane {
                    tracing::warn!(order_id = %order.id, "non-consumable ownership sanity check failed; order remains completed");
                }
            }
            ProductType::AutoRenewableSubscription | ProductType::NonRenewingSubscription => {
                if product.subscription_info.is_none() {
                    tracing::warn!(product_id = %product.id, "subscription product missing subscription_info");
                }
            }
            ProductType::Consumable => {}
        }
    }

    async fn complete_order(&self, order_id: Uuid) -> Option<Order> {
        self.order_service.update_order_status(order_id, OrderStatus::Completed).await.ok()
    }

    async fn fail_order_to(&self, order_id: Uuid, status: OrderStatus) -> Option<Order> {
        self.order_service.update_order_status(order_id, status).await.ok()
    }

    async fn record_terminal(&self, kind: &PurchaseOutcomeKind) {
        let mut stats = self.stats.lock().await;
        match kind {
            PurchaseOutcomeKind::Completed => stats.total_completed += 1,
            PurchaseOutcomeKind::Cancelled => stats.total_cancelled += 1,
            PurchaseOutcomeKind::Failed => stats.total_failed += 1,
        }
    }

    /// Validates each restored transaction's receipt with basic (no-order)
    /// validation; drops those failing remote/hybrid validation, keeps all
    /// under local mode.
    #[tracing::instrument(skip(self))]
    pub async fn restore_purchases(&self) -> Result<Vec<Transaction>, IapError> {
        let transactions = self.adapter.restore_purchases().await?;
        let mut kept = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let Some(receipt_data) = &tx.receipt_data else {
                kept.push(tx);
                continue;
            };
            match self.validator.validate(receipt_data).await {
                Ok(result) if result.is_valid => kept.push(tx),
                Ok(_) | Err(_) if self.config.receipt_validation.mode == ValidationMode::Local => kept.push(tx),
                Ok(_) | Err(_) => {
                    tracing::warn!(transaction_id = %tx.id, "dropping restored transaction that failed validation");
                }
            }
        }
        Ok(kept)
    }
}

enum PurchaseOutcomeKind {
    Completed,
    Cancelled,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OrderCache;
    use crate::config::{ConfigurationBuilder, ReceiptValidationConfig};
    use crate::network::{HttpRequest, HttpResponse, NetworkClient, RequestExecutor};
    use crate::provider::mock::MockProviderAdapter;
    use crate::retry::RetryManager;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct ScriptedExecutor {
        responses: StdMutex<std::collections::VecDeque<Result<HttpResponse, IapError>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RequestExecutor for ScriptedExecutor {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, IapError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop_front().expect("no scripted response left")
        }
    }

    fn ok_order_response(status: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            bytes: serde_json::to_vec(&serde_json::json!({
                "order_id": "o1", "server_order_id": "s1", "status": status,
                "expires_at": Utc::now() + chrono::Duration::hours(1),
            }))
            .unwrap(),
        }
    }

    fn product() -> Product {
        Product {
            id: "p.pro".into(),
            display_name: "Pro".into(),
            description: String::new(),
            price: Decimal::new(999, 2),
            price_locale: "en_US".into(),
            localized_price: "$9.99".into(),
            product_type: ProductType::Consumable,
            subscription_info: None,
        }
    }

    fn purchased_tx(product_id: &str) -> Transaction {
        Transaction {
            id: "t1".into(),
            product_id: product_id.into(),
            purchase_date: Utc::now(),
            state: TransactionState::Purchased,
            receipt_data: None,
            original_transaction_id: None,
            quantity: 1,
            app_account_token: None,
        }
    }

    fn service(executor: Arc<ScriptedExecutor>, adapter: Arc<MockProviderAdapter>) -> PurchaseService {
        let retry = RetryManager::new(0, Duration::from_millis(0));
        let network = NetworkClient::new("https://example.com", Duration::from_secs(1), retry)
            .with_strategies(None, None, Some(executor), None);
        let order_service = Arc::new(OrderService::new(network, OrderCache::new()));
        let config = Arc::new(ConfigurationBuilder::new().base_url("https://example.com").build().unwrap());
        let validator = Arc::new(ReceiptValidator::new(ReceiptValidationConfig::default()));
        PurchaseService::new(config, order_service, adapter, validator)
    }

    #[tokio::test]
    async fn order_id_round_trips_onto_transaction_as_app_account_token() {
        let executor = Arc::new(ScriptedExecutor {
            responses: StdMutex::new(
                vec![Ok(ok_order_response("created")), Ok(ok_order_response("pending")), Ok(ok_order_response("completed"))].into(),
            ),
            calls: AtomicUsize::new(0),
        });
        let adapter = Arc::new(MockProviderAdapter::new());
        adapter.push_purchase_outcome(PurchaseOutcome::Success(purchased_tx("p.pro"))).await;
        let service = service(executor, adapter);

        let result = service.purchase(&product(), None).await;
        match result {
            PurchaseResult::Success(tx, order) => {
                assert_eq!(tx.app_account_token.as_deref(), Some(order.id.to_string().as_str()));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_then_remote_falls_through_to_remote_via_purchase() {
        let executor = Arc::new(ScriptedExecutor {
            responses: StdMutex::new(
                vec![Ok(ok_order_response("created")), Ok(ok_order_response("pending")), Ok(ok_order_response("failed"))].into(),
            ),
            calls: AtomicUsize::new(0),
        });
        let adapter = Arc::new(MockProviderAdapter::new());
        let mut tx = purchased_tx("p.pro");
        tx.receipt_data = Some(vec![0x30, 0x82, 0x01, 0x02]);
        adapter.push_purchase_outcome(PurchaseOutcome::Success(tx)).await;

        let retry = RetryManager::new(0, Duration::from_millis(0));
        let network = NetworkClient::new("https://example.com", Duration::from_secs(1), retry)
            .with_strategies(None, None, Some(executor), None);
        let order_service = Arc::new(OrderService::new(network, OrderCache::new()));
        let config = Arc::new(ConfigurationBuilder::new().base_url("https://example.com").build().unwrap());
        let validator = Arc::new(ReceiptValidator::new(ReceiptValidationConfig {
            mode: ValidationMode::LocalThenRemote,
            server_url: None,
            ..Default::default()
        }));
        let service = PurchaseService::new(config, order_service, adapter, validator);

        let result = service.purchase(&product(), None).await;
        match result {
            // Local reports the receipt valid but with no transactions, so a
            // naive `is_valid`-only fallthrough would stop there and fail the
            // order on a spurious binding mismatch. Reaching
            // `ConfigurationError` instead proves the call fell through to
            // remote validation, which fails only for lack of a configured
            // `server_url`.
            PurchaseResult::Failed(IapError::ConfigurationError(_), Some(order)) => {
                assert_eq!(order.status, OrderStatus::Failed);
            }
            other => panic!("expected failed with ConfigurationError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn happy_path_completes_order_and_finishes_transaction() {
        let executor = Arc::new(ScriptedExecutor {
            responses: StdMutex::new(
                vec![Ok(ok_order_response("created")), Ok(ok_order_response("pending")), Ok(ok_order_response("completed"))].into(),
            ),
            calls: AtomicUsize::new(0),
        });
        let adapter = Arc::new(MockProviderAdapter::new());
        adapter.push_purchase_outcome(PurchaseOutcome::Success(purchased_tx("p.pro"))).await;
        let service = service(executor, adapter.clone());

        let result = service.purchase(&product(), None).await;
        match result {
            PurchaseResult::Success(tx, order) => {
                assert_eq!(tx.id, "t1");
                assert_eq!(order.status, OrderStatus::Completed);
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(adapter.finish_call_count(), 1);
        assert_eq!(service.stats().await.total_completed, 1);
    }

    #[tokio::test]
    async fn user_cancellation_is_not_an_error() {
        let executor = Arc::new(ScriptedExecutor {
            responses: StdMutex::new(
                vec![Ok(ok_order_response("created")), Ok(ok_order_response("pending")), Ok(ok_order_response("cancelled"))].into(),
            ),
            calls: AtomicUsize::new(0),
        });
        let adapter = Arc::new(MockProviderAdapter::new());
        adapter.push_purchase_outcome(PurchaseOutcome::Cancelled).await;
        let service = service(executor, adapter.clone());

        let result = service.purchase(&product(), None).await;
        match result {
            PurchaseResult::Cancelled(Some(order)) => assert_eq!(order.status, OrderStatus::Cancelled),
            other => panic!("expected cancelled, got {other:?}"),
        }
        assert_eq!(adapter.finish_call_count(), 0);
    }

    #[tokio::test]
    async fn server_order_mismatch_fails_order() {
        let executor = Arc::new(ScriptedExecutor {
            responses: StdMutex::new(
                vec![Ok(ok_order_response("created")), Ok(ok_order_response("pending")), Ok(ok_order_response("failed"))].into(),
            ),
            calls: AtomicUsize::new(0),
        });
        let adapter = Arc::new(MockProviderAdapter::new());
        adapter.push_purchase_outcome(PurchaseOutcome::Success(purchased_tx("p.other"))).await;
        let service = service(executor, adapter);

        let result = service.purchase(&product(), None).await;
        match result {
            PurchaseResult::Failed(IapError::ServerOrderMismatch, Some(order)) => {
                assert_eq!(order.status, OrderStatus::Failed);
            }
            other => panic!("expected server_order_mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn purchase_cancelled_failure_after_pending_is_surfaced_as_cancelled() {
        let executor = Arc::new(ScriptedExecutor {
            responses: StdMutex::new(
                vec![Ok(ok_order_response("created")), Ok(ok_order_response("pending")), Ok(ok_order_response("cancelled"))].into(),
            ),
            calls: AtomicUsize::new(0),
        });
        let adapter = Arc::new(MockProviderAdapter::new());
        let mut tx = purchased_tx("p.pro");
        tx.state = TransactionState::Failed { error: "purchase_cancelled".into() };
        adapter.push_purchase_outcome(PurchaseOutcome::Pending(tx)).await;
        let service = service(executor, adapter.clone());

        let result = service.purchase(&product(), None).await;
        match result {
            PurchaseResult::Cancelled(Some(order)) => assert_eq!(order.status, OrderStatus::Cancelled),
            other => panic!("expected cancelled, got {other:?}"),
        }
        assert_eq!(adapter.finish_call_count(), 0);
        assert_eq!(service.stats().await.total_cancelled, 1);
    }

    #[tokio::test]
    async fn reentrant_purchase_for_same_product_is_rejected() {
        let executor = Arc::new(ScriptedExecutor {
            responses: StdMutex::new(std::collections::VecDeque::new()),
            calls: AtomicUsize::new(0),
        });
        let adapter = Arc::new(MockProviderAdapter::new());
        let service = service(executor, adapter);
        service.in_flight.insert("p.pro".into(), ());

        let result = service.purchase(&product(), None).await;
        assert!(matches!(result, PurchaseResult::Failed(IapError::TransactionProcessingFailed, None)));
    }
}
