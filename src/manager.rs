//! The public façade: one owned `IapManager` instance (no global/singleton,
//! per the project convention that state never hides behind statics) that
//! composes every L1/L2/L3 component and exposes spec'd operations plus
//! observer registration and introspection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cache::{OrderCache, ProductCache};
use crate::config::Configuration;
use crate::error::IapError;
use crate::handlers::{Handlers, OrderHandler, TransactionHandler};
use crate::network::{EndpointBuilder, NetworkClient, RequestBuilder, RequestExecutor, ResponseParser};
use crate::provider::ProviderAdapter;
use crate::retry::RetryManager;
use crate::services::{OrderService, ProductService, PurchaseService, RecoveryManager, RecoveryOutcome, TransactionMonitor};
use crate::types::{Order, OrderStatus, Product, PurchaseResult, PurchaseStats, Transaction, UserInfo, ValidationResult};
use crate::validator::ReceiptValidator;

/// Owned orchestration core. Construction wires every component together;
/// `initialize`/`cleanup` drive the background observer and recovery task
/// lifecycle explicitly.
pub struct IapManager {
    config: RwLock<Arc<Configuration>>,
    product_service: Arc<ProductService>,
    order_service: Arc<OrderService>,
    purchase_service: Arc<PurchaseService>,
    validator: Arc<ReceiptValidator>,
    monitor: Arc<TransactionMonitor>,
    recovery: Arc<RecoveryManager>,
    handlers: Arc<Handlers>,
    recent_transactions: Arc<RwLock<HashMap<String, Transaction>>>,
    initialized: RwLock<bool>,
}

/// Builds an [`IapManager`] the common way — default `NetworkClient`
/// strategies and a caller-supplied provider adapter — with the same
/// fluent strategy-override points `NetworkClient::with_strategies`
/// exposes, for embedding applications (and tests) that need a custom
/// transport.
#[derive(Default)]
pub struct IapManagerBuilder {
    endpoint_builder: Option<Arc<dyn EndpointBuilder>>,
    request_builder: Option<Arc<dyn RequestBuilder>>,
    executor: Option<Arc<dyn RequestExecutor>>,
    parser: Option<Arc<dyn ResponseParser>>,
}

impl IapManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint_builder(mut self, value: Arc<dyn EndpointBuilder>) -> Self {
        self.endpoint_builder = Some(value);
        self
    }

    pub fn request_builder(mut self, value: Arc<dyn RequestBuilder>) -> Self {
        self.request_builder = Some(value);
        self
    }

    pub fn request_executor(mut self, value: Arc<dyn RequestExecutor>) -> Self {
        self.executor = Some(value);
        self
    }

    pub fn response_parser(mut self, value: Arc<dyn ResponseParser>) -> Self {
        self.parser = Some(value);
        self
    }

    pub fn build(self, config: Configuration, adapter: Arc<dyn ProviderAdapter>) -> IapManager {
        IapManager::with_network_strategies(
            config,
            adapter,
            self.endpoint_builder,
            self.request_builder,
            self.executor,
            self.parser,
        )
    }
}

impl IapManager {
    /// Assembles every component from `config` and `adapter` with the
    /// default `NetworkClient` strategies. Platform capability detection
    /// (which concrete `ProviderAdapter` variant to construct) is the
    /// embedding application's responsibility — the core only ever depends
    /// on the trait object.
    pub fn new(config: Configuration, adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self::with_network_strategies(config, adapter, None, None, None, None)
    }

    fn with_network_strategies(
        config: Configuration,
        adapter: Arc<dyn ProviderAdapter>,
        endpoint_builder: Option<Arc<dyn EndpointBuilder>>,
        request_builder: Option<Arc<dyn RequestBuilder>>,
        executor: Option<Arc<dyn RequestExecutor>>,
        parser: Option<Arc<dyn ResponseParser>>,
    ) -> Self {
        let config = Arc::new(config);
        let retry = RetryManager::new(config.max_retry_attempts, config.base_retry_delay);
        let network = NetworkClient::new(config.network.base_url.clone(), config.network.timeout, retry)
            .with_strategies(endpoint_builder, request_builder, executor, parser);

        let product_service = Arc::new(ProductService::new(
            adapter.clone(),
            ProductCache::new(config.product_cache_expiration),
        ));
        let order_service = Arc::new(OrderService::new(network, OrderCache::new()));
        let validator = Arc::new(ReceiptValidator::new(config.receipt_validation.clone()));
        let purchase_service = Arc::new(PurchaseService::new(
            config.clone(),
            order_service.clone(),
            adapter.clone(),
            validator.clone(),
        ));
        let handlers = Arc::new(Handlers::new());
        let monitor = Arc::new(TransactionMonitor::new(
            adapter.clone(),
            order_service.clone(),
            handlers.clone(),
            config.clone(),
        ));
        let recovery = Arc::new(RecoveryManager::new(adapter, order_service.clone(), monitor.clone()));

        Self {
            config: RwLock::new(config),
            product_service,
            order_service,
            purchase_service,
            validator,
            monitor,
            recovery,
            handlers,
            recent_transactions: Arc::new(RwLock::new(HashMap::new())),
            initialized: RwLock::new(false),
        }
    }

    /// Starts the transaction monitor and, if configured, runs startup
    /// recovery. Idempotent: a second call with a semantically equal
    /// config is a no-op; a call with a materially different config is
    /// rejected, since components are wired once at construction.
    #[tracing::instrument(skip(self, config))]
    pub async fn initialize(&self, config: &Configuration) -> Result<(), IapError> {
        if *self.initialized.read().await {
            if self.config.read().await.is_equivalent(config) {
                return Ok(());
            }
            return Err(IapError::ConfigurationError(
                "cannot re-initialize with a materially different configuration".into(),
            ));
        }

        self.register_recent_transaction_tracker().await;
        self.monitor.start().await;
        let auto_recover = self.config.read().await.auto_recover_transactions;
        if auto_recover {
            match self.recovery.recover().await {
                RecoveryOutcome::Success(n) => tracing::debug!(recovered = n, "startup recovery complete"),
                RecoveryOutcome::Failure(err) => tracing::warn!(error = %err, "startup recovery failed"),
                RecoveryOutcome::AlreadyInProgress => {}
            }
        }
        *self.initialized.write().await = true;
        Ok(())
    }

    /// Registers the handler that backs `get_recent_transaction`, keyed by
    /// `product_id`. Uses the same one-way fan-out path every other
    /// handler uses — the manager is just another subscriber.
    async fn register_recent_transaction_tracker(&self) {
        let recent = self.recent_transactions.clone();
        let handler: TransactionHandler = Arc::new(move |tx: Transaction| {
            let recent = recent.clone();
            tokio::spawn(async move {
                recent.write().await.insert(tx.product_id.clone(), tx);
            });
        });
        self.handlers.transactions.add("__manager_recent_tx_tracker", handler).await;
    }

    /// Stops the observer and background tasks; in-memory state (caches,
    /// handler registrations, stats) is dropped with the manager itself.
    /// Configuration is retained so a later `initialize` can resume.
    pub async fn cleanup(&self) {
        self.monitor.stop().await;
        self.handlers.transactions.clear().await;
        self.handlers.orders.clear().await;
        self.recent_transactions.write().await.clear();
        *self.initialized.write().await = false;
    }

    pub async fn load_products(&self, ids: &[String]) -> Result<Vec<Product>, IapError> {
        self.product_service.load_products(ids).await
    }

    pub async fn purchase(&self, product: &Product, user_info: Option<UserInfo>) -> PurchaseResult {
        self.purchase_service.purchase(product, user_info).await
    }

    pub async fn restore_purchases(&self) -> Result<Vec<Transaction>, IapError> {
        self.purchase_service.restore_purchases().await
    }

    pub async fn validate_receipt(
        &self,
        receipt_data: &[u8],
        order: Option<&Order>,
    ) -> Result<ValidationResult, IapError> {
        match order {
            Some(order) => self.validator.validate_for_order(receipt_data, order).await,
            None => self.validator.validate(receipt_data).await,
        }
    }

    pub async fn create_order(&self, product: &Product, user_info: Option<UserInfo>) -> Result<Order, IapError> {
        self.order_service.create_order(product, user_info).await
    }

    pub async fn query_order_status(&self, order_id: Uuid) -> Result<OrderStatus, IapError> {
        self.order_service.query_order_status(order_id).await
    }

    pub async fn finish_transaction(&self, transaction: &Transaction) -> Result<(), IapError> {
        self.monitor.finish_transaction(transaction).await
    }

    pub async fn add_transaction_handler(&self, id: impl Into<String>, handler: TransactionHandler) {
        self.handlers.transactions.add(id, handler).await;
    }

    pub async fn remove_transaction_handler(&self, id: &str) {
        self.handlers.transactions.remove(id).await;
    }

    pub async fn clear_transaction_handlers(&self) {
        self.handlers.transactions.clear().await;
    }

    pub async fn add_order_handler(&self, id: impl Into<String>, handler: OrderHandler) {
        self.handlers.orders.add(id, handler).await;
    }

    pub async fn remove_order_handler(&self, id: &str) {
        self.handlers.orders.remove(id).await;
    }

    pub async fn clear_order_handlers(&self) {
        self.handlers.orders.clear().await;
    }

    pub async fn get_product(&self, id: &str) -> Option<Product> {
        self.product_service.cache().get_cached(&[id.to_string()]).await.into_iter().next()
    }

    pub async fn get_recent_transaction(&self, product_id: &str) -> Option<Transaction> {
        self.recent_transactions.read().await.get(product_id).cloned()
    }

    /// The most recent non-terminal order for `product_id`, if any.
    pub async fn get_active_order(&self, product_id: &str) -> Option<Order> {
        self.order_service
            .cache()
            .by_product(product_id)
            .await
            .into_iter()
            .filter(|o| !o.is_terminal())
            .max_by_key(|o| o.created_at)
    }

    pub fn is_purchasing(&self, product_id: &str) -> bool {
        self.purchase_service.is_purchasing(product_id)
    }

    pub fn is_busy(&self) -> bool {
        self.purchase_service.is_busy()
    }

    pub async fn stats(&self) -> PurchaseStats {
        self.purchase_service.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationBuilder;
    use crate::provider::mock::MockProviderAdapter;

    fn manager() -> IapManager {
        let config = ConfigurationBuilder::new().base_url("https://example.com").build().unwrap();
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(MockProviderAdapter::new());
        IapManager::new(config, adapter)
    }

    #[tokio::test]
    async fn initialize_is_idempotent_for_equivalent_config() {
        let manager = manager();
        let config = ConfigurationBuilder::new().base_url("https://example.com").build().unwrap();
        manager.initialize(&config).await.unwrap();
        manager.initialize(&config).await.unwrap();
        manager.cleanup().await;
    }

    #[tokio::test]
    async fn reinitialize_with_different_config_is_rejected() {
        let manager = manager();
        let config = ConfigurationBuilder::new().base_url("https://example.com").build().unwrap();
        manager.initialize(&config).await.unwrap();

        let other = ConfigurationBuilder::new().base_url("https://other.example.com").build().unwrap();
        let err = manager.initialize(&other).await.unwrap_err();
        assert!(matches!(err, IapError::ConfigurationError(_)));
        manager.cleanup().await;
    }

    #[tokio::test]
    async fn is_busy_reflects_in_flight_purchases() {
        let manager = manager();
        assert!(!manager.is_busy());
        assert!(!manager.is_purchasing("p.pro"));
    }
}
