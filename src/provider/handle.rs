//! Closed-variant-set dispatch over the two concrete provider adapters.

use async_trait::async_trait;

use crate::error::IapError;
use crate::types::{Product, PurchaseOutcome, Transaction};

use super::{ProviderAdapter, QueueAdapter, StreamAdapter, TransactionUpdateHandler};

/// Picks the concrete adapter at construction time based on platform
/// capability detection, then exposes one typed front door. The variant set
/// is closed (there are exactly two supported SDK shapes), so this is
/// enum-dispatch rather than a trait object.
pub enum ProviderAdapterHandle {
    Stream(StreamAdapter),
    Queue(QueueAdapter),
}

#[async_trait]
impl ProviderAdapter for ProviderAdapterHandle {
    async fn load_products(&self, ids: &[String]) -> Result<Vec<Product>, IapError> {
        match self {
            ProviderAdapterHandle::Stream(a) => a.load_products(ids).await,
            ProviderAdapterHandle::Queue(a) => a.load_products(ids).await,
        }
    }

    async fn purchase(&self, product: &Product, app_account_token: Option<&str>) -> PurchaseOutcome {
        match self {
            ProviderAdapterHandle::Stream(a) => a.purchase(product, app_account_token).await,
            ProviderAdapterHandle::Queue(a) => a.purchase(product, app_account_token).await,
        }
    }

    async fn restore_purchases(&self) -> Result<Vec<Transaction>, IapError> {
        match self {
            ProviderAdapterHandle::Stream(a) => a.restore_purchases().await,
            ProviderAdapterHandle::Queue(a) => a.restore_purchases().await,
        }
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, IapError> {
        match self {
            ProviderAdapterHandle::Stream(a) => a.pending_transactions().await,
            ProviderAdapterHandle::Queue(a) => a.pending_transactions().await,
        }
    }

    async fn finish(&self, transaction: &Transaction) -> Result<(), IapError> {
        match self {
            ProviderAdapterHandle::Stream(a) => a.finish(transaction).await,
            ProviderAdapterHandle::Queue(a) => a.finish(transaction).await,
        }
    }

    async fn start_observer(&self) {
        match self {
            ProviderAdapterHandle::Stream(a) => a.start_observer().await,
            ProviderAdapterHandle::Queue(a) => a.start_observer().await,
        }
    }

    async fn stop_observer(&self) {
        match self {
            ProviderAdapterHandle::Stream(a) => a.stop_observer().await,
            ProviderAdapterHandle::Queue(a) => a.stop_observer().await,
        }
    }

    async fn set_transaction_update_handler(&self, handler: TransactionUpdateHandler) {
        match self {
            ProviderAdapterHandle::Stream(a) => a.set_transaction_update_handler(handler).await,
            ProviderAdapterHandle::Queue(a) => a.set_transaction_update_handler(handler).await,
        }
    }
}
