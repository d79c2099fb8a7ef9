//! In-memory provider adapter test double. This is the ambient test-tooling
//! equivalent of `crab_client`'s `LocalMode`/in-process HTTP path: there is
//! no real payment SDK to link against in this workspace, so tests drive a
//! deterministic stand-in instead of a mocking framework.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::IapError;
use crate::types::{Product, PurchaseOutcome, Transaction};

use super::{ProviderAdapter, TransactionUpdateHandler};

#[derive(Default)]
struct MockState {
    products: Vec<Product>,
    purchase_script: VecDeque<PurchaseOutcome>,
    pending_transactions: Vec<Transaction>,
    restore_transactions: Vec<Transaction>,
    finished: Vec<Transaction>,
}

/// Deterministic in-memory stand-in for a real platform SDK binding.
/// Scripted via `push_purchase_outcome`/`set_products`/etc. before use.
#[derive(Clone, Default)]
pub struct MockProviderAdapter {
    state: Arc<Mutex<MockState>>,
    handler: Arc<RwLock<Option<Arc<dyn Fn(Transaction) + Send + Sync>>>>,
    observer_running: Arc<AtomicBool>,
    finish_calls: Arc<AtomicUsize>,
}

impl MockProviderAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_products(&self, products: Vec<Product>) {
        self.state.lock().await.products = products;
    }

    pub async fn push_purchase_outcome(&self, outcome: PurchaseOutcome) {
        self.state.lock().await.purchase_script.push_back(outcome);
    }

    pub async fn set_pending_transactions(&self, transactions: Vec<Transaction>) {
        self.state.lock().await.pending_transactions = transactions;
    }

    pub async fn set_restore_transactions(&self, transactions: Vec<Transaction>) {
        self.state.lock().await.restore_transactions = transactions;
    }

    pub async fn finished_transactions(&self) -> Vec<Transaction> {
        self.state.lock().await.finished.clone()
    }

    pub fn finish_call_count(&self) -> usize {
        self.finish_calls.load(Ordering::SeqCst)
    }

    /// Delivers `transaction` to the currently registered handler, as if
    /// the provider's observer had just fired — used by tests to simulate
    /// asynchronous transaction-stream delivery.
    pub async fn deliver_update(&self, transaction: Transaction) {
        if let Some(handler) = self.handler.read().await.as_ref() {
            handler(transaction);
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observer_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    async fn load_products(&self, ids: &[String]) -> Result<Vec<Product>, IapError> {
        let state = self.state.lock().await;
        Ok(state.products.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
    }

    async fn purchase(&self, _product: &Product, app_account_token: Option<&str>) -> PurchaseOutcome {
        let mut state = self.state.lock().await;
        let outcome = state
            .purchase_script
            .pop_front()
            .unwrap_or(PurchaseOutcome::Failed(IapError::UnknownError(
                "no scripted purchase outcome".into(),
            )));
        // Mirrors a real SDK echoing the caller-supplied token back onto the
        // transaction it hands back, unless the script already set one.
        match outcome {
            PurchaseOutcome::Success(mut tx) => {
                tx.app_account_token = tx.app_account_token.or_else(|| app_account_token.map(String::from));
                PurchaseOutcome::Success(tx)
            }
            PurchaseOutcome::Pending(mut tx) => {
                tx.app_account_token = tx.app_account_token.or_else(|| app_account_token.map(String::from));
                PurchaseOutcome::Pending(tx)
            }
            other => other,
        }
    }

    async fn restore_purchases(&self) -> Result<Vec<Transaction>, IapError> {
        Ok(self.state.lock().await.restore_transactions.clone())
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, IapError> {
        Ok(self.state.lock().await.pending_transactions.clone())
    }

    async fn finish(&self, transaction: &Transaction) -> Result<(), IapError> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().await.finished.push(transaction.clone());
        Ok(())
    }

    async fn start_observer(&self) {
        self.observer_running.store(true, Ordering::SeqCst);
    }

    async fn stop_observer(&self) {
        self.observer_running.store(false, Ordering::SeqCst);
    }

    async fn set_transaction_update_handler(&self, handler: TransactionUpdateHandler) {
        *self.handler.write().await = Some(Arc::from(handler));
    }
}
