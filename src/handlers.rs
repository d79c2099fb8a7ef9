//! One-way fan-out registries for transaction/order update callbacks.
//! Callbacks are stored behind an opaque `String` id and never reference
//! back into a UI layer — handlers are owned here, never the other way
//! around.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::{Order, Transaction};

pub type TransactionHandler = Arc<dyn Fn(Transaction) + Send + Sync>;
pub type OrderHandler = Arc<dyn Fn(Order) + Send + Sync>;

/// A registry of handlers keyed by caller-supplied opaque id, invoked in
/// registration order on every `notify`.
pub struct HandlerRegistry<H> {
    handlers: RwLock<HashMap<String, H>>,
}

impl<H> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self { handlers: RwLock::new(HashMap::new()) }
    }
}

impl<H: Clone> HandlerRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, id: impl Into<String>, handler: H) {
        self.handlers.write().await.insert(id.into(), handler);
    }

    pub async fn remove(&self, id: &str) {
        self.handlers.write().await.remove(id);
    }

    pub async fn clear(&self) {
        self.handlers.write().await.clear();
    }

    pub async fn snapshot(&self) -> Vec<H> {
        self.handlers.read().await.values().cloned().collect()
    }
}

#[derive(Default)]
pub struct Handlers {
    pub transactions: HandlerRegistry<TransactionHandler>,
    pub orders: HandlerRegistry<OrderHandler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notify_transaction(&self, tx: &Transaction) {
        for handler in self.transactions.snapshot().await {
            handler(tx.clone());
        }
    }

    pub async fn notify_order(&self, order: &Order) {
        for handler in self.orders.snapshot().await {
            handler(order.clone());
        }
    }
}
