//! Variant B: the SDK delivers updates via observer callbacks on a shared
//! queue. The adapter wraps those callbacks to present the same async
//! interface as [`super::StreamAdapter`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::IapError;
use crate::types::{Product, PurchaseOutcome, Transaction};

use super::sdk::RawProviderClient;
use super::{ProviderAdapter, TransactionUpdateHandler};

/// The legacy SDK's observer queue, as an injectable callback surface: the
/// embedding application's binding calls [`QueueAdapter::enqueue`] whenever
/// the platform queue delivers an update.
pub struct QueueAdapter {
    client: Arc<dyn RawProviderClient>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Transaction>>>,
    enqueue_tx: mpsc::UnboundedSender<Transaction>,
    handler: Arc<RwLock<Option<TransactionUpdateHandler>>>,
    running: Arc<AtomicBool>,
    drainer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl QueueAdapter {
    pub fn new(client: Arc<dyn RawProviderClient>) -> Self {
        let (enqueue_tx, queue) = mpsc::unbounded_channel();
        Self {
            client,
            queue: Arc::new(Mutex::new(queue)),
            enqueue_tx,
            handler: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            drainer: Arc::new(Mutex::new(None)),
        }
    }

    /// Pushes an update delivered by the platform's observer queue.
    pub fn enqueue(&self, transaction: Transaction) {
        let _ = self.enqueue_tx.send(transaction);
    }
}

#[async_trait]
impl ProviderAdapter for QueueAdapter {
    async fn load_products(&self, ids: &[String]) -> Result<Vec<Product>, IapError> {
        self.client.load_products(ids).await
    }

    async fn purchase(&self, product: &Product, app_account_token: Option<&str>) -> PurchaseOutcome {
        self.client.purchase(product, app_account_token).await
    }

    async fn restore_purchases(&self) -> Result<Vec<Transaction>, IapError> {
        self.client.restore_purchases().await
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, IapError> {
        self.client.pending_transactions().await
    }

    async fn finish(&self, transaction: &Transaction) -> Result<(), IapError> {
        self.client.finish(transaction).await
    }

    async fn start_observer(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let queue = self.queue.clone();
        let handler = self.handler.clone();
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let mut rx = queue.lock().await;
            while running.load(Ordering::SeqCst) {
                match rx.recv().await {
                    Some(tx) => {
                        if let Some(h) = handler.read().await.as_ref() {
                            h(tx);
                        }
                    }
                    None => break,
                }
            }
        });
        *self.drainer.lock().await = Some(task);
        tracing::debug!("queue provider adapter observer started");
    }

    async fn stop_observer(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.drainer.lock().await.take() {
            task.abort();
        }
        tracing::debug!("queue provider adapter observer stopped");
    }

    async fn set_transaction_update_handler(&self, handler: TransactionUpdateHandler) {
        *self.handler.write().await = Some(handler);
    }
}
