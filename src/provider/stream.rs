//! Variant A: the SDK exposes an asynchronous sequence of transaction
//! updates directly. The adapter owns a long-lived consumer task, started
//! on `start_observer`, that forwards each update to the registered
//! handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::IapError;
use crate::types::{Product, PurchaseOutcome, Transaction};

use super::sdk::RawProviderClient;
use super::{ProviderAdapter, TransactionUpdateHandler};

pub struct StreamAdapter {
    client: Arc<dyn RawProviderClient>,
    /// The SDK's own update stream, represented as a channel the embedding
    /// application's binding feeds. Wrapped in a `Mutex` because only the
    /// consumer task owns the receiving end at a time.
    updates: Arc<Mutex<mpsc::UnboundedReceiver<Transaction>>>,
    sender: mpsc::UnboundedSender<Transaction>,
    handler: Arc<RwLock<Option<TransactionUpdateHandler>>>,
    running: Arc<AtomicBool>,
    consumer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl StreamAdapter {
    pub fn new(client: Arc<dyn RawProviderClient>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            client,
            updates: Arc::new(Mutex::new(receiver)),
            sender,
            handler: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            consumer: Arc::new(Mutex::new(None)),
        }
    }

    /// The feed the embedding application's SDK binding pushes transaction
    /// updates into.
    pub fn sender(&self) -> mpsc::UnboundedSender<Transaction> {
        self.sender.clone()
    }
}

#[async_trait]
impl ProviderAdapter for StreamAdapter {
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
        let updates = self.updates.clone();
        let handler = self.handler.clone();
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let mut rx = updates.lock().await;
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
        *self.consumer.lock().await = Some(task);
        tracing::debug!("stream provider adapter observer started");
    }

    async fn stop_observer(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.consumer.lock().await.take() {
            task.abort();
        }
        tracing::debug!("stream provider adapter observer stopped");
    }

    async fn set_transaction_update_handler(&self, handler: TransactionUpdateHandler) {
        *self.handler.write().await = Some(handler);
    }
}
