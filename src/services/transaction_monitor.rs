//! Consumes the provider's transaction stream, associates updates with
//! orders, fans out to registered handlers, and sweeps expired orders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Configuration;
use crate::error::IapError;
use crate::handlers::Handlers;
use crate::provider::ProviderAdapter;
use crate::types::{OrderStatus, Transaction, TransactionState};

use super::order_service::OrderService;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// Fallback association window: a transaction is matched to a pending order
/// for the same product if it arrived within this many seconds of the
/// order's creation.
const ASSOCIATION_WINDOW_SECS: i64 = 3600;

struct Inner {
    adapter: Arc<dyn ProviderAdapter>,
    order_service: Arc<OrderService>,
    handlers: Arc<Handlers>,
    config: Arc<Configuration>,
    association: RwLock<HashMap<String, Uuid>>,
}

impl Inner {
    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id))]
    async fn handle_update(&self, tx: Transaction) {
        // Auto-finish is gated only on `auto_finish_transactions`, never on
        // order association — a `restored` transaction, or a `purchased`
        // transaction whose window match hasn't landed yet, still needs
        // exactly one `provider.finish(tx)` call.
        if matches!(tx.state, TransactionState::Purchased | TransactionState::Restored) && self.config.auto_finish_transactions {
            if let Err(err) = self.adapter.finish(&tx).await {
                tracing::warn!(transaction_id = %tx.id, error = %err, "provider.finish failed (non-fatal)");
            }
        }

        let order_id = match self.associated_order(&tx).await {
            Some(id) => Some(id),
            None => self.associate_by_window(&tx).await,
        };

        let Some(order_id) = order_id else {
            tracing::debug!("transaction has no associated order");
            self.handlers.notify_transaction(&tx).await;
            return;
        };

        let side_effect = match &tx.state {
            TransactionState::Purchasing => Some(OrderStatus::Pending),
            TransactionState::Purchased => Some(OrderStatus::Completed),
            TransactionState::Failed { .. } => Some(OrderStatus::Failed),
            TransactionState::Restored => None,
            TransactionState::Deferred => Some(OrderStatus::Pending),
        };

        let mut mutated_order = None;
        if let Some(status) = side_effect {
            match self.order_service.update_order_status(order_id, status).await {
                Ok(order) => mutated_order = Some(order),
                Err(err) => tracing::warn!(order_id = %order_id, error = %err, "failed to apply transaction side-effect to order"),
            }
        }

        self.handlers.notify_transaction(&tx).await;
        if let Some(order) = mutated_order {
            self.handlers.notify_order(&order).await;
        }
    }

    /// Checks the association cache first, then `app_account_token` itself
    /// — the synchronous fast path, since the order id round-trips through
    /// the provider as that token on adapters that support it. A token hit
    /// is cached so repeat updates for the same transaction skip straight
    /// to the cache.
    async fn associated_order(&self, tx: &Transaction) -> Option<Uuid> {
        if let Some(id) = self.association.read().await.get(&tx.id).copied() {
            return Some(id);
        }
        let id = tx.app_account_token.as_deref().and_then(|token| Uuid::parse_str(token).ok())?;
        self.association.write().await.insert(tx.id.clone(), id);
        Some(id)
    }

    /// Time-window fallback: scans active orders for the same product with
    /// a creation time within `ASSOCIATION_WINDOW_SECS` of the transaction's
    /// purchase date, and records the association on a hit.
    async fn associate_by_window(&self, tx: &Transaction) -> Option<Uuid> {
        let candidates = self.order_service.cache().active().await;
        let order = candidates.into_iter().find(|order| {
            order.product_id == tx.product_id
                && (tx.purchase_date - order.created_at) >= ChronoDuration::zero()
                && (tx.purchase_date - order.created_at) <= ChronoDuration::seconds(ASSOCIATION_WINDOW_SECS)
        })?;
        self.association.write().await.insert(tx.id.clone(), order.id);
        Some(order.id)
    }

    async fn sweep_expired(&self) {
        for order in self.order_service.cache().expired().await {
            if order.is_terminal() {
                continue;
            }
            if let Err(err) = self.order_service.cancel_order(order.id).await {
                tracing::warn!(order_id = %order.id, error = %err, "failed to cancel expired order during sweep");
                continue;
            }
            if let Some(updated) = self.order_service.cache().get(order.id).await {
                self.handlers.notify_order(&updated).await;
            }
            let mut association = self.association.write().await;
            association.retain(|_, oid| *oid != order.id);
        }
    }
}

/// Owns the observer lifecycle and the two background tasks (update
/// consumer, expiry sweep) that `start`/`stop` drive explicitly — per the
/// project convention that task lifetimes are managed by lifecycle calls,
/// never spawned from destructors.
pub struct TransactionMonitor {
    inner: Arc<Inner>,
    updates_tx: mpsc::UnboundedSender<Transaction>,
    updates_rx: Arc<Mutex<mpsc::UnboundedReceiver<Transaction>>>,
    consumer: Arc<Mutex<Option<JoinHandle<()>>>>,
    sweep: Arc<Mutex<Option<JoinHandle<()>>>>,
    running: Arc<AtomicBool>,
}

impl TransactionMonitor {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        order_service: Arc<OrderService>,
        handlers: Arc<Handlers>,
        config: Arc<Configuration>,
    ) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                adapter,
                order_service,
                handlers,
                config,
                association: RwLock::new(HashMap::new()),
            }),
            updates_tx,
            updates_rx: Arc::new(Mutex::new(updates_rx)),
            consumer: Arc::new(Mutex::new(None)),
            sweep: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers the update handler, starts the adapter's observer, drains
    /// any pending transactions left over from a previous run, and launches
    /// the periodic expiry sweep. The sweep's 30s period is tighter than
    /// the spec's nominal 5-minute per-order scheduling bound, so a single
    /// periodic task covers both without redundant one-shot timers per
    /// order.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let sender = self.updates_tx.clone();
        self.inner
            .adapter
            .set_transaction_update_handler(Box::new(move |tx| {
                let _ = sender.send(tx);
            }))
            .await;
        self.inner.adapter.start_observer().await;

        if self.inner.config.auto_recover_transactions {
            if let Ok(pending) = self.inner.adapter.pending_transactions().await {
                for tx in pending {
                    self.inner.handle_update(tx).await;
                }
            }
        }

        let inner = self.inner.clone();
        let rx = self.updates_rx.clone();
        let running = self.running.clone();
        let consumer = tokio::spawn(async move {
            let mut rx = rx.lock().await;
            while running.load(Ordering::SeqCst) {
                match rx.recv().await {
                    Some(tx) => inner.handle_update(tx).await,
                    None => break,
                }
            }
        });
        *self.consumer.lock().await = Some(consumer);

        let inner = self.inner.clone();
        let running = self.running.clone();
        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                inner.sweep_expired().await;
            }
        });
        *self.sweep.lock().await = Some(sweep);

        tracing::debug!("transaction monitor started");
    }

    /// Routes a transaction recovered at startup through the same
    /// association/side-effect path as a live update from the provider.
    pub async fn handle_recovered_update(&self, tx: Transaction) {
        self.inner.handle_update(tx).await;
    }

    /// Fans an order out to registered order handlers, for callers (the
    /// recovery manager) that mutate orders outside the update stream.
    pub async fn notify_order(&self, order: &crate::types::Order) {
        self.inner.handlers.notify_order(order).await;
    }

    /// Explicit caller-driven finish, distinct from the auto-finish the
    /// purchase flow performs when `auto_finish_transactions` is set.
    pub async fn finish_transaction(&self, transaction: &Transaction) -> Result<(), IapError> {
        self.inner.adapter.finish(transaction).await
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.consumer.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.sweep.lock().await.take() {
            task.abort();
        }
        self.inner.adapter.stop_observer().await;
        tracing::debug!("transaction monitor stopped");
    }
}
