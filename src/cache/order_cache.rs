//! In-memory order table keyed by local order id, with a secondary
//! product-id index, matching the way
//! `edge-server::printing::cache::PrintConfigCache` keeps dedicated maps
//! per lookup axis rather than scanning on every read.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{Order, OrderStatus};

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    by_product: HashMap<String, HashSet<Uuid>>,
}

#[derive(Clone, Default)]
pub struct OrderCache {
    inner: Arc<RwLock<Inner>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically inserts or replaces an order, maintaining the product-id
    /// index.
    pub async fn store(&self, order: Order) {
        let mut inner = self.inner.write().await;
        if let Some(previous) = inner.orders.get(&order.id) {
            if previous.product_id != order.product_id {
                if let Some(set) = inner.by_product.get_mut(&previous.product_id) {
                    set.remove(&order.id);
                }
            }
        }
        inner
            .by_product
            .entry(order.product_id.clone())
            .or_default()
            .insert(order.id);
        inner.orders.insert(order.id, order);
    }

    pub async fn get(&self, order_id: Uuid) -> Option<Order> {
        let inner = self.inner.read().await;
        inner.orders.get(&order_id).cloned()
    }

    /// Updates only the status of a cached order, if present. Returns the
    /// updated order, or `None` if it was not cached.
    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Option<Order> {
        let mut inner = self.inner.write().await;
        let order = inner.orders.get_mut(&order_id)?;
        order.status = status;
        Some(order.clone())
    }

    /// Applies an arbitrary in-place mutation to a cached order.
    pub async fn mutate<F>(&self, order_id: Uuid, f: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let mut inner = self.inner.write().await;
        let order = inner.orders.get_mut(&order_id)?;
        f(order);
        Some(order.clone())
    }

    pub async fn remove(&self, order_id: Uuid) -> Option<Order> {
        let mut inner = self.inner.write().await;
        let order = inner.orders.remove(&order_id)?;
        if let Some(set) = inner.by_product.get_mut(&order.product_id) {
            set.remove(&order_id);
        }
        Some(order)
    }

    pub async fn by_product(&self, product_id: &str) -> Vec<Order> {
        let inner = self.inner.read().await;
        inner
            .by_product
            .get(product_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.orders.get(id).cloned())
            .collect()
    }

    pub async fn expired(&self) -> Vec<Order> {
        let inner = self.inner.read().await;
        inner.orders.values().filter(|o| o.is_expired()).cloned().collect()
    }

    pub async fn pending(&self) -> Vec<Order> {
        let inner = self.inner.read().await;
        inner.orders.values().filter(|o| o.is_pending()).cloned().collect()
    }

    /// Alias for `pending()` in the current spec.
    pub async fn active(&self) -> Vec<Order> {
        self.pending().await
    }

    pub async fn all(&self) -> Vec<Order> {
        let inner = self.inner.read().await;
        inner.orders.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn order(product_id: &str) -> Order {
        Order {
            id: Uuid::new_v4(),
            product_id: product_id.to_string(),
            user_info: None,
            created_at: Utc::now(),
            expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
            status: OrderStatus::Created,
            server_order_id: None,
            amount: None,
            currency: None,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn by_product_returns_only_matching_orders() {
        let cache = OrderCache::new();
        let a = order("p.a");
        let b = order("p.b");
        cache.store(a.clone()).await;
        cache.store(b.clone()).await;

        let found = cache.by_product("p.a").await;
        assert_eq!(found, vec![a]);
    }

    #[tokio::test]
    async fn expired_reflects_expiry_timestamp() {
        let cache = OrderCache::new();
        let mut expired = order("p.a");
        expired.expires_at = Some(Utc::now() - ChronoDuration::seconds(1));
        cache.store(expired.clone()).await;

        let found = cache.expired().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, expired.id);
    }

    #[tokio::test]
    async fn pending_excludes_terminal_and_expired() {
        let cache = OrderCache::new();
        let pending = order("p.a");
        let mut completed = order("p.b");
        completed.status = OrderStatus::Completed;
        let mut expired = order("p.c");
        expired.expires_at = Some(Utc::now() - ChronoDuration::seconds(1));

        cache.store(pending.clone()).await;
        cache.store(completed).await;
        cache.store(expired).await;

        let found = cache.pending().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, pending.id);
    }

    #[tokio::test]
    async fn remove_drops_from_product_index() {
        let cache = OrderCache::new();
        let o = order("p.a");
        cache.store(o.clone()).await;
        cache.remove(o.id).await;

        assert!(cache.get(o.id).await.is_none());
        assert!(cache.by_product("p.a").await.is_empty());
    }

    #[tokio::test]
    async fn update_status_mutates_in_place() {
        let cache = OrderCache::new();
        let o = order("p.a");
        cache.store(o.clone()).await;

        let updated = cache.update_status(o.id, OrderStatus::Pending).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Pending);
    }
}
