//! TTL-indexed product-id -> `Product` cache with partial lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::types::Product;

struct CacheEntry {
    value: Product,
    inserted_at: Instant,
}

#[derive(Clone)]
pub struct ProductCache {
    ttl: Duration,
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl ProductCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert_all(&self, products: impl IntoIterator<Item = Product>) {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        for product in products {
            inner.insert(
                product.id.clone(),
                CacheEntry {
                    value: product,
                    inserted_at: now,
                },
            );
        }
    }

    /// Returns the cached products among `ids`, evicting any expired entries
    /// encountered along the way.
    pub async fn get_cached(&self, ids: &[String]) -> Vec<Product> {
        let mut inner = self.inner.write().await;
        let mut result = Vec::new();
        for id in ids {
            let expired = inner
                .get(id)
                .map(|entry| entry.inserted_at.elapsed() > self.ttl)
                .unwrap_or(false);
            if expired {
                inner.remove(id);
                continue;
            }
            if let Some(entry) = inner.get(id) {
                result.push(entry.value.clone());
            }
        }
        result
    }

    /// The subset of `ids` that are not (validly) cached.
    pub async fn uncached(&self, ids: &[String]) -> Vec<String> {
        let cached = self.get_cached(ids).await;
        let cached_ids: std::collections::HashSet<_> = cached.iter().map(|p| p.id.clone()).collect();
        ids.iter().filter(|id| !cached_ids.contains(*id)).cloned().collect()
    }

    /// Eagerly evicts every expired entry.
    pub async fn clean_expired(&self) {
        let mut inner = self.inner.write().await;
        inner.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
    }
}
