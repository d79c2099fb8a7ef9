//! Wraps `ProviderAdapter::load_products` with the Product Cache, id
//! validation, and sort/filter helpers over the cached catalog.

use std::sync::Arc;

use crate::cache::ProductCache;
use crate::error::IapError;
use crate::provider::ProviderAdapter;
use crate::types::{Product, ProductType};

pub struct ProductService {
    adapter: Arc<dyn ProviderAdapter>,
    cache: ProductCache,
}

impl ProductService {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, cache: ProductCache) -> Self {
        Self { adapter, cache }
    }

    /// Validates and dedups `ids`, serves what's cached, and fetches the
    /// remainder from the adapter, caching the result.
    #[tracing::instrument(skip(self, ids))]
    pub async fn load_products(&self, ids: &[String]) -> Result<Vec<Product>, IapError> {
        let mut seen = std::collections::HashSet::new();
        let ids: Vec<String> = ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut products = self.cache.get_cached(&ids).await;
        let missing = self.cache.uncached(&ids).await;
        if !missing.is_empty() {
            let fetched = self.adapter.load_products(&missing).await?;
            for product in &fetched {
                product.validate()?;
            }
            self.cache.insert_all(fetched.clone()).await;
            products.extend(fetched);
        }
        Ok(products)
    }

    pub fn sorted_by_price(mut products: Vec<Product>) -> Vec<Product> {
        products.sort_by(|a, b| a.price.cmp(&b.price));
        products
    }

    pub fn filter_by_type(products: Vec<Product>, product_type: ProductType) -> Vec<Product> {
        products.into_iter().filter(|p| p.product_type == product_type).collect()
    }

    pub fn cache(&self) -> &ProductCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProviderAdapter;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: id.into(),
            display_name: id.into(),
            description: String::new(),
            price: Decimal::new(price, 0),
            price_locale: "en_US".into(),
            localized_price: format!("${price}.00"),
            product_type: ProductType::Consumable,
            subscription_info: None,
        }
    }

    #[tokio::test]
    async fn load_products_dedups_and_serves_cache() {
        let adapter = Arc::new(MockProviderAdapter::new());
        adapter.set_products(vec![product("p.a", 1)]).await;
        let service = ProductService::new(adapter.clone(), ProductCache::new(Duration::from_secs(60)));

        let first = service.load_products(&["p.a".into(), "p.a".into(), "".into()]).await.unwrap();
        assert_eq!(first.len(), 1);

        adapter.set_products(vec![]).await;
        let second = service.load_products(&["p.a".into()]).await.unwrap();
        assert_eq!(second.len(), 1, "second call should be served from cache, not the now-empty adapter");
    }

    #[tokio::test]
    async fn sorted_by_price_orders_ascending() {
        let products = vec![product("p.b", 10), product("p.a", 1)];
        let sorted = ProductService::sorted_by_price(products);
        assert_eq!(sorted[0].id, "p.a");
    }

    #[tokio::test]
    async fn empty_id_list_short_circuits_without_touching_adapter() {
        let adapter = Arc::new(MockProviderAdapter::new());
        let service = ProductService::new(adapter, ProductCache::new(Duration::from_secs(60)));
        let products = service.load_products(&[]).await.unwrap();
        assert!(products.is_empty());
    }
}
