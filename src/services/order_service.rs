//! Owns order lifecycle: local-then-server creation, server-mirrored status,
//! degraded reads, expiry cleanup, and startup recovery.

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::cache::OrderCache;
use crate::error::IapError;
use crate::network::{CreateOrderRequest, NetworkClient};
use crate::types::{Order, OrderStatus, Product, UserInfo};

pub struct OrderService {
    network: NetworkClient,
    cache: OrderCache,
}

impl OrderService {
    pub fn new(network: NetworkClient, cache: OrderCache) -> Self {
        Self { network, cache }
    }

    /// Generates the local order, caches it, then round-trips it through the
    /// server. On RPC failure the cached order is marked `failed` and the
    /// failure is propagated — the local order still exists in cache so the
    /// caller can inspect it via `get`.
    #[tracing::instrument(skip(self, product, user_info), fields(product_id = %product.id))]
    pub async fn create_order(
        &self,
        product: &Product,
        user_info: Option<UserInfo>,
    ) -> Result<Order, IapError> {
        let now = Utc::now();
        let user_id = user_info.as_ref().and_then(|m| m.get("userID").cloned());
        let mut order = Order {
            id: Uuid::new_v4(),
            product_id: product.id.clone(),
            user_info,
            created_at: now,
            expires_at: Some(now + ChronoDuration::hours(1)),
            status: OrderStatus::Created,
            server_order_id: None,
            amount: Some(product.price),
            // The core has no locale->currency table; the price locale string
            // is carried through as-is, matching what the server already
            // derives it from on its side.
            currency: Some(product.price_locale.clone()),
            user_id,
        };
        self.cache.store(order.clone()).await;

        let request = CreateOrderRequest {
            local_order_id: order.id.to_string(),
            product_id: order.product_id.clone(),
            user_info: order.user_info.clone(),
            created_at: order.created_at,
            amount: order.amount.map(|a| a.to_string()),
            currency: order.currency.clone(),
            user_id: order.user_id.clone(),
            app_account_token: Some(order.id.to_string()),
        };

        match self.network.create_order(request).await {
            Ok(response) => {
                order.server_order_id = Some(response.server_order_id);
                order.status = parse_order_status(&response.status);
                if response.expires_at.is_some() {
                    order.expires_at = response.expires_at;
                }
                self.cache.store(order.clone()).await;
                Ok(order)
            }
            Err(err) => {
                self.cache.update_status(order.id, OrderStatus::Failed).await;
                tracing::warn!(order_id = %order.id, error = %err, "order creation failed");
                Err(IapError::OrderCreationFailed(err.to_string()))
            }
        }
    }

    /// Cached-terminal fast path; otherwise queries the server and mirrors
    /// the result. On transport failure, degrades to the cached value if one
    /// exists.
    #[tracing::instrument(skip(self))]
    pub async fn query_order_status(&self, order_id: Uuid) -> Result<OrderStatus, IapError> {
        let cached = self.cache.get(order_id).await;
        if let Some(order) = &cached {
            if order.is_terminal() {
                return Ok(order.status);
            }
        }

        let server_order_id = cached
            .as_ref()
            .and_then(|o| o.server_order_id.clone())
            .ok_or_else(|| IapError::OrderNotFound(order_id.to_string()))?;

        match self.network.query_order_status(&server_order_id).await {
            Ok(response) => {
                let status = parse_order_status(&response.status);
                self.cache
                    .mutate(order_id, |o| {
                        o.status = status;
                        if let Some(expires_at) = response.expires_at {
                            o.expires_at = Some(expires_at);
                        }
                    })
                    .await;
                Ok(status)
            }
            Err(err) => {
                if let Some(order) = cached {
                    tracing::warn!(order_id = %order_id, error = %err, "degraded read: returning cached order status");
                    Ok(order.status)
                } else {
                    Err(IapError::OrderNotFound(order_id.to_string()))
                }
            }
        }
    }

    /// PUTs the new status to the server first; the cache is only mutated on
    /// success, so a failed write leaves the cache exactly as it was.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order, IapError> {
        let order = self
            .cache
            .get(order_id)
            .await
            .ok_or_else(|| IapError::OrderNotFound(order_id.to_string()))?;
        let server_order_id = order
            .server_order_id
            .clone()
            .ok_or_else(|| IapError::OrderNotFound(order_id.to_string()))?;

        let wire_status = render_order_status(status);
        self.network.update_order_status(&server_order_id, wire_status).await?;

        let updated = self
            .cache
            .mutate(order_id, |o| o.status = status)
            .await
            .ok_or_else(|| IapError::OrderNotFound(order_id.to_string()))?;
        Ok(updated)
    }

    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order, IapError> {
        self.update_order_status(order_id, OrderStatus::Cancelled).await
    }

    /// Best-effort cancel-then-drop over every expired cached order. A
    /// failure on one order is logged and does not abort the sweep.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_expired_orders(&self) {
        for order in self.cache.expired().await {
            if !order.is_terminal() {
                if let Err(err) = self.cancel_order(order.id).await {
                    tracing::warn!(order_id = %order.id, error = %err, "failed to cancel expired order");
                }
            }
            self.cache.remove(order.id).await;
        }
    }

    /// Re-queries every pending cached order; orders whose server view
    /// differs from the cached one are updated and returned.
    #[tracing::instrument(skip(self))]
    pub async fn recover_pending_orders(&self) -> Vec<Order> {
        let mut reconciled = Vec::new();
        for order in self.cache.pending().await {
            let previous_status = order.status;
            match self.query_order_status(order.id).await {
                Ok(status) if status != previous_status => {
                    if let Some(updated) = self.cache.get(order.id).await {
                        reconciled.push(updated);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(order_id = %order.id, error = %err, "failed to recover pending order");
                }
            }
        }
        reconciled
    }

    pub fn cache(&self) -> &OrderCache {
        &self.cache
    }
}

fn parse_order_status(status: &str) -> OrderStatus {
    match status {
        "created" => OrderStatus::Created,
        "pending" => OrderStatus::Pending,
        "completed" => OrderStatus::Completed,
        "cancelled" => OrderStatus::Cancelled,
        "failed" => OrderStatus::Failed,
        other => {
            tracing::warn!(status = other, "unrecognized order status from server; treating as pending");
            OrderStatus::Pending
        }
    }
}

fn render_order_status(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Created => "created",
        OrderStatus::Pending => "pending",
        OrderStatus::Completed => "completed",
        OrderStatus::Cancelled => "cancelled",
        OrderStatus::Failed => "failed",
    }
}
