//! Strategy over {local, remote, local-then-remote} receipt validation.

mod local;
mod remote;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::config::{ReceiptValidationConfig, ValidationMode};
use crate::error::IapError;
use crate::types::{Order, ValidationResult};

pub use local::validate_local;
pub use remote::validate_remote;

struct CachedResult {
    result: ValidationResult,
    inserted_at: Instant,
}

/// Validates receipt bytes, optionally bound to an order, per the
/// configured mode. Successful remote results are cached by content hash
/// for `receipt_validation.cache_expiration`.
pub struct ReceiptValidator {
    config: ReceiptValidationConfig,
    http: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, CachedResult>>>,
}

impl ReceiptValidator {
    pub fn new(config: ReceiptValidationConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validates receipt bytes with no order binding (used by the restore
    /// flow's basic validation pass).
    pub async fn validate(&self, receipt_data: &[u8]) -> Result<ValidationResult, IapError> {
        self.validate_inner(receipt_data, None).await
    }

    /// Validates receipt bytes against a specific order.
    pub async fn validate_for_order(
        &self,
        receipt_data: &[u8],
        order: &Order,
    ) -> Result<ValidationResult, IapError> {
        let result = self.validate_inner(receipt_data, Some(order)).await?;
        if !result.is_valid {
            return Ok(result);
        }
        check_order_binding(&result, order)?;
        Ok(result)
    }

    async fn validate_inner(
        &self,
        receipt_data: &[u8],
        order: Option<&Order>,
    ) -> Result<ValidationResult, IapError> {
        match self.config.mode {
            ValidationMode::Local => local::validate_local(receipt_data, order, &self.config),
            ValidationMode::Remote => self.validate_remote_cached(receipt_data, order).await,
            ValidationMode::LocalThenRemote => {
                let local_result = local::validate_local(receipt_data, order, &self.config);
                // Local alone can satisfy an unbound check, but never an
                // order-bound one (it has no parser to pull real
                // transactions out of the receipt, so `check_order_binding`
                // can never find a matching product) — fall through to
                // remote whenever the order-bound check doesn't pass, not
                // just when local reports outright invalid.
                let local_satisfies = match (&local_result, order) {
                    (Ok(result), Some(order)) => result.is_valid && check_order_binding(result, order).is_ok(),
                    (Ok(result), None) => result.is_valid,
                    (Err(_), _) => false,
                };
                if local_satisfies {
                    local_result
                } else {
                    self.validate_remote_cached(receipt_data, order).await
                }
            }
        }
    }

    async fn validate_remote_cached(
        &self,
        receipt_data: &[u8],
        order: Option<&Order>,
    ) -> Result<ValidationResult, IapError> {
        let key = cache_key(receipt_data, order);

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key) {
                if cached.inserted_at.elapsed() <= self.config.cache_expiration {
                    return Ok(cached.result.clone());
                }
            }
        }

        let result = remote::validate_remote(&self.http, receipt_data, order, &self.config).await?;

        if result.is_valid {
            let mut cache = self.cache.write().await;
            cache.insert(
                key,
                CachedResult {
                    result: result.clone(),
                    inserted_at: Instant::now(),
                },
            );
        }
        Ok(result)
    }
}

fn cache_key(receipt_data: &[u8], order: Option<&Order>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(receipt_data);
    if let Some(order) = order {
        hasher.update(order.id.as_bytes());
        hasher.update(order.product_id.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Order-bound validation rules shared by both local and remote paths:
/// the order must not be expired or already completed, the receipt must
/// contain a transaction for the same product, the receipt's creation date
/// must fall within `[order.created_at - 60s, order.expires_at]`, and a
/// server-supplied `server_order_id` must agree with the order's.
fn check_order_binding(result: &ValidationResult, order: &Order) -> Result<(), IapError> {
    if order.is_expired() {
        return Err(IapError::OrderExpired);
    }
    if order.status == crate::types::OrderStatus::Completed {
        return Err(IapError::OrderAlreadyCompleted);
    }
    let has_matching_product = result.transactions.iter().any(|t| t.product_id == order.product_id);
    if !has_matching_product {
        return Err(IapError::OrderValidationFailed(format!(
            "no transaction for product {} in receipt",
            order.product_id
        )));
    }
    if let Some(creation_date) = result.receipt_creation_date {
        if creation_date < order.created_at - chrono::Duration::seconds(60) {
            return Err(IapError::OrderValidationFailed(
                "receipt predates order by more than 60s".into(),
            ));
        }
        if let Some(expires_at) = order.expires_at {
            if creation_date > expires_at {
                return Err(IapError::OrderValidationFailed(
                    "receipt postdates order expiry".into(),
                ));
            }
        }
    }
    Ok(())
}
