//! Unified error taxonomy for the purchase orchestration core.
//!
//! One variant per error kind named in the core's error table. Unlike the
//! merchant backend's own numeric error-code registry, this type models only
//! the core's side of the boundary — see [`IapError::is_retryable`] for the
//! single place retryability is decided.

use thiserror::Error;

/// Errors surfaced by any component of the purchase orchestration core.
#[derive(Debug, Clone, Error)]
pub enum IapError {
    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("product not available: {0}")]
    ProductNotAvailable(String),

    #[error("purchase cancelled by user")]
    PurchaseCancelled,

    #[error("purchase failed: {0}")]
    PurchaseFailed(String),

    #[error("payment not allowed on this device")]
    PaymentNotAllowed,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("a purchase is already in progress for this product")]
    TransactionProcessingFailed,

    #[error("invalid receipt data")]
    InvalidReceiptData,

    #[error("receipt validation failed: {0}")]
    ReceiptValidationFailed(String),

    #[error("server receipt validation failed with status {0}")]
    ServerValidationFailed(i64),

    #[error("order creation failed: {0}")]
    OrderCreationFailed(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("order has expired")]
    OrderExpired,

    #[error("order already completed")]
    OrderAlreadyCompleted,

    #[error("order validation failed: {0}")]
    OrderValidationFailed(String),

    #[error("server and client disagree on server_order_id")]
    ServerOrderMismatch,

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("request timed out")]
    Timeout,

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("payment provider error: {0}")]
    StorekitError(String),

    #[error("unknown error: {0}")]
    UnknownError(String),
}

impl IapError {
    /// The Network Client's single source of truth for which errors are
    /// worth retrying. Kept as one method so retry call sites never diverge
    /// on what "retryable" means.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IapError::NetworkError(_) | IapError::Timeout)
    }
}

impl From<reqwest::Error> for IapError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            IapError::Timeout
        } else {
            IapError::NetworkError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for IapError {
    fn from(e: serde_json::Error) -> Self {
        IapError::ConfigurationError(format!("serialization error: {e}"))
    }
}

pub type IapResult<T> = Result<T, IapError>;
