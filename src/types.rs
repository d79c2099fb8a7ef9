//! Core data model: products, orders, transactions, and the results the
//! public API hands back to callers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque caller-supplied key/value map, stringified at the wire boundary.
/// Richer shapes are the caller's responsibility to serialize themselves.
pub type UserInfo = HashMap<String, String>;

/// A sellable item as reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub price: Decimal,
    pub price_locale: String,
    pub localized_price: String,
    pub product_type: ProductType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_info: Option<SubscriptionInfo>,
}

impl Product {
    /// `id` non-empty and `price >= 0`; subscription fields present iff the
    /// product type is subscription-like.
    pub fn validate(&self) -> Result<(), crate::error::IapError> {
        if self.id.trim().is_empty() {
            return Err(crate::error::IapError::ProductNotAvailable(
                "empty product id".into(),
            ));
        }
        if self.price < Decimal::ZERO {
            return Err(crate::error::IapError::ProductNotAvailable(format!(
                "negative price for {}",
                self.id
            )));
        }
        let is_subscription = matches!(
            self.product_type,
            ProductType::AutoRenewableSubscription | ProductType::NonRenewingSubscription
        );
        if is_subscription != self.subscription_info.is_some() {
            return Err(crate::error::IapError::ProductNotAvailable(format!(
                "subscription_info presence mismatch for {}",
                self.id
            )));
        }
        Ok(())
    }

    pub fn is_subscription(&self) -> bool {
        matches!(
            self.product_type,
            ProductType::AutoRenewableSubscription | ProductType::NonRenewingSubscription
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Consumable,
    NonConsumable,
    AutoRenewableSubscription,
    NonRenewingSubscription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub group_id: String,
    pub period: SubscriptionPeriod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introductory_price: Option<Decimal>,
    #[serde(default)]
    pub promotional_offers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPeriod {
    pub unit: SubscriptionPeriodUnit,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

/// The server-authoritative intent to buy. Mutated only by the Order
/// Service: server write first, then local mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Order {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| Utc::now() > exp).unwrap_or(false)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, OrderStatus::Created | OrderStatus::Pending) && !self.is_expired()
    }

    /// Whether `next` is a legal transition from the current status, per
    /// the monotone status DAG:
    /// `created -> {pending, cancelled, failed}`,
    /// `pending -> {completed, cancelled, failed}`, terminals absorbing.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self.status, next) {
            (a, b) if a == b => true,
            (Created, Pending | Cancelled | Failed) => true,
            (Pending, Completed | Cancelled | Failed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Pending,
    Completed,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed)
    }
}

/// One attempt/outcome from the payment provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub product_id: String,
    pub purchase_date: DateTime<Utc>,
    pub state: TransactionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_data: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<String>,
}

pub(crate) fn default_quantity() -> u32 {
    1
}

impl Transaction {
    /// Terminal provider states that must eventually be `finish`ed exactly
    /// once (or re-delivered on next startup).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Purchased | TransactionState::Failed { .. } | TransactionState::Restored
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransactionState {
    Purchasing,
    Purchased,
    Failed { error: String },
    Restored,
    Deferred,
}

/// What `ProviderAdapter::purchase` hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    Success(Transaction),
    Pending(Transaction),
    Cancelled,
    Failed(crate::error::IapError),
}

/// The public result of `IapManager::purchase`.
#[derive(Debug, Clone)]
pub enum PurchaseResult {
    Success(Transaction, Order),
    Pending(Transaction, Order),
    Cancelled(Option<Order>),
    Failed(crate::error::IapError, Option<Order>),
}

/// Result of validating receipt bytes, with or without an order binding.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub transactions: Vec<Transaction>,
    pub error: Option<String>,
    pub receipt_creation_date: Option<DateTime<Utc>>,
    pub app_version: Option<String>,
    pub original_app_version: Option<String>,
    pub environment: Option<ReceiptEnvironment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptEnvironment {
    Production,
    Sandbox,
}

/// Aggregate counters exposed through `IapManager::stats()`.
#[derive(Debug, Clone, Default)]
pub struct PurchaseStats {
    pub total_attempted: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
}
