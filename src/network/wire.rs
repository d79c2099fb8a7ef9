//! Wire payload shapes for the six order actions. Dates are ISO 8601,
//! numeric amounts are transported as strings — both normative per the
//! merchant backend's RPC contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserInfo;

/// The six well-known RPC actions the Network Client exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderAction {
    CreateOrder,
    QueryOrderStatus,
    UpdateOrderStatus,
    CancelOrder,
    CleanupExpiredOrders,
    RecoverPendingOrders,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::CreateOrder => "create_order",
            OrderAction::QueryOrderStatus => "query_order_status",
            OrderAction::UpdateOrderStatus => "update_order_status",
            OrderAction::CancelOrder => "cancel_order",
            OrderAction::CleanupExpiredOrders => "cleanup_expired_orders",
            OrderAction::RecoverPendingOrders => "recover_pending_orders",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub local_order_id: String,
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// The client-generated order id, embedded so the payment provider's
    /// opaque per-purchase metadata can carry it back on the transaction —
    /// the explicit-binding strategy spec.md prefers over time-window
    /// matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub server_order_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}
