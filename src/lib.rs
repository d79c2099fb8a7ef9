//! Client-side in-app-purchase orchestration core: order/transaction state
//! machine, retries, recovery, and receipt validation, decoupled from any
//! one platform's payment SDK behind the [`provider::ProviderAdapter`] trait.

mod cache;
mod config;
mod error;
mod handlers;
mod manager;
mod network;
mod provider;
mod retry;
mod services;
mod types;
mod validator;

pub use config::{Configuration, ConfigurationBuilder, NetworkConfig, ReceiptValidationConfig, ValidationMode};
pub use error::{IapError, IapResult};
pub use handlers::{Handlers, OrderHandler, TransactionHandler};
pub use manager::{IapManager, IapManagerBuilder};
pub use network::{
    CreateOrderRequest, CreateOrderResponse, EndpointBuilder, HttpMethod, HttpRequest, HttpResponse,
    OrderAction, OrderStatusResponse, RequestBuilder, RequestExecutor, ResponseParser,
};
pub use provider::mock;
pub use provider::{ProviderAdapter, ProviderAdapterHandle, QueueAdapter, RawProviderClient, StreamAdapter, TransactionUpdateHandler};
pub use services::{OrderService, ProductService, PurchaseService, RecoveryManager, RecoveryOutcome, TransactionMonitor};
pub use types::{
    Order, OrderStatus, Product, ProductType, PurchaseOutcome, PurchaseResult, PurchaseStats,
    ReceiptEnvironment, SubscriptionInfo, SubscriptionPeriod, SubscriptionPeriodUnit,
    Transaction, TransactionState, UserInfo, ValidationResult,
};
pub use validator::ReceiptValidator;
