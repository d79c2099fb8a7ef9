//! The L2/L3 orchestration layer: Order Service, Product Service, Purchase
//! Service, Transaction Monitor, and Recovery Manager, composed from the
//! L0/L1 components in `crate::{cache, network, provider, validator,
//! retry}`.

mod order_service;
mod product_service;
mod purchase_service;
mod recovery_manager;
mod transaction_monitor;

pub use order_service::OrderService;
pub use product_service::ProductService;
pub use purchase_service::PurchaseService;
pub use recovery_manager::{RecoveryOutcome, RecoveryManager};
pub use transaction_monitor::TransactionMonitor;
