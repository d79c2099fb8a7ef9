//! Variant abstraction over the two payment-provider SDK shapes (a
//! transaction-stream API and a legacy observer-queue API), behind one
//! capability trait — mirroring `crab_client::client::crab_client`'s two
//! concrete backends (`RemoteMode`/`LocalMode`) behind one typed front door.

mod handle;
pub mod mock;
mod queue;
mod sdk;
mod stream;

pub use handle::ProviderAdapterHandle;
pub use queue::QueueAdapter;
pub use sdk::RawProviderClient;
pub use stream::StreamAdapter;

use async_trait::async_trait;

use crate::error::IapError;
use crate::types::{Product, PurchaseOutcome, Transaction};

/// A boxed callback invoked whenever the provider reports a transaction
/// update. Stored, not called back into a UI reference — a one-way fan-out
/// sink, never a cyclic back-reference.
pub type TransactionUpdateHandler = Box<dyn Fn(Transaction) + Send + Sync>;

/// The capability surface both provider variants expose. Error codes from
/// the underlying SDK are normalized to [`IapError`] inside each
/// implementation, not at the call site.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn load_products(&self, ids: &[String]) -> Result<Vec<Product>, IapError>;

    /// `app_account_token` is the synchronous-association fast path: callers
    /// pass the order id so an implementation that can thread it through to
    /// the underlying SDK (and back onto `Transaction.app_account_token`)
    /// lets the Transaction Monitor associate the update without waiting on
    /// the time-window fallback.
    async fn purchase(&self, product: &Product, app_account_token: Option<&str>) -> PurchaseOutcome;

    async fn restore_purchases(&self) -> Result<Vec<Transaction>, IapError>;

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, IapError>;

    async fn finish(&self, transaction: &Transaction) -> Result<(), IapError>;

    async fn start_observer(&self);

    async fn stop_observer(&self);

    /// Registers the handler invoked for every transaction update delivered
    /// by the underlying SDK. Replaces any previously registered handler.
    async fn set_transaction_update_handler(&self, handler: TransactionUpdateHandler);
}
