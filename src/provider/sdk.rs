//! The low-level binding each concrete platform SDK adapter wraps. Its
//! internal mechanics (how it actually talks to the store) are out of scope
//! for this core per spec.md §1 — this trait is the seam an embedding
//! application implements once per platform.

use async_trait::async_trait;

use crate::error::IapError;
use crate::types::{Product, PurchaseOutcome, Transaction};

#[async_trait]
pub trait RawProviderClient: Send + Sync {
    async fn load_products(&self, ids: &[String]) -> Result<Vec<Product>, IapError>;
    async fn purchase(&self, product: &Product, app_account_token: Option<&str>) -> PurchaseOutcome;
    async fn restore_purchases(&self) -> Result<Vec<Transaction>, IapError>;
    async fn pending_transactions(&self) -> Result<Vec<Transaction>, IapError>;
    async fn finish(&self, transaction: &Transaction) -> Result<(), IapError>;
}
