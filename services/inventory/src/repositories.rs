//! Repositories for the item catalog and the inventory ledger
//!
//! Every stock change goes through [`TransactionRepository`], which applies the
//! stock update and the ledger append as one unit. Stock is only ever changed
//! with a conditional update, so two writers racing for the last unit cannot
//! both win.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use crate::models::{
    Item, ItemQuery, KindActivity, NewItem, NewTransaction, Recorded, RentalClosed, Transaction,
    TransactionFilter, TransactionKind,
};

pub mod item;
pub mod memory;
pub mod transaction;

pub use item::PgItemRepository;
pub use memory::MemoryInventoryStore;
pub use transaction::PgTransactionRepository;

/// Page size used when a listing does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 50;

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn create(&self, item: &NewItem, at: DateTime<Utc>) -> Result<Item>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Item>>;
    /// Ordered by name
    async fn list(&self, query: &ItemQuery) -> Result<Vec<Item>>;
    /// Items with `stock <= threshold`, lowest stock first
    async fn low_stock(&self, threshold: i32) -> Result<Vec<Item>>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Take `entry.qty` units out of stock and append `entry`
    ///
    /// Returns `None`, changing nothing, when the item does not exist or holds
    /// fewer than `entry.qty` units.
    async fn withdraw(&self, entry: &NewTransaction) -> Result<Option<Recorded>>;

    /// Put `entry.qty` units into stock and append `entry`; `None` if the
    /// item does not exist
    async fn deposit(&self, entry: &NewTransaction) -> Result<Option<Recorded>>;

    /// Mark an open rental returned, restore its quantity and append a
    /// `return` entry
    ///
    /// Returns `None`, changing nothing, unless `rental_id` is a `rent` entry
    /// that has not been returned yet.
    async fn close_rental(&self, rental_id: i64, at: DateTime<Utc>)
    -> Result<Option<RentalClosed>>;

    /// Flag an open rental as having an extension request; `None` if it is
    /// not an open rental
    async fn request_extension(&self, rental_id: i64, days: i32) -> Result<Option<Transaction>>;

    /// Move the due date of an open rental by `days`; `None` if it is not an
    /// open rental
    async fn approve_extension(
        &self,
        rental_id: i64,
        days: i32,
        at: DateTime<Utc>,
    ) -> Result<Option<Transaction>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Transaction>>;
    async fn oldest_open_rental(&self, item_id: i64) -> Result<Option<Transaction>>;
    async fn count_open_rentals(&self, item_id: i64) -> Result<i64>;
    /// Every rental not yet returned, earliest due date first
    async fn open_rentals(&self) -> Result<Vec<Transaction>>;
    /// Open rentals due strictly before `today`, earliest due date first
    async fn overdue(&self, today: NaiveDate) -> Result<Vec<Transaction>>;
    /// Newest first
    async fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;
    /// Entries of `kind` written at or after `since`
    async fn activity(&self, kind: TransactionKind, since: DateTime<Utc>) -> Result<KindActivity>;
}

/// The inventory repositories as trait objects
#[derive(Clone)]
pub struct InventoryRepositories {
    pub items: Arc<dyn ItemRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
}

impl InventoryRepositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            items: Arc::new(PgItemRepository::new(pool.clone())),
            transactions: Arc::new(PgTransactionRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_memory(MemoryInventoryStore::new())
    }

    pub fn from_memory(store: MemoryInventoryStore) -> Self {
        Self {
            items: Arc::new(store.clone()),
            transactions: Arc::new(store),
        }
    }
}

pub(crate) fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(DEFAULT_PAGE_SIZE * 10);
    (limit, offset.unwrap_or(0).max(0))
}
