//! In-memory catalog and ledger
//!
//! Items and transactions share one mutex, so every stock movement and its
//! ledger entry land together, like the PostgreSQL transaction.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{ItemRepository, TransactionRepository, page};
use crate::models::{
    Item, ItemQuery, KindActivity, NewItem, NewTransaction, Recorded, RentalClosed, Transaction,
    TransactionFilter, TransactionKind,
};

#[derive(Default)]
struct Tables {
    items: BTreeMap<i64, Item>,
    transactions: BTreeMap<i64, Transaction>,
    next_item_id: i64,
    next_transaction_id: i64,
}

impl Tables {
    fn append(&mut self, entry: &NewTransaction) -> Transaction {
        self.next_transaction_id += 1;
        let transaction = Transaction {
            id: self.next_transaction_id,
            user_id: entry.user_id,
            item_id: entry.item_id,
            kind: entry.kind,
            qty: entry.qty,
            timestamp: entry.timestamp,
            rent_days: entry.rental.map(|terms| terms.days),
            rent_start_date: entry.rental.map(|terms| terms.start_date),
            rent_due_date: entry.rental.map(|terms| terms.due_date),
            returned: false,
            return_date: None,
            extension_requested: false,
            extension_days: None,
            extension_approved: false,
            extension_approved_at: None,
        };
        self.transactions
            .insert(transaction.id, transaction.clone());
        transaction
    }

    fn open_rental_mut(&mut self, id: i64) -> Option<&mut Transaction> {
        self.transactions
            .get_mut(&id)
            .filter(|transaction| transaction.is_open_rental())
    }
}

/// Shared in-memory inventory tables; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryInventoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ledger entry, oldest first
    pub async fn transactions(&self) -> Vec<Transaction> {
        self.tables
            .lock()
            .await
            .transactions
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ItemRepository for MemoryInventoryStore {
    async fn create(&self, item: &NewItem, at: DateTime<Utc>) -> Result<Item> {
        let mut tables = self.tables.lock().await;
        tables.next_item_id += 1;
        let created = Item {
            id: tables.next_item_id,
            name: item.name.clone(),
            description: item.description.clone(),
            category: item.category.clone(),
            price: item.price,
            stock: item.stock,
            rentable: item.rentable,
            image_filename: item.image_filename.clone(),
            created_at: at,
        };
        tables.items.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Item>> {
        Ok(self.tables.lock().await.items.get(&id).cloned())
    }

    async fn list(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        let (limit, offset) = page(query.limit, query.offset);
        let tables = self.tables.lock().await;
        let mut items: Vec<Item> = tables
            .items
            .values()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn low_stock(&self, threshold: i32) -> Result<Vec<Item>> {
        let tables = self.tables.lock().await;
        let mut items: Vec<Item> = tables
            .items
            .values()
            .filter(|item| item.is_low_stock(threshold))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.stock.cmp(&b.stock).then(a.name.cmp(&b.name)));
        Ok(items)
    }
}

#[async_trait]
impl TransactionRepository for MemoryInventoryStore {
    async fn withdraw(&self, entry: &NewTransaction) -> Result<Option<Recorded>> {
        let mut tables = self.tables.lock().await;
        let item = match tables.items.get_mut(&entry.item_id) {
            Some(item) if item.stock >= entry.qty => {
                item.stock -= entry.qty;
                item.clone()
            }
            _ => return Ok(None),
        };
        let transaction = tables.append(entry);
        Ok(Some(Recorded { item, transaction }))
    }

    async fn deposit(&self, entry: &NewTransaction) -> Result<Option<Recorded>> {
        let mut tables = self.tables.lock().await;
        let item = match tables.items.get_mut(&entry.item_id) {
            Some(item) => match item.stock.checked_add(entry.qty) {
                Some(stock) => {
                    item.stock = stock;
                    item.clone()
                }
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        let transaction = tables.append(entry);
        Ok(Some(Recorded { item, transaction }))
    }

    async fn close_rental(
        &self,
        rental_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<RentalClosed>> {
        let mut tables = self.tables.lock().await;
        let Some(rental) = tables.open_rental_mut(rental_id) else {
            return Ok(None);
        };
        let (item_id, qty) = (rental.item_id, rental.qty);
        let restored = tables
            .items
            .get(&item_id)
            .ok_or_else(|| anyhow!("Rental {rental_id} references missing item {item_id}"))?
            .stock
            .checked_add(qty)
            .ok_or_else(|| anyhow!("Returning rental {rental_id} overflows item {item_id} stock"))?;

        let rental = tables
            .open_rental_mut(rental_id)
            .map(|rental| {
                rental.returned = true;
                rental.return_date = Some(at);
                rental.clone()
            })
            .ok_or_else(|| anyhow!("Rental {rental_id} vanished"))?;

        let item = tables
            .items
            .get_mut(&item_id)
            .map(|item| {
                item.stock = restored;
                item.clone()
            })
            .ok_or_else(|| anyhow!("Item {item_id} vanished"))?;

        let entry = tables.append(&NewTransaction::new(
            TransactionKind::Return,
            item_id,
            rental.user_id,
            qty,
            at,
        ));

        Ok(Some(RentalClosed {
            rental,
            entry,
            item,
        }))
    }

    async fn request_extension(&self, rental_id: i64, days: i32) -> Result<Option<Transaction>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.open_rental_mut(rental_id).map(|rental| {
            rental.extension_requested = true;
            rental.extension_days = Some(days);
            rental.clone()
        }))
    }

    async fn approve_extension(
        &self,
        rental_id: i64,
        days: i32,
        at: DateTime<Utc>,
    ) -> Result<Option<Transaction>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.open_rental_mut(rental_id).map(|rental| {
            rental.rent_due_date = rental
                .rent_due_date
                .map(|due| due + Duration::days(i64::from(days)));
            rental.extension_approved = true;
            rental.extension_days = Some(days);
            rental.extension_approved_at = Some(at);
            rental.clone()
        }))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Transaction>> {
        Ok(self.tables.lock().await.transactions.get(&id).cloned())
    }

    async fn oldest_open_rental(&self, item_id: i64) -> Result<Option<Transaction>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .transactions
            .values()
            .filter(|transaction| transaction.item_id == item_id && transaction.is_open_rental())
            .min_by_key(|transaction| (transaction.timestamp, transaction.id))
            .cloned())
    }

    async fn count_open_rentals(&self, item_id: i64) -> Result<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .transactions
            .values()
            .filter(|transaction| transaction.item_id == item_id && transaction.is_open_rental())
            .count() as i64)
    }

    async fn open_rentals(&self) -> Result<Vec<Transaction>> {
        let tables = self.tables.lock().await;
        let mut rentals: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|transaction| transaction.is_open_rental())
            .cloned()
            .collect();
        rentals.sort_by_key(|rental| (rental.rent_due_date, rental.id));
        Ok(rentals)
    }

    async fn overdue(&self, today: NaiveDate) -> Result<Vec<Transaction>> {
        let mut rentals = self.open_rentals().await?;
        rentals.retain(|rental| rental.is_overdue(today));
        Ok(rentals)
    }

    async fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let (limit, offset) = page(filter.limit, filter.offset);
        let tables = self.tables.lock().await;
        let mut transactions: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|transaction| filter.matches(transaction))
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(transactions
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn activity(&self, kind: TransactionKind, since: DateTime<Utc>) -> Result<KindActivity> {
        let tables = self.tables.lock().await;
        Ok(tables
            .transactions
            .values()
            .filter(|transaction| transaction.kind == kind && transaction.timestamp >= since)
            .fold(KindActivity::default(), |activity, transaction| KindActivity {
                count: activity.count + 1,
                latest: activity.latest.max(Some(transaction.timestamp)),
            }))
    }
}
