//! Inventory ledger
//!
//! Validates every stock movement, then hands it to the repository as a
//! single atomic step. A rejected operation never changes anything.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use auth::models::User;

use crate::config::AppConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Item, ItemQuery, MAX_STOCK, NewItem, NewTransaction, Recorded, RentalClosed, RentalStatus,
    RentalTerms, Transaction, TransactionFilter, TransactionKind,
};
use crate::repositories::InventoryRepositories;

/// Bounds for an extension request or approval
pub const MAX_EXTENSION_DAYS: i32 = 30;
pub const DEFAULT_EXTENSION_DAYS: i32 = 7;

/// Window for scanner statistics
pub const DEFAULT_STATS_DAYS: i64 = 30;
pub const MAX_STATS_DAYS: i64 = 3650;

/// Who is acting on a rental
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            is_admin: user.is_admin(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerPolicy {
    pub max_rent_days: i32,
    pub low_stock_threshold: i32,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            max_rent_days: 30,
            low_stock_threshold: 2,
        }
    }
}

impl From<&AppConfig> for LedgerPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_rent_days: config.max_rent_days,
            low_stock_threshold: config.low_stock_threshold,
        }
    }
}

/// Rental availability for one item
#[derive(Debug, Clone, Serialize)]
pub struct RentalInfo {
    pub item_id: i64,
    pub item_name: String,
    pub price_per_day: f64,
    pub stock: i32,
    pub active_rentals: i64,
    pub available_to_rent: i64,
    pub rentable: bool,
}

/// Open rentals an admin may want to act on
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionQueue {
    /// Extension requested, not yet approved
    pub pending: Vec<Transaction>,
    /// Extension approved, not yet returned
    pub extended: Vec<Transaction>,
    pub overdue: Vec<Transaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NfcAction {
    Return,
    Restock,
    /// Anything a scanner sent that is neither; rejected per operation
    #[serde(other)]
    Unknown,
}

fn default_quantity() -> i32 {
    1
}

/// One tag read by a scanner
#[derive(Debug, Clone, Deserialize)]
pub struct NfcOperation {
    pub item_id: i64,
    pub action: NfcAction,
    /// Ignored for returns, which restore the rented quantity
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

/// A committed NFC operation
#[derive(Debug, Clone, Serialize)]
pub struct NfcReceipt {
    pub item_id: i64,
    pub action: NfcAction,
    pub quantity: i32,
    pub new_stock: i32,
    pub transaction_id: i64,
}

/// Per-operation result of a batch
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NfcResult {
    Success(NfcReceipt),
    Failed {
        item_id: i64,
        action: NfcAction,
        error: String,
        kind: &'static str,
    },
}

impl NfcResult {
    pub fn is_success(&self) -> bool {
        matches!(self, NfcResult::Success(_))
    }
}

/// Return and restock activity over a window
#[derive(Debug, Clone, Serialize)]
pub struct NfcStats {
    pub period_days: i64,
    pub total_operations: i64,
    pub returns: i64,
    pub restocks: i64,
    pub last_scan: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct InventoryLedger {
    repos: InventoryRepositories,
    policy: LedgerPolicy,
}

impl InventoryLedger {
    pub fn new(repos: InventoryRepositories, policy: LedgerPolicy) -> Self {
        Self { repos, policy }
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    // Catalog

    pub async fn create_item(&self, item: NewItem) -> LedgerResult<Item> {
        let name = item.name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::Validation("Item name is required".to_string()));
        }
        if !item.price.is_finite() || item.price < 0.0 {
            return Err(LedgerError::Validation(
                "Price must be zero or more".to_string(),
            ));
        }
        if item.stock < 0 {
            return Err(LedgerError::Validation(
                "Stock must be zero or more".to_string(),
            ));
        }

        let item = NewItem { name, ..item };
        let created = self.repos.items.create(&item, Utc::now()).await?;
        info!(
            "Added item {} '{}' with stock {}",
            created.id, created.name, created.stock
        );
        Ok(created)
    }

    pub async fn item(&self, item_id: i64) -> LedgerResult<Item> {
        self.repos
            .items
            .find_by_id(item_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("Item".to_string()))
    }

    pub async fn items(&self, query: &ItemQuery) -> LedgerResult<Vec<Item>> {
        Ok(self.repos.items.list(query).await?)
    }

    // Stock movements

    pub async fn buy(&self, item_id: i64, user_id: Uuid, qty: i32) -> LedgerResult<Recorded> {
        if qty < 1 {
            return Err(LedgerError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let item = self.item(item_id).await?;
        if item.stock < qty {
            return Err(LedgerError::InsufficientStock {
                requested: qty,
                available: item.stock,
            });
        }

        let entry = NewTransaction::new(TransactionKind::Buy, item_id, Some(user_id), qty, Utc::now());
        let Some(recorded) = self.repos.transactions.withdraw(&entry).await? else {
            return Err(self.shortfall(item_id, qty).await);
        };

        info!(
            "User {} bought {} x item {} (stock now {})",
            user_id, qty, item_id, recorded.item.stock
        );
        Ok(recorded)
    }

    /// Rent one unit for `days`, starting `start_date` or today
    pub async fn rent(
        &self,
        item_id: i64,
        user_id: Uuid,
        days: i32,
        start_date: Option<NaiveDate>,
    ) -> LedgerResult<Recorded> {
        let item = self.item(item_id).await?;
        if !item.rentable {
            return Err(LedgerError::NotRentable);
        }
        if !(1..=self.policy.max_rent_days).contains(&days) {
            return Err(LedgerError::Validation(format!(
                "Rental days must be between 1 and {}",
                self.policy.max_rent_days
            )));
        }
        if item.stock < 1 {
            return Err(LedgerError::InsufficientStock {
                requested: 1,
                available: item.stock,
            });
        }

        let now = Utc::now();
        let terms = RentalTerms::new(start_date.unwrap_or_else(|| now.date_naive()), days);
        let entry = NewTransaction::new(TransactionKind::Rent, item_id, Some(user_id), 1, now)
            .with_rental(terms);
        let Some(recorded) = self.repos.transactions.withdraw(&entry).await? else {
            return Err(self.shortfall(item_id, 1).await);
        };

        info!(
            "User {} rented item {} for {} days, due {}",
            user_id, item_id, days, terms.due_date
        );
        Ok(recorded)
    }

    /// Return a rental on behalf of its owner or an admin
    pub async fn return_rental(
        &self,
        transaction_id: i64,
        actor: Actor,
    ) -> LedgerResult<RentalClosed> {
        let rental = self.rental(transaction_id).await?;
        if !actor.is_admin && rental.user_id != Some(actor.user_id) {
            warn!(
                "User {} tried to return rental {} owned by someone else",
                actor.user_id, transaction_id
            );
            return Err(LedgerError::Forbidden);
        }
        if rental.returned {
            return Err(LedgerError::AlreadyReturned);
        }

        self.close(transaction_id).await
    }

    /// Return the oldest open rental of an item; used by scanners
    pub async fn return_item(&self, item_id: i64) -> LedgerResult<RentalClosed> {
        self.item(item_id).await?;
        let rental = self
            .repos
            .transactions
            .oldest_open_rental(item_id)
            .await?
            .ok_or(LedgerError::NoOpenRental)?;

        self.close(rental.id).await
    }

    async fn close(&self, rental_id: i64) -> LedgerResult<RentalClosed> {
        // `None` here means a concurrent return got there first
        let closed = self
            .repos
            .transactions
            .close_rental(rental_id, Utc::now())
            .await?
            .ok_or(LedgerError::AlreadyReturned)?;

        info!(
            "Rental {} of item {} returned, {} unit(s) back in stock (now {})",
            rental_id, closed.item.id, closed.rental.qty, closed.item.stock
        );
        Ok(closed)
    }

    /// No upper bound on `qty` beyond what the stock column can hold
    pub async fn restock(
        &self,
        item_id: i64,
        qty: i32,
        actor_id: Option<Uuid>,
    ) -> LedgerResult<Recorded> {
        if qty < 1 {
            return Err(LedgerError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        let item = self.item(item_id).await?;
        if item.stock.checked_add(qty).is_none() {
            return Err(stock_overflow());
        }

        let entry = NewTransaction::new(TransactionKind::Restock, item_id, actor_id, qty, Utc::now());
        let Some(recorded) = self.repos.transactions.deposit(&entry).await? else {
            // another restock got in first, or the item went away
            self.item(item_id).await?;
            return Err(stock_overflow());
        };

        info!(
            "Item {} restocked by {} (stock now {})",
            item_id, qty, recorded.item.stock
        );
        Ok(recorded)
    }

    // Extensions

    /// Flag a rental for an extension; the due date only moves on approval
    pub async fn request_extension(
        &self,
        transaction_id: i64,
        actor: Actor,
        days: i32,
    ) -> LedgerResult<Transaction> {
        check_extension_days(days)?;
        let rental = self.rental(transaction_id).await?;
        if rental.user_id != Some(actor.user_id) {
            return Err(LedgerError::Forbidden);
        }
        if rental.returned {
            return Err(LedgerError::AlreadyReturned);
        }

        let updated = self
            .repos
            .transactions
            .request_extension(transaction_id, days)
            .await?
            .ok_or(LedgerError::AlreadyReturned)?;

        info!(
            "User {} requested a {} day extension for rental {}",
            actor.user_id, days, transaction_id
        );
        Ok(updated)
    }

    /// Push the due date of an open rental back by `days`
    pub async fn approve_extension(
        &self,
        transaction_id: i64,
        days: i32,
    ) -> LedgerResult<Transaction> {
        check_extension_days(days)?;
        let rental = self.rental(transaction_id).await?;
        if rental.returned {
            return Err(LedgerError::AlreadyReturned);
        }

        let updated = self
            .repos
            .transactions
            .approve_extension(transaction_id, days, Utc::now())
            .await?
            .ok_or(LedgerError::AlreadyReturned)?;

        info!(
            "Rental {} extended by {} days, now due {:?}",
            transaction_id, days, updated.rent_due_date
        );
        Ok(updated)
    }

    // Read side

    pub async fn transaction(&self, transaction_id: i64) -> LedgerResult<Transaction> {
        self.repos
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("Transaction".to_string()))
    }

    async fn rental(&self, transaction_id: i64) -> LedgerResult<Transaction> {
        let transaction = self.transaction(transaction_id).await?;
        if !transaction.is_rental() {
            return Err(LedgerError::NotARental);
        }
        Ok(transaction)
    }

    pub async fn overdue(&self, today: NaiveDate) -> LedgerResult<Vec<Transaction>> {
        Ok(self.repos.transactions.overdue(today).await?)
    }

    pub async fn low_stock(&self) -> LedgerResult<Vec<Item>> {
        Ok(self
            .repos
            .items
            .low_stock(self.policy.low_stock_threshold)
            .await?)
    }

    pub async fn transactions(&self, filter: &TransactionFilter) -> LedgerResult<Vec<Transaction>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(LedgerError::Validation(
                    "`from` must not be after `to`".to_string(),
                ));
            }
        }
        Ok(self.repos.transactions.list(filter).await?)
    }

    /// One user's rentals in `status` as of `today`, newest first
    pub async fn rentals_of(
        &self,
        user_id: Uuid,
        status: RentalStatus,
        today: NaiveDate,
        offset: Option<i64>,
    ) -> LedgerResult<Vec<Transaction>> {
        let filter = TransactionFilter {
            user_id: Some(user_id),
            offset,
            ..Default::default()
        };
        self.transactions(&status.narrow(filter, today)).await
    }

    pub async fn extension_queue(&self, today: NaiveDate) -> LedgerResult<ExtensionQueue> {
        let open = self.repos.transactions.open_rentals().await?;
        let pending = open
            .iter()
            .filter(|rental| rental.extension_requested && !rental.extension_approved)
            .cloned()
            .collect();
        let extended = open
            .iter()
            .filter(|rental| rental.extension_approved)
            .cloned()
            .collect();
        let overdue = open
            .into_iter()
            .filter(|rental| rental.is_overdue(today))
            .collect();

        Ok(ExtensionQueue {
            pending,
            extended,
            overdue,
        })
    }

    pub async fn rental_info(&self, item_id: i64) -> LedgerResult<RentalInfo> {
        let item = self.item(item_id).await?;
        if !item.rentable {
            return Err(LedgerError::NotRentable);
        }
        let active_rentals = self.repos.transactions.count_open_rentals(item_id).await?;

        Ok(RentalInfo {
            item_id: item.id,
            available_to_rent: (i64::from(item.stock) - active_rentals).max(0),
            item_name: item.name,
            price_per_day: item.price,
            stock: item.stock,
            active_rentals,
            rentable: item.rentable,
        })
    }

    // Scanners

    pub async fn apply_nfc(
        &self,
        operation: &NfcOperation,
        actor_id: Option<Uuid>,
    ) -> LedgerResult<NfcReceipt> {
        match operation.action {
            NfcAction::Return => {
                let closed = self.return_item(operation.item_id).await?;
                Ok(NfcReceipt {
                    item_id: operation.item_id,
                    action: NfcAction::Return,
                    quantity: closed.rental.qty,
                    new_stock: closed.item.stock,
                    transaction_id: closed.entry.id,
                })
            }
            NfcAction::Restock => {
                let recorded = self
                    .restock(operation.item_id, operation.quantity, actor_id)
                    .await?;
                Ok(NfcReceipt {
                    item_id: operation.item_id,
                    action: NfcAction::Restock,
                    quantity: recorded.transaction.qty,
                    new_stock: recorded.item.stock,
                    transaction_id: recorded.transaction.id,
                })
            }
            NfcAction::Unknown => Err(LedgerError::Validation("Invalid action".to_string())),
        }
    }

    /// Apply each operation in order as its own unit; a failure does not stop
    /// the ones after it or undo the ones before it
    pub async fn apply_nfc_batch(
        &self,
        operations: &[NfcOperation],
        actor_id: Option<Uuid>,
    ) -> Vec<NfcResult> {
        let mut results = Vec::with_capacity(operations.len());
        for operation in operations {
            let result = match self.apply_nfc(operation, actor_id).await {
                Ok(receipt) => NfcResult::Success(receipt),
                Err(e) => NfcResult::Failed {
                    item_id: operation.item_id,
                    action: operation.action,
                    kind: e.kind(),
                    error: e.to_string(),
                },
            };
            results.push(result);
        }

        let succeeded = results.iter().filter(|result| result.is_success()).count();
        info!(
            "NFC batch applied: {} of {} operations succeeded",
            succeeded,
            results.len()
        );
        results
    }

    /// Returns and restocks recorded in the last `days` days
    pub async fn nfc_stats(&self, days: i64, now: DateTime<Utc>) -> LedgerResult<NfcStats> {
        if !(1..=MAX_STATS_DAYS).contains(&days) {
            return Err(LedgerError::Validation(format!(
                "Days must be between 1 and {MAX_STATS_DAYS}"
            )));
        }
        let since = now - Duration::days(days);
        let returns = self
            .repos
            .transactions
            .activity(TransactionKind::Return, since)
            .await?;
        let restocks = self
            .repos
            .transactions
            .activity(TransactionKind::Restock, since)
            .await?;

        Ok(NfcStats {
            period_days: days,
            total_operations: returns.count + restocks.count,
            returns: returns.count,
            restocks: restocks.count,
            last_scan: returns.latest.max(restocks.latest),
        })
    }

    /// Re-read stock after a conditional update lost a race
    async fn shortfall(&self, item_id: i64, requested: i32) -> LedgerError {
        match self.repos.items.find_by_id(item_id).await {
            Ok(Some(item)) => LedgerError::InsufficientStock {
                requested,
                available: item.stock,
            },
            Ok(None) => LedgerError::NotFound("Item".to_string()),
            Err(e) => LedgerError::from(e),
        }
    }
}

fn stock_overflow() -> LedgerError {
    LedgerError::Validation(format!("Stock cannot exceed {MAX_STOCK}"))
}

fn check_extension_days(days: i32) -> LedgerResult<()> {
    if !(1..=MAX_EXTENSION_DAYS).contains(&days) {
        return Err(LedgerError::Validation(format!(
            "Extension days must be between 1 and {MAX_EXTENSION_DAYS}"
        )));
    }
    Ok(())
}
